//! Persisted documents.
//!
//! Optional fields are explicit `Option`s. Consumers must decide what an
//! absent value means at the point of use (see [`Chat::idle_since`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ChatId, FriendRequestId, MessageId, SessionId, Timestamp, UserId};

/// A user's published identity and sealed private key.
///
/// All key fields are base64. The private key blob is only useful together
/// with the user's password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Owner.
    pub user_id: UserId,
    /// RSA-OAEP public key (SPKI DER).
    pub public_key: String,
    /// Password-sealed PKCS8 private key.
    pub encrypted_private_key: String,
    /// IV of the sealed private key.
    pub iv: String,
    /// PBKDF2 salt.
    pub salt: String,
}

impl std::fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserIdentity")
            .field("user_id", &self.user_id)
            .field(
                "encrypted_private_key",
                &format!("<redacted {} chars>", self.encrypted_private_key.len()),
            )
            .finish_non_exhaustive()
    }
}

/// Returned when both sides of a chat would be the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a chat needs two distinct participants, got {0} twice")]
pub struct SameParticipant(pub UserId);

/// The two members of a chat.
///
/// Order of construction is irrelevant: participants are stored sorted, so
/// `Participants::new(a, b) == Participants::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[UserId; 2]", into = "[UserId; 2]")]
pub struct Participants {
    low: UserId,
    high: UserId,
}

impl Participants {
    /// Pair two distinct users.
    pub fn new(a: UserId, b: UserId) -> Result<Self, SameParticipant> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err(SameParticipant(a)),
        }
    }

    /// Whether `user` is one of the two.
    pub fn contains(&self, user: UserId) -> bool {
        self.low == user || self.high == user
    }

    /// The other participant, or `None` if `user` is not a member.
    pub fn other(&self, user: UserId) -> Option<UserId> {
        if user == self.low {
            Some(self.high)
        } else if user == self.high {
            Some(self.low)
        } else {
            None
        }
    }

    /// Both participants, sorted.
    pub fn to_array(self) -> [UserId; 2] {
        [self.low, self.high]
    }
}

impl TryFrom<[UserId; 2]> for Participants {
    type Error = SameParticipant;

    fn try_from([a, b]: [UserId; 2]) -> Result<Self, Self::Error> {
        Self::new(a, b)
    }
}

impl From<Participants> for [UserId; 2] {
    fn from(participants: Participants) -> Self {
        participants.to_array()
    }
}

/// A two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: ChatId,
    /// The two members.
    pub participants: Participants,
    /// Pointer to the session the broker last created. Informational only:
    /// the highest-version session record is authoritative.
    pub current_session: Option<SessionId>,
    /// Last message activity, absent until the first message.
    pub last_activity: Option<Timestamp>,
    /// Saved chats are never removed for inactivity.
    pub saved: bool,
    /// Creation time.
    pub created_at: Timestamp,
}

impl Chat {
    /// A fresh chat with no session and no activity.
    pub fn new(id: ChatId, participants: Participants, created_at: Timestamp) -> Self {
        Self { id, participants, current_session: None, last_activity: None, saved: false, created_at }
    }

    /// Start of the current idle period.
    ///
    /// A chat that never saw a message has been idle since creation.
    pub fn idle_since(&self) -> Timestamp {
        match self.last_activity {
            Some(at) => at,
            None => self.created_at,
        }
    }
}

/// Lifecycle of a session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Key in use for new messages.
    Active,
    /// Key retired; bound messages are purged.
    Expired,
}

/// Participant id to base64 RSA-wrapped copy of the session key.
pub type WrappedKeys = BTreeMap<UserId, String>;

/// One minted session key for a chat, stored only in wrapped form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id.
    pub id: SessionId,
    /// Owning chat.
    pub chat_id: ChatId,
    /// Participant that minted the key.
    pub creator: UserId,
    /// Active or expired.
    pub status: SessionStatus,
    /// Broker-assigned, strictly increasing per chat. The highest version is
    /// the current session regardless of client clocks.
    pub version: u64,
    /// Per-participant wrapped key copies.
    pub wrapped_keys: WrappedKeys,
    /// Creation time (informational).
    pub created_at: Timestamp,
}

impl Session {
    /// Whether the key may still be used.
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// The wrapped copy for `user`, if any.
    pub fn wrapped_key_for(&self, user: UserId) -> Option<&str> {
        self.wrapped_keys.get(&user).map(String::as_str)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("chat_id", &self.chat_id)
            .field("creator", &self.creator)
            .field("status", &self.status)
            .field("version", &self.version)
            .field("wrapped_for", &self.wrapped_keys.keys().collect::<Vec<_>>())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// An encrypted chat message.
///
/// Only `ciphertext` is secret. Sender and the binding session id are
/// visible to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id.
    pub id: MessageId,
    /// Owning chat.
    pub chat_id: ChatId,
    /// Author.
    pub sender: UserId,
    /// Session whose key sealed this message. No other key opens it.
    pub session_id: SessionId,
    /// base64 AES-256-GCM ciphertext with tag.
    pub ciphertext: String,
    /// base64 96-bit IV.
    pub iv: String,
    /// Send time.
    pub sent_at: Timestamp,
}

/// Friend request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FriendRequestStatus {
    /// Awaiting the recipient.
    Pending,
    /// Both sides agreed.
    Accepted,
}

/// Relationship between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Request id.
    pub id: FriendRequestId,
    /// Sender of the request.
    pub from: UserId,
    /// Recipient of the request.
    pub to: UserId,
    /// Current state.
    pub status: FriendRequestStatus,
    /// Chat created for this relationship. May point at a chat that was
    /// since removed for inactivity.
    pub chat_id: Option<ChatId>,
}

impl FriendRequest {
    /// Whether `user` is either side of the relationship.
    pub fn involves(&self, user: UserId) -> bool {
        self.from == user || self.to == user
    }
}
