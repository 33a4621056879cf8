//! Session key broker contract.
//!
//! The broker is the trusted coordinator that decides which session key is
//! current for a chat. It only ever handles keys in wrapped form: it can
//! route a participant's copy but never read it.
//!
//! # Protocol Flow
//!
//! 1. Client calls `get_or_create_session(chat, me)`
//! 2. `Active` → client unwraps its copy with its private identity key
//! 3. `NoneYet` → if both participants are online, the client mints a key,
//!    wraps it for each participant and calls `store_session`
//! 4. `store_session` returns `Created` or, when another participant won
//!    the race, `RaceCollapsed` with the winner's id; the loser discards its
//!    minted key and goes back to step 1
//! 5. When both participants are offline, `expire_session` retires the key

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    ids::{ChatId, SessionId, UserId},
    model::{Participants, WrappedKeys},
    store::StoreError,
};

/// Outcome of `get_or_create_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    /// A session is current; here is the requester's wrapped copy.
    Active {
        /// Current session.
        session_id: SessionId,
        /// base64 RSA-OAEP wrapped session key for the requester.
        wrapped_key: String,
    },
    /// No usable session. The caller may mint one for these participants.
    NoneYet {
        /// Both chat members.
        participants: Participants,
    },
}

/// Outcome of `store_session`.
///
/// Losing a creation race is not a failure: both variants name the one
/// session every participant must converge on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionWrite {
    /// The caller's session was stored and is now current.
    Created(SessionId),
    /// Another session became current first; the caller's key was discarded.
    RaceCollapsed(SessionId),
}

impl SessionWrite {
    /// The session that is current after the write.
    pub fn session_id(self) -> SessionId {
        match self {
            Self::Created(id) | Self::RaceCollapsed(id) => id,
        }
    }
}

/// Errors from broker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Chat or session does not exist (or the session is no longer active).
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },

    /// Requester is not a member of the chat.
    #[error("user {user} is not a participant of chat {chat}")]
    NotParticipant {
        /// Chat that was addressed.
        chat: ChatId,
        /// Offending user.
        user: UserId,
    },

    /// An active session has no wrapped copy for one of its participants.
    #[error("session {session} has no wrapped key for participant {participant}")]
    Corruption {
        /// Damaged session.
        session: SessionId,
        /// Participant without a copy.
        participant: UserId,
    },

    /// The offered wrap map does not cover exactly the chat's participants.
    #[error("wrap set mismatch: missing {missing:?}, unexpected {unexpected:?}")]
    IncompleteWrapSet {
        /// Participants without a copy.
        missing: Vec<UserId>,
        /// Entries for users outside the chat.
        unexpected: Vec<UserId>,
    },

    /// Concurrent writers kept winning; nothing was stored.
    #[error("session creation contended for chat {chat}")]
    Contended {
        /// Chat that was addressed.
        chat: ChatId,
    },

    /// Underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BrokerError {
    /// Returns true if this error is fatal (unrecoverable without operator
    /// intervention).
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corruption { .. } => true,
            Self::Store(e) => matches!(e, StoreError::Corrupt { .. }),
            Self::NotFound { .. }
            | Self::NotParticipant { .. }
            | Self::IncompleteWrapSet { .. }
            | Self::Contended { .. } => false,
        }
    }
}

/// Trusted session key coordinator.
#[async_trait]
pub trait KeyBroker: Send + Sync + 'static {
    /// Resolve the current session for `chat` on behalf of `requester`.
    async fn get_or_create_session(
        &self,
        chat: ChatId,
        requester: UserId,
    ) -> Result<SessionLookup, BrokerError>;

    /// Store a freshly minted session, or collapse onto the one that won.
    async fn store_session(
        &self,
        chat: ChatId,
        creator: UserId,
        wrapped_keys: WrappedKeys,
    ) -> Result<SessionWrite, BrokerError>;

    /// Retire a session. Idempotent.
    async fn expire_session(&self, chat: ChatId, session: SessionId) -> Result<(), BrokerError>;

    /// The requester's copy of a specific active session's key.
    async fn wrapped_key_for(
        &self,
        chat: ChatId,
        session: SessionId,
        requester: UserId,
    ) -> Result<String, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_write_outcomes_name_a_session() {
        assert_eq!(SessionWrite::Created(SessionId(1)).session_id(), SessionId(1));
        assert_eq!(SessionWrite::RaceCollapsed(SessionId(2)).session_id(), SessionId(2));
    }

    #[test]
    fn corruption_is_fatal() {
        let err = BrokerError::Corruption { session: SessionId(1), participant: UserId(2) };
        assert!(err.is_fatal());
    }

    #[test]
    fn unavailable_store_is_not_fatal() {
        let err = BrokerError::Store(StoreError::Unavailable { reason: "down".to_string() });
        assert!(!err.is_fatal());
    }
}
