//! Persistent document store contract.
//!
//! The store is an external collaborator. The core needs exactly:
//!
//! - point reads and writes of single documents
//! - atomic multi-document batch deletes
//! - "most recent matching, limit 1" for sessions, ordered by version
//! - timestamp-ordered, limited message queries
//!
//! Every write that can race is conditional and evaluated by the store
//! itself:
//!
//! - a session is only accepted if its version is exactly one past the
//!   latest stored version for the chat, which lets racing creators
//!   converge on one winner without a distributed lock
//! - a message is only accepted while its chat exists and its session is
//!   the chat's active one
//! - an identity is only inserted once
//! - chats are changed field by field ([`ChatUpdate`]) and only removed for
//!   inactivity if they are still idle and unsaved at the moment of removal

pub mod document;
mod memory;

use async_trait::async_trait;
pub use memory::MemoryChatStore;
use thiserror::Error;

use crate::{
    ids::{ChatId, FriendRequestId, MessageId, SessionId, Timestamp, UserId},
    model::{Chat, FriendRequest, Message, Session, UserIdentity},
};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Conditional session insert lost: another version landed first.
    #[error("version conflict: expected {expected}, got {got}")]
    Conflict {
        /// Version the store would have accepted.
        expected: u64,
        /// Version that was offered.
        got: u64,
    },

    /// An update targeted a document that does not exist.
    #[error("document missing: {what}")]
    Missing {
        /// Description of the missing document.
        what: String,
    },

    /// An insert-only write found the document already present.
    #[error("document exists: {what}")]
    Exists {
        /// Description of the existing document.
        what: String,
    },

    /// A message was bound to a session that is not the chat's active one.
    #[error("session {session} is not the active session")]
    SessionInactive {
        /// Session the message named.
        session: SessionId,
    },

    /// The store could not be reached or refused service.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// A stored document failed to encode or decode.
    #[error("corrupt document: {reason}")]
    Corrupt {
        /// Description of the failure.
        reason: String,
    },
}

impl StoreError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Persistent document store.
///
/// Implementations must be thread-safe; every method is a single point
/// operation or a single atomic batch.
#[async_trait]
pub trait ChatStore: Send + Sync + 'static {
    /// Read a user's identity document.
    async fn load_identity(&self, user: UserId) -> Result<Option<UserIdentity>, StoreError>;

    /// Insert a user's identity document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Exists` if the user already has one.
    async fn insert_identity(&self, identity: &UserIdentity) -> Result<(), StoreError>;

    /// Read a friend request.
    async fn load_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequest>, StoreError>;

    /// Write a friend request.
    async fn store_friend_request(&self, request: &FriendRequest) -> Result<(), StoreError>;

    /// Read a chat.
    async fn load_chat(&self, id: ChatId) -> Result<Option<Chat>, StoreError>;

    /// Write a whole chat document (insert or replace).
    ///
    /// Used to create chats. Changes to a live chat go through
    /// [`ChatStore::update_chat`].
    async fn store_chat(&self, chat: &Chat) -> Result<(), StoreError>;

    /// Apply one field update to a chat atomically.
    ///
    /// Returns the updated chat, or `None` if it does not exist. A missing
    /// chat is never recreated.
    async fn update_chat(&self, id: ChatId, update: ChatUpdate)
    -> Result<Option<Chat>, StoreError>;

    /// All chats, in id order.
    async fn list_chats(&self) -> Result<Vec<Chat>, StoreError>;

    /// Delete a chat together with its sessions and messages, atomically.
    ///
    /// Returns whether the chat existed.
    async fn delete_chat(&self, id: ChatId) -> Result<bool, StoreError>;

    /// Like [`ChatStore::delete_chat`], but only if the chat is unsaved and
    /// has been idle since strictly before `cutoff`, judged at deletion time.
    ///
    /// Returns whether the chat was removed.
    async fn delete_chat_if_idle(&self, id: ChatId, cutoff: Timestamp)
    -> Result<bool, StoreError>;

    /// Session with the highest version for the chat.
    async fn latest_session(&self, chat: ChatId) -> Result<Option<Session>, StoreError>;

    /// Every session of a chat, oldest version first.
    async fn sessions(&self, chat: ChatId) -> Result<Vec<Session>, StoreError>;

    /// Read one session.
    async fn load_session(
        &self,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Option<Session>, StoreError>;

    /// Insert a new session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` unless `session.version` is exactly the
    /// latest stored version plus one (or 1 for the first session).
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Replace an existing session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Missing` if the session was never inserted.
    async fn store_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Write a message.
    ///
    /// # Errors
    ///
    /// - `StoreError::Missing` if the chat does not exist
    /// - `StoreError::SessionInactive` unless `message.session_id` is the
    ///   chat's latest session and that session is active
    async fn store_message(&self, message: &Message) -> Result<(), StoreError>;

    /// The `limit` most recent messages of a chat, oldest first.
    async fn recent_messages(&self, chat: ChatId, limit: usize)
    -> Result<Vec<Message>, StoreError>;

    /// Ids of every message bound to `session`.
    async fn message_ids_for_session(
        &self,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Vec<MessageId>, StoreError>;

    /// Delete a set of messages atomically. Unknown ids are ignored.
    ///
    /// Returns how many messages were removed.
    async fn delete_messages(&self, chat: ChatId, ids: &[MessageId])
    -> Result<usize, StoreError>;
}

/// A single-field change to a chat document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatUpdate {
    /// Record message activity. Activity never moves backwards.
    Touch(Timestamp),
    /// Set or clear the saved flag.
    Saved(bool),
    /// Point the chat at a newly created session.
    LinkSession(SessionId),
    /// Clear the session pointer if it still names this session.
    UnlinkSession(SessionId),
}

impl ChatUpdate {
    /// Apply to `chat`. Returns whether anything changed.
    pub fn apply(self, chat: &mut Chat) -> bool {
        match self {
            Self::Touch(at) => {
                let next = chat.last_activity.map_or(at, |previous| previous.max(at));
                let changed = chat.last_activity != Some(next);
                chat.last_activity = Some(next);
                changed
            },
            Self::Saved(saved) => std::mem::replace(&mut chat.saved, saved) != saved,
            Self::LinkSession(session) => chat.current_session.replace(session) != Some(session),
            Self::UnlinkSession(session) => {
                if chat.current_session == Some(session) {
                    chat.current_session = None;
                    true
                } else {
                    false
                }
            },
        }
    }
}

/// Record message activity on a chat.
///
/// Returns `false` if the chat no longer exists.
pub async fn touch_chat<S: ChatStore + ?Sized>(
    store: &S,
    chat_id: ChatId,
    at: Timestamp,
) -> Result<bool, StoreError> {
    Ok(store.update_chat(chat_id, ChatUpdate::Touch(at)).await?.is_some())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable { reason: "timeout".to_string() }.is_transient());
        assert!(!StoreError::Conflict { expected: 2, got: 1 }.is_transient());
        assert!(!StoreError::Corrupt { reason: "eof".to_string() }.is_transient());
        assert!(!StoreError::SessionInactive { session: SessionId(1) }.is_transient());
    }

    fn chat() -> Chat {
        let pair = crate::model::Participants::new(UserId(1), UserId(2)).unwrap();
        Chat::new(ChatId(1), pair, Timestamp::from_millis(10))
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut chat = chat();

        assert!(ChatUpdate::Touch(Timestamp::from_millis(50)).apply(&mut chat));
        assert!(!ChatUpdate::Touch(Timestamp::from_millis(20)).apply(&mut chat));
        assert_eq!(chat.last_activity, Some(Timestamp::from_millis(50)));
    }

    #[test]
    fn unlink_only_clears_matching_session() {
        let mut chat = chat();
        ChatUpdate::LinkSession(SessionId(2)).apply(&mut chat);

        assert!(!ChatUpdate::UnlinkSession(SessionId(1)).apply(&mut chat));
        assert_eq!(chat.current_session, Some(SessionId(2)));

        assert!(ChatUpdate::UnlinkSession(SessionId(2)).apply(&mut chat));
        assert_eq!(chat.current_session, None);
    }

    #[test]
    fn saved_reports_change() {
        let mut chat = chat();

        assert!(ChatUpdate::Saved(true).apply(&mut chat));
        assert!(!ChatUpdate::Saved(true).apply(&mut chat));
        assert!(chat.saved);
    }

    #[test]
    fn conflict_display() {
        let err = StoreError::Conflict { expected: 3, got: 2 };
        assert_eq!(err.to_string(), "version conflict: expected 3, got 2");
    }
}
