//! Chat directory.
//!
//! Owns the relationship side of the data model: friend requests and the
//! chats they lead to. A friend request outlives its chat. When the
//! inactivity janitor removes a chat, reopening the relationship creates a
//! fresh chat and re-links the request to it, so the old chat id never
//! resolves again.

use std::sync::Arc;

use sealpost_core::{
    Chat, ChatId, ChatStore, ChatUpdate, Environment, FriendRequest, FriendRequestId,
    FriendRequestStatus, Participants, SameParticipant, StoreError, UserId, touch_chat,
};
use thiserror::Error;

/// Errors from directory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Users cannot befriend themselves.
    #[error(transparent)]
    SameParticipant(#[from] SameParticipant),

    /// Request or chat does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },

    /// Caller is not a party to the request or chat.
    #[error("user {user} is not a party to {what}")]
    NotParticipant {
        /// Record that was addressed.
        what: String,
        /// Offending user.
        user: UserId,
    },

    /// The request has not been accepted yet.
    #[error("friend request {0} is still pending")]
    Pending(FriendRequestId),

    /// Underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Friend requests and chat records.
pub struct ChatDirectory<S, E>
where
    S: ChatStore,
    E: Environment,
{
    store: Arc<S>,
    env: E,
}

impl<S, E> ChatDirectory<S, E>
where
    S: ChatStore,
    E: Environment,
{
    /// Create a directory over `store`.
    pub fn new(store: Arc<S>, env: E) -> Self {
        Self { store, env }
    }

    /// Send a friend request. No chat exists until it is accepted.
    pub async fn send_request(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<FriendRequest, DirectoryError> {
        Participants::new(from, to)?;

        let request = FriendRequest {
            id: FriendRequestId(self.env.random_u128()),
            from,
            to,
            status: FriendRequestStatus::Pending,
            chat_id: None,
        };
        self.store.store_friend_request(&request).await?;

        tracing::debug!(request = %request.id, from = %from, to = %to, "friend request sent");
        Ok(request)
    }

    /// Accept a pending request on behalf of its recipient, creating the chat.
    ///
    /// Accepting twice returns the request unchanged.
    pub async fn accept(
        &self,
        request_id: FriendRequestId,
        by: UserId,
    ) -> Result<FriendRequest, DirectoryError> {
        let mut request = self.request(request_id).await?;
        if request.to != by {
            return Err(DirectoryError::NotParticipant {
                what: format!("friend request {request_id}"),
                user: by,
            });
        }
        if request.status == FriendRequestStatus::Accepted {
            return Ok(request);
        }

        let chat = self.create_chat(Participants::new(request.from, request.to)?).await?;
        request.status = FriendRequestStatus::Accepted;
        request.chat_id = Some(chat.id);
        self.store.store_friend_request(&request).await?;

        tracing::info!(request = %request_id, chat = %chat.id, "friend request accepted");
        Ok(request)
    }

    /// Send and accept in one step.
    pub async fn befriend(
        &self,
        from: UserId,
        to: UserId,
    ) -> Result<FriendRequest, DirectoryError> {
        let request = self.send_request(from, to).await?;
        self.accept(request.id, to).await
    }

    /// The chat for an accepted relationship.
    ///
    /// If the linked chat was removed, a new one is created and the request
    /// is re-linked to it.
    pub async fn open_chat(
        &self,
        request_id: FriendRequestId,
        requester: UserId,
    ) -> Result<ChatId, DirectoryError> {
        let mut request = self.request(request_id).await?;
        if !request.involves(requester) {
            return Err(DirectoryError::NotParticipant {
                what: format!("friend request {request_id}"),
                user: requester,
            });
        }
        if request.status == FriendRequestStatus::Pending {
            return Err(DirectoryError::Pending(request_id));
        }

        if let Some(chat_id) = request.chat_id
            && self.store.load_chat(chat_id).await?.is_some()
        {
            return Ok(chat_id);
        }

        let chat = self.create_chat(Participants::new(request.from, request.to)?).await?;
        let previous = request.chat_id.replace(chat.id);
        self.store.store_friend_request(&request).await?;

        match previous {
            Some(old) => tracing::info!(
                request = %request_id,
                old_chat = %old,
                chat = %chat.id,
                "chat recreated after removal"
            ),
            None => tracing::info!(request = %request_id, chat = %chat.id, "chat created"),
        }
        Ok(chat.id)
    }

    /// Look up a chat.
    pub async fn resolve(&self, chat_id: ChatId) -> Result<Chat, DirectoryError> {
        self.store
            .load_chat(chat_id)
            .await?
            .ok_or_else(|| DirectoryError::NotFound { what: format!("chat {chat_id}") })
    }

    /// Record message activity now.
    pub async fn touch(&self, chat_id: ChatId) -> Result<(), DirectoryError> {
        if touch_chat(self.store.as_ref(), chat_id, self.env.wall_clock()).await? {
            Ok(())
        } else {
            Err(DirectoryError::NotFound { what: format!("chat {chat_id}") })
        }
    }

    /// Pin or unpin a chat. Saved chats survive inactivity sweeps.
    pub async fn set_saved(&self, chat_id: ChatId, saved: bool) -> Result<(), DirectoryError> {
        if self.store.update_chat(chat_id, ChatUpdate::Saved(saved)).await?.is_none() {
            return Err(DirectoryError::NotFound { what: format!("chat {chat_id}") });
        }
        tracing::debug!(chat = %chat_id, saved, "chat saved flag set");
        Ok(())
    }

    async fn request(&self, id: FriendRequestId) -> Result<FriendRequest, DirectoryError> {
        self.store
            .load_friend_request(id)
            .await?
            .ok_or_else(|| DirectoryError::NotFound { what: format!("friend request {id}") })
    }

    async fn create_chat(&self, participants: Participants) -> Result<Chat, DirectoryError> {
        let chat =
            Chat::new(ChatId(self.env.random_u128()), participants, self.env.wall_clock());
        self.store.store_chat(&chat).await?;
        Ok(chat)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sealpost_core::{MemoryChatStore, Timestamp};

    use super::*;
    use crate::testing::TestEnv;

    const ALICE: UserId = UserId(1);
    const BOB: UserId = UserId(2);
    const CAROL: UserId = UserId(3);

    fn directory() -> (ChatDirectory<MemoryChatStore, TestEnv>, Arc<MemoryChatStore>, TestEnv) {
        let store = Arc::new(MemoryChatStore::new());
        let env = TestEnv::with_seed(11);
        (ChatDirectory::new(Arc::clone(&store), env.clone()), store, env)
    }

    #[tokio::test]
    async fn befriend_links_a_chat() {
        let (directory, _, _) = directory();

        let request = directory.befriend(ALICE, BOB).await.unwrap();
        assert_eq!(request.status, FriendRequestStatus::Accepted);

        let chat_id = directory.open_chat(request.id, BOB).await.unwrap();
        assert_eq!(Some(chat_id), request.chat_id);

        let chat = directory.resolve(chat_id).await.unwrap();
        assert!(chat.participants.contains(ALICE));
        assert!(chat.participants.contains(BOB));
    }

    #[tokio::test]
    async fn self_request_is_rejected() {
        let (directory, _, _) = directory();

        let result = directory.send_request(ALICE, ALICE).await;
        assert_eq!(result, Err(DirectoryError::SameParticipant(SameParticipant(ALICE))));
    }

    #[tokio::test]
    async fn pending_request_has_no_chat() {
        let (directory, _, _) = directory();
        let request = directory.send_request(ALICE, BOB).await.unwrap();

        let result = directory.open_chat(request.id, ALICE).await;
        assert_eq!(result, Err(DirectoryError::Pending(request.id)));
    }

    #[tokio::test]
    async fn only_recipient_accepts() {
        let (directory, _, _) = directory();
        let request = directory.send_request(ALICE, BOB).await.unwrap();

        let result = directory.accept(request.id, ALICE).await;
        assert!(matches!(result, Err(DirectoryError::NotParticipant { user: ALICE, .. })));
    }

    #[tokio::test]
    async fn outsider_cannot_open() {
        let (directory, _, _) = directory();
        let request = directory.befriend(ALICE, BOB).await.unwrap();

        let result = directory.open_chat(request.id, CAROL).await;
        assert!(matches!(result, Err(DirectoryError::NotParticipant { user: CAROL, .. })));
    }

    #[tokio::test]
    async fn removed_chat_is_recreated_and_relinked() {
        let (directory, store, _) = directory();
        let request = directory.befriend(ALICE, BOB).await.unwrap();
        let old = request.chat_id.unwrap();

        store.delete_chat(old).await.unwrap();

        let new = directory.open_chat(request.id, ALICE).await.unwrap();
        assert_ne!(new, old);
        assert!(matches!(directory.resolve(old).await, Err(DirectoryError::NotFound { .. })));

        let relinked = store.load_friend_request(request.id).await.unwrap().unwrap();
        assert_eq!(relinked.chat_id, Some(new));

        // Reopening again is stable.
        assert_eq!(directory.open_chat(request.id, BOB).await.unwrap(), new);
    }

    #[tokio::test]
    async fn touch_uses_environment_clock() {
        let (directory, _, env) = directory();
        let chat_id = directory.befriend(ALICE, BOB).await.unwrap().chat_id.unwrap();

        env.set_wall_clock(Timestamp::from_millis(50_000));
        directory.touch(chat_id).await.unwrap();

        let chat = directory.resolve(chat_id).await.unwrap();
        assert_eq!(chat.last_activity, Some(Timestamp::from_millis(50_000)));
    }

    #[tokio::test]
    async fn touching_missing_chat_fails() {
        let (directory, _, _) = directory();

        let result = directory.touch(ChatId(1)).await;
        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn saved_flag_round_trips() {
        let (directory, _, _) = directory();
        let chat_id = directory.befriend(ALICE, BOB).await.unwrap().chat_id.unwrap();

        directory.set_saved(chat_id, true).await.unwrap();
        assert!(directory.resolve(chat_id).await.unwrap().saved);

        directory.set_saved(chat_id, false).await.unwrap();
        assert!(!directory.resolve(chat_id).await.unwrap().saved);
    }

    #[tokio::test]
    async fn saving_keeps_recorded_activity() {
        let (directory, _, env) = directory();
        let chat_id = directory.befriend(ALICE, BOB).await.unwrap().chat_id.unwrap();

        env.set_wall_clock(Timestamp::from_millis(7_000));
        directory.touch(chat_id).await.unwrap();
        directory.set_saved(chat_id, true).await.unwrap();

        let chat = directory.resolve(chat_id).await.unwrap();
        assert!(chat.saved);
        assert_eq!(chat.last_activity, Some(Timestamp::from_millis(7_000)));
    }

    #[tokio::test]
    async fn saving_missing_chat_fails() {
        let (directory, store, _) = directory();
        let chat_id = directory.befriend(ALICE, BOB).await.unwrap().chat_id.unwrap();
        store.delete_chat(chat_id).await.unwrap();

        let result = directory.set_saved(chat_id, true).await;
        assert!(matches!(result, Err(DirectoryError::NotFound { .. })));
        assert!(store.load_chat(chat_id).await.unwrap().is_none());
    }
}
