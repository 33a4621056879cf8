//! Fault-injecting store wrapper.
//!
//! Wraps any [`ChatStore`] and makes calls fail with
//! `StoreError::Unavailable`, either on demand (`fail_next`, `fail_on`) or
//! at a seeded random rate. A failed call never reaches the inner store, so a failure
//! can never half-apply a write.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sealpost_core::{
    Chat, ChatId, ChatStore, ChatUpdate, FriendRequest, FriendRequestId, Message, MessageId,
    Session, SessionId, StoreError, Timestamp, UserId, UserIdentity,
};

struct Chaos {
    rng: ChaCha20Rng,
    fail_rate: f64,
    fail_next: usize,
    /// Pending failures for one named operation.
    fail_on: HashMap<&'static str, usize>,
    injected: usize,
}

/// A [`ChatStore`] that fails on purpose.
pub struct ChaoticStore<S: ChatStore> {
    inner: Arc<S>,
    chaos: Mutex<Chaos>,
}

impl<S: ChatStore> ChaoticStore<S> {
    /// Wrap `inner` with no failures configured.
    pub fn new(inner: Arc<S>, seed: u64) -> Self {
        Self {
            inner,
            chaos: Mutex::new(Chaos {
                rng: ChaCha20Rng::seed_from_u64(seed),
                fail_rate: 0.0,
                fail_next: 0,
                fail_on: HashMap::new(),
                injected: 0,
            }),
        }
    }

    /// Fail each call with probability `rate` (clamped to `0.0..=1.0`).
    pub fn set_fail_rate(&self, rate: f64) {
        self.lock().fail_rate = rate.clamp(0.0, 1.0);
    }

    /// Fail the next `count` calls unconditionally.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Fail the next call to `operation` (a [`ChatStore`] method name),
    /// leaving every other call alone.
    pub fn fail_on(&self, operation: &'static str) {
        *self.lock().fail_on.entry(operation).or_default() += 1;
    }

    /// Failures injected so far.
    pub fn injected(&self) -> usize {
        self.lock().injected
    }

    /// The wrapped store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        let mut chaos = self.lock();
        let targeted = match chaos.fail_on.get_mut(operation) {
            Some(pending) if *pending > 0 => {
                *pending -= 1;
                true
            },
            _ => false,
        };
        let fail = if targeted {
            true
        } else if chaos.fail_next > 0 {
            chaos.fail_next -= 1;
            true
        } else {
            let rate = chaos.fail_rate;
            rate > 0.0 && chaos.rng.gen_bool(rate)
        };

        if fail {
            chaos.injected += 1;
            tracing::debug!(operation, "injected store failure");
            Err(StoreError::Unavailable { reason: format!("injected failure in {operation}") })
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, Chaos> {
        self.chaos.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<S: ChatStore> ChatStore for ChaoticStore<S> {
    async fn load_identity(&self, user: UserId) -> Result<Option<UserIdentity>, StoreError> {
        self.check("load_identity")?;
        self.inner.load_identity(user).await
    }

    async fn insert_identity(&self, identity: &UserIdentity) -> Result<(), StoreError> {
        self.check("insert_identity")?;
        self.inner.insert_identity(identity).await
    }

    async fn load_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequest>, StoreError> {
        self.check("load_friend_request")?;
        self.inner.load_friend_request(id).await
    }

    async fn store_friend_request(&self, request: &FriendRequest) -> Result<(), StoreError> {
        self.check("store_friend_request")?;
        self.inner.store_friend_request(request).await
    }

    async fn load_chat(&self, id: ChatId) -> Result<Option<Chat>, StoreError> {
        self.check("load_chat")?;
        self.inner.load_chat(id).await
    }

    async fn store_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        self.check("store_chat")?;
        self.inner.store_chat(chat).await
    }

    async fn update_chat(
        &self,
        id: ChatId,
        update: ChatUpdate,
    ) -> Result<Option<Chat>, StoreError> {
        self.check("update_chat")?;
        self.inner.update_chat(id, update).await
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        self.check("list_chats")?;
        self.inner.list_chats().await
    }

    async fn delete_chat(&self, id: ChatId) -> Result<bool, StoreError> {
        self.check("delete_chat")?;
        self.inner.delete_chat(id).await
    }

    async fn delete_chat_if_idle(&self, id: ChatId, cutoff: Timestamp) -> Result<bool, StoreError> {
        self.check("delete_chat_if_idle")?;
        self.inner.delete_chat_if_idle(id, cutoff).await
    }

    async fn latest_session(&self, chat: ChatId) -> Result<Option<Session>, StoreError> {
        self.check("latest_session")?;
        self.inner.latest_session(chat).await
    }

    async fn sessions(&self, chat: ChatId) -> Result<Vec<Session>, StoreError> {
        self.check("sessions")?;
        self.inner.sessions(chat).await
    }

    async fn load_session(
        &self,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Option<Session>, StoreError> {
        self.check("load_session")?;
        self.inner.load_session(chat, session).await
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.check("insert_session")?;
        self.inner.insert_session(session).await
    }

    async fn store_session(&self, session: &Session) -> Result<(), StoreError> {
        self.check("store_session")?;
        self.inner.store_session(session).await
    }

    async fn store_message(&self, message: &Message) -> Result<(), StoreError> {
        self.check("store_message")?;
        self.inner.store_message(message).await
    }

    async fn recent_messages(
        &self,
        chat: ChatId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        self.check("recent_messages")?;
        self.inner.recent_messages(chat, limit).await
    }

    async fn message_ids_for_session(
        &self,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Vec<MessageId>, StoreError> {
        self.check("message_ids_for_session")?;
        self.inner.message_ids_for_session(chat, session).await
    }

    async fn delete_messages(
        &self,
        chat: ChatId,
        ids: &[MessageId],
    ) -> Result<usize, StoreError> {
        self.check("delete_messages")?;
        self.inner.delete_messages(chat, ids).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sealpost_core::MemoryChatStore;

    use super::*;

    #[tokio::test]
    async fn fail_next_counts_down() {
        let store = ChaoticStore::new(Arc::new(MemoryChatStore::new()), 1);
        store.fail_next(2);

        assert!(store.list_chats().await.is_err());
        assert!(store.list_chats().await.is_err());
        assert!(store.list_chats().await.is_ok());
        assert_eq!(store.injected(), 2);
    }

    #[tokio::test]
    async fn fail_on_targets_one_operation() {
        let store = ChaoticStore::new(Arc::new(MemoryChatStore::new()), 1);
        store.fail_on("load_chat");

        assert!(store.list_chats().await.is_ok());
        assert!(store.load_chat(ChatId(1)).await.is_err());
        assert!(store.load_chat(ChatId(1)).await.is_ok());
        assert_eq!(store.injected(), 1);
    }

    #[tokio::test]
    async fn failures_are_transient() {
        let store = ChaoticStore::new(Arc::new(MemoryChatStore::new()), 1);
        store.set_fail_rate(1.0);

        let err = store.load_chat(ChatId(1)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn zero_rate_never_fails() {
        let store = ChaoticStore::new(Arc::new(MemoryChatStore::new()), 1);

        for _ in 0..100 {
            store.list_chats().await.unwrap();
        }
        assert_eq!(store.injected(), 0);
    }
}
