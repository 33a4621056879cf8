//! In-memory document store.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;

use super::{
    ChatStore, ChatUpdate, StoreError,
    document::{decode_document, encode_document},
};
use crate::{
    ids::{ChatId, FriendRequestId, MessageId, SessionId, Timestamp, UserId},
    model::{Chat, FriendRequest, Message, Session, UserIdentity},
};

#[derive(Default)]
struct Documents {
    identities: HashMap<UserId, Vec<u8>>,
    friend_requests: HashMap<FriendRequestId, Vec<u8>>,
    chats: BTreeMap<ChatId, Vec<u8>>,
    /// Per chat, keyed by session version.
    sessions: HashMap<ChatId, BTreeMap<u64, Vec<u8>>>,
    messages: HashMap<ChatId, BTreeMap<MessageId, Vec<u8>>>,
}

/// Thread-safe in-memory [`ChatStore`].
///
/// Documents are held CBOR-encoded. The internal mutex is taken once per
/// operation and never held across an await point, so every method is
/// atomic with respect to the others.
#[derive(Clone, Default)]
pub struct MemoryChatStore {
    documents: Arc<Mutex<Documents>>,
}

impl MemoryChatStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages across all chats.
    pub fn message_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.messages.values().map(BTreeMap::len).sum())
    }

    /// Number of stored sessions for a chat, active or expired.
    pub fn session_count(&self, chat: ChatId) -> Result<usize, StoreError> {
        Ok(self.lock()?.sessions.get(&chat).map_or(0, BTreeMap::len))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Documents>, StoreError> {
        self.documents
            .lock()
            .map_err(|_| StoreError::Unavailable { reason: "store mutex poisoned".to_string() })
    }

    fn find_session(
        documents: &Documents,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Option<(u64, Session)>, StoreError> {
        let Some(versions) = documents.sessions.get(&chat) else {
            return Ok(None);
        };

        for (version, bytes) in versions.iter().rev() {
            let decoded: Session = decode_document(bytes)?;
            if decoded.id == session {
                return Ok(Some((*version, decoded)));
            }
        }

        Ok(None)
    }

    fn chat(documents: &Documents, id: ChatId) -> Result<Option<Chat>, StoreError> {
        documents.chats.get(&id).map(|bytes| decode_document(bytes)).transpose()
    }

    fn remove_chat(documents: &mut Documents, id: ChatId) -> bool {
        let existed = documents.chats.remove(&id).is_some();
        documents.sessions.remove(&id);
        documents.messages.remove(&id);
        existed
    }
}

impl std::fmt::Debug for MemoryChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("MemoryChatStore");
        if let Ok(documents) = self.documents.lock() {
            debug
                .field("identities", &documents.identities.len())
                .field("chats", &documents.chats.len())
                .field("sessions", &documents.sessions.values().map(BTreeMap::len).sum::<usize>());
        }
        debug.finish_non_exhaustive()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn load_identity(&self, user: UserId) -> Result<Option<UserIdentity>, StoreError> {
        self.lock()?.identities.get(&user).map(|bytes| decode_document(bytes)).transpose()
    }

    async fn insert_identity(&self, identity: &UserIdentity) -> Result<(), StoreError> {
        let bytes = encode_document(identity)?;
        let mut documents = self.lock()?;
        if documents.identities.contains_key(&identity.user_id) {
            return Err(StoreError::Exists { what: format!("identity of {}", identity.user_id) });
        }
        documents.identities.insert(identity.user_id, bytes);
        Ok(())
    }

    async fn load_friend_request(
        &self,
        id: FriendRequestId,
    ) -> Result<Option<FriendRequest>, StoreError> {
        self.lock()?.friend_requests.get(&id).map(|bytes| decode_document(bytes)).transpose()
    }

    async fn store_friend_request(&self, request: &FriendRequest) -> Result<(), StoreError> {
        let bytes = encode_document(request)?;
        self.lock()?.friend_requests.insert(request.id, bytes);
        Ok(())
    }

    async fn load_chat(&self, id: ChatId) -> Result<Option<Chat>, StoreError> {
        let documents = self.lock()?;
        Self::chat(&documents, id)
    }

    async fn store_chat(&self, chat: &Chat) -> Result<(), StoreError> {
        let bytes = encode_document(chat)?;
        self.lock()?.chats.insert(chat.id, bytes);
        Ok(())
    }

    async fn update_chat(
        &self,
        id: ChatId,
        update: ChatUpdate,
    ) -> Result<Option<Chat>, StoreError> {
        let mut documents = self.lock()?;
        let Some(mut chat) = Self::chat(&documents, id)? else {
            return Ok(None);
        };

        if update.apply(&mut chat) {
            let bytes = encode_document(&chat)?;
            documents.chats.insert(id, bytes);
        }
        Ok(Some(chat))
    }

    async fn list_chats(&self) -> Result<Vec<Chat>, StoreError> {
        self.lock()?.chats.values().map(|bytes| decode_document(bytes)).collect()
    }

    async fn delete_chat(&self, id: ChatId) -> Result<bool, StoreError> {
        let mut documents = self.lock()?;
        Ok(Self::remove_chat(&mut documents, id))
    }

    async fn delete_chat_if_idle(&self, id: ChatId, cutoff: Timestamp) -> Result<bool, StoreError> {
        let mut documents = self.lock()?;
        match Self::chat(&documents, id)? {
            Some(chat) if !chat.saved && chat.idle_since() < cutoff => {
                Ok(Self::remove_chat(&mut documents, id))
            },
            _ => Ok(false),
        }
    }

    async fn latest_session(&self, chat: ChatId) -> Result<Option<Session>, StoreError> {
        self.lock()?
            .sessions
            .get(&chat)
            .and_then(|versions| versions.last_key_value())
            .map(|(_, bytes)| decode_document(bytes))
            .transpose()
    }

    async fn sessions(&self, chat: ChatId) -> Result<Vec<Session>, StoreError> {
        self.lock()?
            .sessions
            .get(&chat)
            .map_or_else(|| Ok(Vec::new()), |versions| {
                versions.values().map(|bytes| decode_document(bytes)).collect()
            })
    }

    async fn load_session(
        &self,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Option<Session>, StoreError> {
        let documents = self.lock()?;
        Ok(Self::find_session(&documents, chat, session)?.map(|(_, session)| session))
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        let bytes = encode_document(session)?;
        let mut documents = self.lock()?;
        let versions = documents.sessions.entry(session.chat_id).or_default();

        let expected = versions.last_key_value().map_or(1, |(latest, _)| latest + 1);
        if session.version != expected {
            return Err(StoreError::Conflict { expected, got: session.version });
        }

        versions.insert(session.version, bytes);
        Ok(())
    }

    async fn store_session(&self, session: &Session) -> Result<(), StoreError> {
        let bytes = encode_document(session)?;
        let mut documents = self.lock()?;

        let Some((version, _)) = Self::find_session(&documents, session.chat_id, session.id)?
        else {
            return Err(StoreError::Missing { what: format!("session {}", session.id) });
        };

        documents.sessions.entry(session.chat_id).or_default().insert(version, bytes);
        Ok(())
    }

    async fn store_message(&self, message: &Message) -> Result<(), StoreError> {
        let bytes = encode_document(message)?;
        let mut documents = self.lock()?;

        if !documents.chats.contains_key(&message.chat_id) {
            return Err(StoreError::Missing { what: format!("chat {}", message.chat_id) });
        }
        let latest = documents
            .sessions
            .get(&message.chat_id)
            .and_then(|versions| versions.last_key_value())
            .map(|(_, bytes)| decode_document::<Session>(bytes))
            .transpose()?;
        if !latest.is_some_and(|s| s.id == message.session_id && s.is_active()) {
            return Err(StoreError::SessionInactive { session: message.session_id });
        }

        documents.messages.entry(message.chat_id).or_default().insert(message.id, bytes);
        Ok(())
    }

    async fn recent_messages(
        &self,
        chat: ChatId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let documents = self.lock()?;
        let Some(stored) = documents.messages.get(&chat) else {
            return Ok(Vec::new());
        };

        let mut messages =
            stored.values().map(|bytes| decode_document(bytes)).collect::<Result<Vec<Message>, _>>()?;
        messages.sort_by_key(|m| (m.sent_at, m.id));

        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn message_ids_for_session(
        &self,
        chat: ChatId,
        session: SessionId,
    ) -> Result<Vec<MessageId>, StoreError> {
        let documents = self.lock()?;
        let Some(stored) = documents.messages.get(&chat) else {
            return Ok(Vec::new());
        };

        let mut ids = Vec::new();
        for (id, bytes) in stored {
            let message: Message = decode_document(bytes)?;
            if message.session_id == session {
                ids.push(*id);
            }
        }
        Ok(ids)
    }

    async fn delete_messages(&self, chat: ChatId, ids: &[MessageId]) -> Result<usize, StoreError> {
        let mut documents = self.lock()?;
        let Some(stored) = documents.messages.get_mut(&chat) else {
            return Ok(0);
        };

        Ok(ids.iter().filter(|id| stored.remove(id).is_some()).count())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        model::{Participants, SessionStatus, WrappedKeys},
        store::touch_chat,
    };

    fn session(chat: u128, id: u128, version: u64) -> Session {
        Session {
            id: SessionId(id),
            chat_id: ChatId(chat),
            creator: UserId(1),
            status: SessionStatus::Active,
            version,
            wrapped_keys: WrappedKeys::new(),
            created_at: Timestamp::default(),
        }
    }

    fn message(chat: u128, id: u128, session: u128, at: u64) -> Message {
        Message {
            id: MessageId(id),
            chat_id: ChatId(chat),
            sender: UserId(1),
            session_id: SessionId(session),
            ciphertext: String::new(),
            iv: String::new(),
            sent_at: Timestamp::from_millis(at),
        }
    }

    async fn open_chat(store: &MemoryChatStore, chat: u128, session_id: u128) {
        let pair = Participants::new(UserId(1), UserId(2)).unwrap();
        store.store_chat(&Chat::new(ChatId(chat), pair, Timestamp::default())).await.unwrap();
        store.insert_session(&session(chat, session_id, 1)).await.unwrap();
    }

    #[tokio::test]
    async fn insert_session_requires_next_version() {
        let store = MemoryChatStore::new();

        store.insert_session(&session(1, 10, 1)).await.unwrap();
        let result = store.insert_session(&session(1, 11, 1)).await;
        assert_eq!(result, Err(StoreError::Conflict { expected: 2, got: 1 }));

        let result = store.insert_session(&session(1, 12, 3)).await;
        assert_eq!(result, Err(StoreError::Conflict { expected: 2, got: 3 }));

        store.insert_session(&session(1, 13, 2)).await.unwrap();
        assert_eq!(store.latest_session(ChatId(1)).await.unwrap().unwrap().id, SessionId(13));
    }

    #[tokio::test]
    async fn first_session_must_be_version_one() {
        let store = MemoryChatStore::new();
        let result = store.insert_session(&session(1, 10, 0)).await;
        assert_eq!(result, Err(StoreError::Conflict { expected: 1, got: 0 }));
    }

    #[tokio::test]
    async fn store_session_updates_in_place() {
        let store = MemoryChatStore::new();
        store.insert_session(&session(1, 10, 1)).await.unwrap();
        store.insert_session(&session(1, 11, 2)).await.unwrap();

        let mut old = store.load_session(ChatId(1), SessionId(10)).await.unwrap().unwrap();
        old.status = SessionStatus::Expired;
        store.store_session(&old).await.unwrap();

        let reloaded = store.load_session(ChatId(1), SessionId(10)).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SessionStatus::Expired);
        assert_eq!(store.latest_session(ChatId(1)).await.unwrap().unwrap().id, SessionId(11));
    }

    #[tokio::test]
    async fn store_session_rejects_unknown() {
        let store = MemoryChatStore::new();
        let result = store.store_session(&session(1, 10, 1)).await;
        assert!(matches!(result, Err(StoreError::Missing { .. })));
    }

    #[tokio::test]
    async fn recent_messages_ordered_and_limited() {
        let store = MemoryChatStore::new();
        open_chat(&store, 7, 1).await;
        for (id, at) in [(1, 300), (2, 100), (3, 200), (4, 400)] {
            store.store_message(&message(7, id, 1, at)).await.unwrap();
        }

        let recent = store.recent_messages(ChatId(7), 3).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![3, 1, 4]);
    }

    #[tokio::test]
    async fn batch_delete_only_touches_requested_ids() {
        let store = MemoryChatStore::new();
        open_chat(&store, 7, 100).await;
        store.store_message(&message(7, 1, 100, 1)).await.unwrap();
        store.store_message(&message(7, 2, 100, 2)).await.unwrap();
        store.insert_session(&session(7, 200, 2)).await.unwrap();
        store.store_message(&message(7, 3, 200, 3)).await.unwrap();

        let ids = store.message_ids_for_session(ChatId(7), SessionId(100)).await.unwrap();
        assert_eq!(ids, vec![MessageId(1), MessageId(2)]);

        let removed = store.delete_messages(ChatId(7), &ids).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.message_count().unwrap(), 1);

        let removed_again = store.delete_messages(ChatId(7), &ids).await.unwrap();
        assert_eq!(removed_again, 0);
    }

    #[tokio::test]
    async fn delete_chat_cascades() {
        let store = MemoryChatStore::new();
        open_chat(&store, 5, 50).await;
        store.store_message(&message(5, 1, 50, 1)).await.unwrap();

        assert!(store.delete_chat(ChatId(5)).await.unwrap());
        assert!(store.load_chat(ChatId(5)).await.unwrap().is_none());
        assert_eq!(store.session_count(ChatId(5)).unwrap(), 0);
        assert_eq!(store.message_count().unwrap(), 0);

        assert!(!store.delete_chat(ChatId(5)).await.unwrap());
    }

    #[tokio::test]
    async fn touch_keeps_latest_activity() {
        let store = MemoryChatStore::new();
        let pair = Participants::new(UserId(1), UserId(2)).unwrap();
        store.store_chat(&Chat::new(ChatId(5), pair, Timestamp::default())).await.unwrap();

        assert!(touch_chat(&store, ChatId(5), Timestamp::from_millis(50)).await.unwrap());
        assert!(touch_chat(&store, ChatId(5), Timestamp::from_millis(20)).await.unwrap());

        let chat = store.load_chat(ChatId(5)).await.unwrap().unwrap();
        assert_eq!(chat.last_activity, Some(Timestamp::from_millis(50)));

        assert!(!touch_chat(&store, ChatId(6), Timestamp::from_millis(1)).await.unwrap());
    }

    #[tokio::test]
    async fn message_for_missing_chat_is_rejected() {
        let store = MemoryChatStore::new();

        let result = store.store_message(&message(9, 1, 90, 1)).await;
        assert!(matches!(result, Err(StoreError::Missing { .. })));
        assert_eq!(store.message_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn message_for_retired_session_is_rejected() {
        let store = MemoryChatStore::new();
        open_chat(&store, 5, 50).await;

        let mut expired = store.load_session(ChatId(5), SessionId(50)).await.unwrap().unwrap();
        expired.status = SessionStatus::Expired;
        store.store_session(&expired).await.unwrap();
        let result = store.store_message(&message(5, 1, 50, 1)).await;
        assert_eq!(result, Err(StoreError::SessionInactive { session: SessionId(50) }));

        store.insert_session(&session(5, 51, 2)).await.unwrap();
        let result = store.store_message(&message(5, 2, 50, 2)).await;
        assert_eq!(result, Err(StoreError::SessionInactive { session: SessionId(50) }));

        store.store_message(&message(5, 3, 51, 3)).await.unwrap();
        assert_eq!(store.message_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn identity_inserts_once() {
        let store = MemoryChatStore::new();
        let identity = UserIdentity {
            user_id: UserId(1),
            public_key: "first".to_string(),
            encrypted_private_key: String::new(),
            iv: String::new(),
            salt: String::new(),
        };
        store.insert_identity(&identity).await.unwrap();

        let second = UserIdentity { public_key: "second".to_string(), ..identity };
        let result = store.insert_identity(&second).await;
        assert!(matches!(result, Err(StoreError::Exists { .. })));

        let stored = store.load_identity(UserId(1)).await.unwrap().unwrap();
        assert_eq!(stored.public_key, "first");
    }

    #[tokio::test]
    async fn update_chat_never_recreates() {
        let store = MemoryChatStore::new();

        let updated = store.update_chat(ChatId(5), ChatUpdate::Saved(true)).await.unwrap();
        assert!(updated.is_none());
        assert!(store.load_chat(ChatId(5)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn field_updates_do_not_clobber_each_other() {
        let store = MemoryChatStore::new();
        open_chat(&store, 5, 50).await;

        store.update_chat(ChatId(5), ChatUpdate::Saved(true)).await.unwrap();
        store.update_chat(ChatId(5), ChatUpdate::LinkSession(SessionId(50))).await.unwrap();
        store.update_chat(ChatId(5), ChatUpdate::Touch(Timestamp::from_millis(9))).await.unwrap();

        let chat = store.load_chat(ChatId(5)).await.unwrap().unwrap();
        assert!(chat.saved);
        assert_eq!(chat.current_session, Some(SessionId(50)));
        assert_eq!(chat.last_activity, Some(Timestamp::from_millis(9)));
    }

    #[tokio::test]
    async fn idle_delete_rechecks_activity_and_saved() {
        let store = MemoryChatStore::new();
        open_chat(&store, 5, 50).await;
        open_chat(&store, 6, 60).await;
        let cutoff = Timestamp::from_millis(100);

        touch_chat(&store, ChatId(5), Timestamp::from_millis(150)).await.unwrap();
        assert!(!store.delete_chat_if_idle(ChatId(5), cutoff).await.unwrap());

        store.update_chat(ChatId(6), ChatUpdate::Saved(true)).await.unwrap();
        assert!(!store.delete_chat_if_idle(ChatId(6), cutoff).await.unwrap());

        store.update_chat(ChatId(6), ChatUpdate::Saved(false)).await.unwrap();
        assert!(store.delete_chat_if_idle(ChatId(6), cutoff).await.unwrap());
        assert_eq!(store.session_count(ChatId(6)).unwrap(), 0);
        assert!(store.load_chat(ChatId(5)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sessions_listed_in_version_order() {
        let store = MemoryChatStore::new();
        open_chat(&store, 5, 50).await;
        store.insert_session(&session(5, 40, 2)).await.unwrap();

        let ids: Vec<_> = store.sessions(ChatId(5)).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SessionId(50), SessionId(40)]);
        assert!(store.sessions(ChatId(6)).await.unwrap().is_empty());
    }
}
