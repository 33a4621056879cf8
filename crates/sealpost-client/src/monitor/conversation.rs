//! Sending and reading messages through an active monitor.

use std::collections::HashMap;

use sealpost_core::{
    BrokerError, EnvRng, Environment, Message, MessageId, SessionId, Timestamp, UserId, touch_chat,
};
use sealpost_crypto::{SealedMessage, SessionKey, decrypt, encrypt};

use super::{MonitorState, SessionLifecycleMonitor};
use crate::error::ClientError;

/// Content of a message as this client can see it.
#[derive(Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Decrypted content.
    Plaintext(Vec<u8>),
    /// The key is gone or the ciphertext failed authentication.
    Undecryptable,
}

impl std::fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plaintext(bytes) => write!(f, "Plaintext(<{} bytes>)", bytes.len()),
            Self::Undecryptable => f.write_str("Undecryptable"),
        }
    }
}

/// A stored message after decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Message id.
    pub id: MessageId,
    /// Author.
    pub sender: UserId,
    /// Session the message is bound to.
    pub session_id: SessionId,
    /// Send time.
    pub sent_at: Timestamp,
    /// Content or placeholder.
    pub body: MessageBody,
}

impl<E: Environment> SessionLifecycleMonitor<E> {
    /// Encrypt and store a message under the active session.
    ///
    /// The session is checked against the store before sealing, and the
    /// store refuses the write if the session was retired in between. In
    /// both cases nothing is stored, the monitor leaves `Active` and
    /// resolves again, and the call fails with `SessionExpired`.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` unless the monitor is `Active`
    /// - `ClientError::SessionExpired` if the session was retired
    /// - `ClientError::NotFound` if the chat was removed; the monitor moves
    ///   to `Error`
    /// - `ClientError::LoggedOut` if the keyring was cleared
    pub async fn send(&mut self, plaintext: &[u8]) -> Result<Message, ClientError> {
        let session_id = self.active_session().ok_or_else(|| ClientError::InvalidState {
            reason: format!("chat {} has no active session", self.chat),
        })?;

        match self.seal_and_store(session_id, plaintext).await {
            Err(ClientError::SessionExpired { session }) => {
                tracing::info!(chat = %self.chat, session = %session, "session retired under an open view");
                self.keyring.evict(session);
                self.resolve().await;
                Err(ClientError::SessionExpired { session })
            },
            Err(cause @ ClientError::NotFound { .. }) => {
                tracing::warn!(chat = %self.chat, error = %cause, "chat gone while sending");
                self.state = MonitorState::Error { cause: cause.clone() };
                Err(cause)
            },
            result => result,
        }
    }

    async fn seal_and_store(
        &self,
        session_id: SessionId,
        plaintext: &[u8],
    ) -> Result<Message, ClientError> {
        self.ensure_current(session_id).await?;
        let key = self.keyring.session_key(session_id)?.ok_or_else(|| ClientError::InvalidState {
            reason: format!("session {session_id} key not held"),
        })?;

        let sealed = encrypt(plaintext, &key, &mut EnvRng::new(self.ctx.env.clone()))?;
        let message = Message {
            id: MessageId(self.ctx.env.random_u128()),
            chat_id: self.chat,
            sender: self.me,
            session_id,
            ciphertext: sealed.ciphertext_base64(),
            iv: sealed.iv_base64(),
            sent_at: self.ctx.env.wall_clock(),
        };
        self.ctx.store.store_message(&message).await?;

        // Stored. Activity bookkeeping failures do not fail the send.
        match touch_chat(self.ctx.store.as_ref(), self.chat, message.sent_at).await {
            Ok(true) => {},
            Ok(false) => tracing::debug!(chat = %self.chat, "chat removed right after send"),
            Err(e) => {
                tracing::warn!(chat = %self.chat, message = %message.id, error = %e, "failed to record chat activity");
            },
        }

        tracing::debug!(chat = %self.chat, message = %message.id, session = %session_id, "message sent");
        Ok(message)
    }

    /// Fail unless the chat exists and `session_id` is its active session.
    async fn ensure_current(&self, session_id: SessionId) -> Result<(), ClientError> {
        if self.ctx.store.load_chat(self.chat).await?.is_none() {
            return Err(ClientError::NotFound { what: format!("chat {}", self.chat) });
        }

        match self.ctx.store.latest_session(self.chat).await? {
            Some(latest) if latest.id == session_id && latest.is_active() => Ok(()),
            _ => Err(ClientError::SessionExpired { session: session_id }),
        }
    }

    /// The `limit` most recent messages, oldest first.
    ///
    /// Messages that cannot be decrypted come back as
    /// `MessageBody::Undecryptable`; the rest of the conversation is
    /// unaffected.
    ///
    /// # Errors
    ///
    /// - `ClientError::LoggedOut` if the keyring was cleared
    /// - `ClientError::Network` if the store is unreachable
    pub async fn read_recent(&self, limit: usize) -> Result<Vec<DecryptedMessage>, ClientError> {
        let messages = self.ctx.store.recent_messages(self.chat, limit).await?;

        let mut keys: HashMap<SessionId, Option<SessionKey>> = HashMap::new();
        let mut decrypted = Vec::with_capacity(messages.len());
        for message in messages {
            if !keys.contains_key(&message.session_id) {
                let key = self.key_for(message.session_id).await?;
                keys.insert(message.session_id, key);
            }
            let body = match keys.get(&message.session_id) {
                Some(Some(key)) => open_body(&message, key),
                _ => MessageBody::Undecryptable,
            };
            decrypted.push(DecryptedMessage {
                id: message.id,
                sender: message.sender,
                session_id: message.session_id,
                sent_at: message.sent_at,
                body,
            });
        }
        Ok(decrypted)
    }

    /// Key for a message's session, fetching our copy from the broker if the
    /// keyring does not hold it. `None` means the message stays sealed.
    async fn key_for(&self, session_id: SessionId) -> Result<Option<SessionKey>, ClientError> {
        if let Some(key) = self.keyring.session_key(session_id)? {
            return Ok(Some(key));
        }

        let wrapped = match self.ctx.broker.wrapped_key_for(self.chat, session_id, self.me).await {
            Ok(wrapped) => wrapped,
            Err(BrokerError::NotFound { .. }) => return Ok(None),
            Err(e @ BrokerError::Store(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(chat = %self.chat, session = %session_id, error = %e, "no key for message session");
                return Ok(None);
            },
        };

        match self.install(session_id, &wrapped).await {
            Ok(key) => Ok(Some(key)),
            Err(ClientError::LoggedOut) => Err(ClientError::LoggedOut),
            Err(e) => {
                tracing::warn!(chat = %self.chat, session = %session_id, error = %e, "session key unwrap failed");
                Ok(None)
            },
        }
    }
}

fn open_body(message: &Message, key: &SessionKey) -> MessageBody {
    let plaintext = SealedMessage::from_base64(&message.ciphertext, &message.iv)
        .and_then(|sealed| decrypt(&sealed, key));

    match plaintext {
        Ok(bytes) => MessageBody::Plaintext(bytes),
        Err(e) => {
            tracing::debug!(message = %message.id, error = %e, "message undecryptable");
            MessageBody::Undecryptable
        },
    }
}
