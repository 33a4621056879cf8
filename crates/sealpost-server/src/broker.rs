//! Session Key Broker
//!
//! Decides which session key is current for each chat and routes wrapped
//! copies of it to participants.
//!
//! ## Responsibilities
//!
//! - Resolution: serve the requester's wrapped copy of the current session
//! - Creation: accept a client-minted session, exactly one per contention
//! - Expiry: retire a session when both participants have left
//!
//! ## Design
//!
//! - Version counter: the current session is the one with the highest
//!   broker-assigned version. Client clocks never decide currency.
//! - Optimistic writes: creation is check-then-insert against the store's
//!   conditional insert. A losing writer re-reads and collapses onto the
//!   winner instead of failing.
//! - Opaque keys: the broker only ever sees RSA-wrapped key copies.

use std::sync::Arc;

use async_trait::async_trait;
use sealpost_core::{
    BrokerError, Chat, ChatId, ChatStore, ChatUpdate, Environment, KeyBroker, Participants,
    Session, SessionId, SessionLookup, SessionStatus, SessionWrite, StoreError, UserId,
    WrappedKeys,
};

/// Broker tuning.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Drop the wrapped key copies when a session expires.
    ///
    /// Off by default: expired sessions keep their wrap map so old records
    /// stay auditable. Turning it on makes expiry irreversible even for a
    /// participant who still holds their private key.
    pub scrub_expired_keys: bool,

    /// Conditional insert attempts before giving up with
    /// `BrokerError::Contended`.
    pub max_insert_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { scrub_expired_keys: false, max_insert_attempts: 3 }
    }
}

/// Store-backed [`KeyBroker`].
pub struct SessionKeyBroker<S, E>
where
    S: ChatStore,
    E: Environment,
{
    store: Arc<S>,
    env: E,
    config: BrokerConfig,
}

impl<S, E> SessionKeyBroker<S, E>
where
    S: ChatStore,
    E: Environment,
{
    /// Create a broker over `store`.
    pub fn new(store: Arc<S>, env: E, config: BrokerConfig) -> Self {
        Self { store, env, config }
    }

    /// Broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    async fn member_chat(&self, chat_id: ChatId, user: UserId) -> Result<Chat, BrokerError> {
        let chat = self
            .store
            .load_chat(chat_id)
            .await?
            .ok_or_else(|| BrokerError::NotFound { what: format!("chat {chat_id}") })?;

        if !chat.participants.contains(user) {
            return Err(BrokerError::NotParticipant { chat: chat_id, user });
        }

        Ok(chat)
    }

    async fn link_current(&self, chat_id: ChatId, session: SessionId) {
        // The pointer is informational; failing to update it never undoes the
        // session that is already current by version.
        match self.store.update_chat(chat_id, ChatUpdate::LinkSession(session)).await {
            Ok(Some(_)) => {},
            Ok(None) => tracing::debug!(chat = %chat_id, session = %session, "chat removed before link"),
            Err(e) => {
                tracing::warn!(chat = %chat_id, session = %session, error = %e, "failed to link current session");
            },
        }
    }
}

/// Reject wrap maps that do not cover exactly the chat's two participants.
fn validate_wrap_set(
    participants: Participants,
    wrapped_keys: &WrappedKeys,
) -> Result<(), BrokerError> {
    let missing: Vec<UserId> = participants
        .to_array()
        .into_iter()
        .filter(|user| !wrapped_keys.contains_key(user))
        .collect();
    let unexpected: Vec<UserId> =
        wrapped_keys.keys().copied().filter(|user| !participants.contains(*user)).collect();

    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(BrokerError::IncompleteWrapSet { missing, unexpected })
    }
}

#[async_trait]
impl<S, E> KeyBroker for SessionKeyBroker<S, E>
where
    S: ChatStore,
    E: Environment,
{
    async fn get_or_create_session(
        &self,
        chat_id: ChatId,
        requester: UserId,
    ) -> Result<SessionLookup, BrokerError> {
        let chat = self.member_chat(chat_id, requester).await?;

        match self.store.latest_session(chat_id).await? {
            Some(session) if session.is_active() => match session.wrapped_key_for(requester) {
                Some(wrapped_key) => Ok(SessionLookup::Active {
                    session_id: session.id,
                    wrapped_key: wrapped_key.to_string(),
                }),
                None => {
                    tracing::error!(
                        chat = %chat_id,
                        session = %session.id,
                        participant = %requester,
                        "active session has no wrapped key for participant"
                    );
                    Err(BrokerError::Corruption { session: session.id, participant: requester })
                },
            },
            _ => Ok(SessionLookup::NoneYet { participants: chat.participants }),
        }
    }

    async fn store_session(
        &self,
        chat_id: ChatId,
        creator: UserId,
        wrapped_keys: WrappedKeys,
    ) -> Result<SessionWrite, BrokerError> {
        let chat = self.member_chat(chat_id, creator).await?;
        validate_wrap_set(chat.participants, &wrapped_keys)?;

        for attempt in 1..=self.config.max_insert_attempts {
            let latest = self.store.latest_session(chat_id).await?;

            let version = match &latest {
                Some(existing) if existing.is_active() => {
                    tracing::warn!(
                        chat = %chat_id,
                        winner = %existing.id,
                        creator = %creator,
                        "session race collapsed"
                    );
                    return Ok(SessionWrite::RaceCollapsed(existing.id));
                },
                Some(expired) => expired.version + 1,
                None => 1,
            };

            let session = Session {
                id: SessionId(self.env.random_u128()),
                chat_id,
                creator,
                status: SessionStatus::Active,
                version,
                wrapped_keys: wrapped_keys.clone(),
                created_at: self.env.wall_clock(),
            };

            match self.store.insert_session(&session).await {
                Ok(()) => {
                    self.link_current(chat_id, session.id).await;
                    tracing::info!(
                        chat = %chat_id,
                        session = %session.id,
                        version,
                        creator = %creator,
                        "session created"
                    );
                    return Ok(SessionWrite::Created(session.id));
                },
                Err(StoreError::Conflict { expected, got }) => {
                    // Another writer landed between our read and insert.
                    // The next read sees it.
                    tracing::debug!(chat = %chat_id, attempt, expected, got, "session insert conflict");
                },
                Err(e) => return Err(e.into()),
            }
        }

        Err(BrokerError::Contended { chat: chat_id })
    }

    async fn expire_session(
        &self,
        chat_id: ChatId,
        session_id: SessionId,
    ) -> Result<(), BrokerError> {
        let Some(mut session) = self.store.load_session(chat_id, session_id).await? else {
            return Err(BrokerError::NotFound { what: format!("session {session_id}") });
        };

        let scrub = self.config.scrub_expired_keys && !session.wrapped_keys.is_empty();
        if session.is_active() || scrub {
            session.status = SessionStatus::Expired;
            if self.config.scrub_expired_keys {
                session.wrapped_keys.clear();
            }
            self.store.store_session(&session).await?;
            tracing::info!(chat = %chat_id, session = %session_id, scrubbed = scrub, "session expired");
        } else {
            tracing::debug!(chat = %chat_id, session = %session_id, "session already expired");
        }

        self.store.update_chat(chat_id, ChatUpdate::UnlinkSession(session_id)).await?;
        Ok(())
    }

    async fn wrapped_key_for(
        &self,
        chat_id: ChatId,
        session_id: SessionId,
        requester: UserId,
    ) -> Result<String, BrokerError> {
        self.member_chat(chat_id, requester).await?;

        let session = match self.store.load_session(chat_id, session_id).await? {
            Some(session) if session.is_active() => session,
            _ => return Err(BrokerError::NotFound { what: format!("active session {session_id}") }),
        };

        session.wrapped_key_for(requester).map(str::to_string).ok_or_else(|| {
            tracing::error!(
                chat = %chat_id,
                session = %session_id,
                participant = %requester,
                "session has no wrapped key for participant"
            );
            BrokerError::Corruption { session: session_id, participant: requester }
        })
    }
}
