//! Session lifecycle monitor.
//!
//! One monitor drives one open chat view. It resolves the chat's current
//! session key through the broker, mints one when none exists and both
//! participants are online, and parks in `AwaitingPeer` otherwise.
//!
//! # State Machine
//!
//! ```text
//!                 open()
//!  Uninitialized ────────► Resolving ──┬──► Active { session_id } ──send(), session retired──┐
//!                             ▲        ├──► AwaitingPeer { peer } ──await_peer()──┐       │
//!                             │        └──► Error { cause } ──retry()──┐          │       │
//!                             └────────────────────────────────────────┴──────────┴───────┘
//!  Active ──send(), chat removed──► Error
//!  any ──close()──► Closed
//! ```
//!
//! # Invariants
//!
//! - A minted key is only cached after the broker accepted it. A collapsed
//!   race discards the minted key and adopts the winner's.
//! - `Error` is sticky: nothing resolves again until `retry()`.
//! - `Active` is only trusted locally. Every send re-checks the session
//!   against the store, and a retired session is never used to seal.
//! - Cancelling a call mid-flight leaves nothing persisted, because minted
//!   keys live only in memory until `store_session` returns.

mod conversation;

use std::sync::Arc;

pub use conversation::{DecryptedMessage, MessageBody};
use sealpost_core::{
    ChatId, EnvRng, Environment, Participants, SessionId, SessionLookup, SessionWrite, UserId,
    WrappedKeys,
};
use sealpost_crypto::{
    IdentityPublicKey, SessionKey, WrappedKey, unwrap_session_key, wrap_session_key,
};

use crate::{auth::AuthSession, context::ClientContext, error::ClientError, keyring::Keyring, offload};

/// Rounds of lookup-then-create before giving up on a chat whose session
/// keeps changing underneath us.
const MAX_RESOLVE_ROUNDS: usize = 3;

/// Where a monitor is in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// Created, not opened yet.
    Uninitialized,
    /// Talking to the broker.
    Resolving,
    /// The session key is in the keyring; messages can be sent and read.
    Active {
        /// Current session.
        session_id: SessionId,
    },
    /// No session exists and the peer is offline.
    AwaitingPeer {
        /// The participant we are waiting for.
        peer: UserId,
    },
    /// Resolution failed; only `retry()` leaves this state.
    Error {
        /// What went wrong.
        cause: ClientError,
    },
    /// The view was closed.
    Closed,
}

/// Per-chat session state machine.
pub struct SessionLifecycleMonitor<E: Environment> {
    ctx: ClientContext<E>,
    keyring: Arc<Keyring>,
    me: UserId,
    chat: ChatId,
    state: MonitorState,
}

impl<E: Environment> SessionLifecycleMonitor<E> {
    /// A monitor for `chat` on behalf of the logged-in user.
    pub fn new(ctx: ClientContext<E>, auth: &AuthSession, chat: ChatId) -> Self {
        Self::with_keyring(ctx, auth.keyring(), auth.user(), chat)
    }

    /// A monitor sharing an existing keyring.
    pub fn with_keyring(
        ctx: ClientContext<E>,
        keyring: Arc<Keyring>,
        me: UserId,
        chat: ChatId,
    ) -> Self {
        Self { ctx, keyring, me, chat, state: MonitorState::Uninitialized }
    }

    /// Current state.
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Chat this monitor drives.
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    /// The active session, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        match self.state {
            MonitorState::Active { session_id } => Some(session_id),
            _ => None,
        }
    }

    /// Resolve the session for the first time.
    ///
    /// Does nothing outside `Uninitialized`.
    pub async fn open(&mut self) -> &MonitorState {
        if self.state == MonitorState::Uninitialized {
            self.resolve().await;
        }
        &self.state
    }

    /// Leave `Error` by resolving again.
    ///
    /// Does nothing outside `Error`.
    pub async fn retry(&mut self) -> &MonitorState {
        if matches!(self.state, MonitorState::Error { .. }) {
            tracing::debug!(chat = %self.chat, "retrying session resolution");
            self.resolve().await;
        }
        &self.state
    }

    /// Wait for the peer to come online, then resolve again.
    ///
    /// Does nothing outside `AwaitingPeer`.
    pub async fn await_peer(&mut self) -> &MonitorState {
        let MonitorState::AwaitingPeer { peer } = self.state else {
            return &self.state;
        };

        let mut presence = self.ctx.presence.subscribe(peer);
        if presence.wait_for(|p| p.is_online()).await.is_err() {
            self.state = MonitorState::Error {
                cause: ClientError::Network { reason: "presence feed closed".to_string() },
            };
            return &self.state;
        }

        tracing::debug!(chat = %self.chat, peer = %peer, "peer online");
        self.resolve().await;
        &self.state
    }

    /// Close the view. Final.
    pub fn close(&mut self) {
        tracing::debug!(chat = %self.chat, from = ?self.state, "monitor closed");
        self.state = MonitorState::Closed;
    }

    async fn resolve(&mut self) {
        self.state = MonitorState::Resolving;

        self.state = match self.resolve_session().await {
            Ok(next) => next,
            Err(cause) => {
                if cause.is_fatal() {
                    tracing::error!(chat = %self.chat, error = %cause, "session resolution failed");
                } else {
                    tracing::warn!(chat = %self.chat, error = %cause, "session resolution failed");
                }
                MonitorState::Error { cause }
            },
        };
        tracing::debug!(chat = %self.chat, state = ?self.state, "resolved");
    }

    async fn resolve_session(&self) -> Result<MonitorState, ClientError> {
        for _ in 0..MAX_RESOLVE_ROUNDS {
            match self.ctx.broker.get_or_create_session(self.chat, self.me).await? {
                SessionLookup::Active { session_id, wrapped_key } => {
                    self.install(session_id, &wrapped_key).await?;
                    return Ok(MonitorState::Active { session_id });
                },
                SessionLookup::NoneYet { participants } => {
                    let peer = participants.other(self.me).ok_or_else(|| {
                        ClientError::InvalidState {
                            reason: format!("{} is not in chat {}", self.me, self.chat),
                        }
                    })?;

                    let presence = &self.ctx.presence;
                    if !presence.presence(self.me).is_online() || !presence.presence(peer).is_online()
                    {
                        return Ok(MonitorState::AwaitingPeer { peer });
                    }

                    let key = SessionKey::generate(&mut EnvRng::new(self.ctx.env.clone()));
                    let wrapped_keys = self.wrap_for(participants, &key).await?;

                    match self.ctx.broker.store_session(self.chat, self.me, wrapped_keys).await? {
                        SessionWrite::Created(session_id) => {
                            self.keyring.insert_session(session_id, key)?;
                            return Ok(MonitorState::Active { session_id });
                        },
                        SessionWrite::RaceCollapsed(winner) => {
                            tracing::debug!(chat = %self.chat, winner = %winner, "discarding minted key");
                        },
                    }
                },
            }
        }

        Err(ClientError::InvalidState {
            reason: format!("session for chat {} kept changing", self.chat),
        })
    }

    /// Unwrap and cache our copy of a session key.
    pub(crate) async fn install(
        &self,
        session_id: SessionId,
        wrapped_key: &str,
    ) -> Result<SessionKey, ClientError> {
        if let Some(key) = self.keyring.session_key(session_id)? {
            return Ok(key);
        }

        let identity = self.keyring.identity()?;
        let wrapped = WrappedKey::from_base64(wrapped_key)?;
        let key = offload(move || unwrap_session_key(&wrapped, &identity)).await?;

        self.keyring.insert_session(session_id, key.clone())?;
        tracing::debug!(chat = %self.chat, session = %session_id, "session key installed");
        Ok(key)
    }

    async fn wrap_for(
        &self,
        participants: Participants,
        key: &SessionKey,
    ) -> Result<WrappedKeys, ClientError> {
        let mut recipients = Vec::with_capacity(2);
        for user in participants.to_array() {
            let identity = self.ctx.store.load_identity(user).await?.ok_or_else(|| {
                ClientError::NotFound { what: format!("identity of {user}") }
            })?;
            recipients.push((user, IdentityPublicKey::from_base64(&identity.public_key)?));
        }

        let key = key.clone();
        let mut rng = EnvRng::new(self.ctx.env.clone());
        offload(move || {
            recipients
                .iter()
                .map(|(user, public_key)| {
                    wrap_session_key(&key, public_key, &mut rng).map(|w| (*user, w.to_base64()))
                })
                .collect()
        })
        .await
    }
}

impl<E: Environment> std::fmt::Debug for SessionLifecycleMonitor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLifecycleMonitor")
            .field("me", &self.me)
            .field("chat", &self.chat)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
