//! Abandoned-chat cleanup.
//!
//! Watches both participants of a chat. The first time both are offline at
//! once, the current session is expired through the broker and every
//! message bound to an expired session of the chat is deleted. This is the
//! only path that removes messages; the chat document itself is left alone.
//!
//! Expiry and the message purge are two separate writes. A crash between
//! them leaves an expired session whose messages are still stored; the next
//! `cleanup` of the chat purges them, even if a newer session was created
//! in the meantime.

use std::sync::Arc;

use sealpost_core::{ChatId, Environment, Participants, SessionId};
use tokio::sync::watch;

use crate::{context::ClientContext, error::ClientError, keyring::Keyring};

/// What one cleanup removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Session that was expired, if the chat had one.
    pub session: Option<SessionId>,
    /// Messages deleted.
    pub purged: usize,
}

/// Expires a chat's session once both participants are gone.
pub struct CleanupWatcher<E: Environment> {
    ctx: ClientContext<E>,
    keyring: Option<Arc<Keyring>>,
    chat: ChatId,
    participants: Participants,
}

impl<E: Environment> CleanupWatcher<E> {
    /// Watch `chat`.
    ///
    /// # Errors
    ///
    /// `ClientError::NotFound` if the chat does not exist.
    pub async fn new(ctx: ClientContext<E>, chat: ChatId) -> Result<Self, ClientError> {
        let participants = ctx
            .store
            .load_chat(chat)
            .await?
            .ok_or_else(|| ClientError::NotFound { what: format!("chat {chat}") })?
            .participants;

        Ok(Self { ctx, keyring: None, chat, participants })
    }

    /// Also evict the expired session key from `keyring`.
    #[must_use]
    pub fn evicting_from(mut self, keyring: Arc<Keyring>) -> Self {
        self.keyring = Some(keyring);
        self
    }

    /// Wait for both participants to be offline, then clean up once.
    pub async fn run(self) -> Result<CleanupReport, ClientError> {
        self.wait_until_abandoned().await?;
        self.cleanup().await
    }

    /// Resolve as soon as both participants are offline at the same time.
    pub async fn wait_until_abandoned(&self) -> Result<(), ClientError> {
        let [a, b] = self.participants.to_array();
        let mut first = self.ctx.presence.subscribe(a);
        let mut second = self.ctx.presence.subscribe(b);

        loop {
            let first_online = first.borrow_and_update().is_online();
            let second_online = second.borrow_and_update().is_online();
            if !first_online && !second_online {
                tracing::debug!(chat = %self.chat, "both participants offline");
                return Ok(());
            }

            tokio::select! {
                changed = first.changed() => closed_feed(changed)?,
                changed = second.changed() => closed_feed(changed)?,
            }
        }
    }

    /// Expire the current session and purge the messages of every expired
    /// session.
    ///
    /// Safe to repeat: an already expired session is only purged again.
    pub async fn cleanup(&self) -> Result<CleanupReport, ClientError> {
        let Some(latest) = self.ctx.store.latest_session(self.chat).await? else {
            return Ok(CleanupReport::default());
        };

        if latest.is_active() {
            self.ctx.broker.expire_session(self.chat, latest.id).await?;
        }

        let mut ids = Vec::new();
        let mut retired = Vec::new();
        for session in self.ctx.store.sessions(self.chat).await? {
            // Only a session created after our expiry can still be active.
            if session.is_active() {
                continue;
            }
            ids.extend(self.ctx.store.message_ids_for_session(self.chat, session.id).await?);
            retired.push(session.id);
        }

        let purged = if ids.is_empty() {
            0
        } else {
            self.ctx.store.delete_messages(self.chat, &ids).await?
        };

        if let Some(keyring) = &self.keyring {
            for session in &retired {
                keyring.evict(*session);
            }
        }

        tracing::info!(chat = %self.chat, session = %latest.id, sessions = retired.len(), purged, "abandoned session cleaned up");
        Ok(CleanupReport { session: Some(latest.id), purged })
    }
}

fn closed_feed(changed: Result<(), watch::error::RecvError>) -> Result<(), ClientError> {
    changed.map_err(|_| ClientError::Network { reason: "presence feed closed".to_string() })
}
