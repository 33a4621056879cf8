//! Inactivity janitor.
//!
//! Removes chats nobody has written to for `inactivity_timeout`. Removing a
//! chat removes its sessions and messages in one batch. Saved chats are
//! never removed, and neither is a chat touched or saved while a sweep is
//! running. The friend request that led to a removed chat survives;
//! see `ChatDirectory::open_chat`.

use std::{sync::Arc, time::Duration};

use sealpost_core::{Chat, ChatId, ChatStore, Environment, StoreError};

/// Janitor timing.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Idle time after which an unsaved chat is removed.
    pub inactivity_timeout: Duration,
    /// Delay between sweeps in `run`.
    pub sweep_interval: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Chats looked at.
    pub examined: usize,
    /// Chats removed, in id order.
    pub removed: Vec<ChatId>,
    /// Idle chats kept because they are saved.
    pub kept_saved: usize,
}

/// Periodic removal of idle chats.
pub struct InactivityJanitor<S, E>
where
    S: ChatStore,
    E: Environment,
{
    store: Arc<S>,
    env: E,
    config: JanitorConfig,
}

impl<S, E> InactivityJanitor<S, E>
where
    S: ChatStore,
    E: Environment,
{
    /// Create a janitor over `store`.
    pub fn new(store: Arc<S>, env: E, config: JanitorConfig) -> Self {
        Self { store, env, config }
    }

    /// Janitor configuration.
    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// Remove every unsaved chat idle for longer than the timeout.
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        let chats = self.store.list_chats().await?;
        self.sweep_snapshot(chats).await
    }

    /// Pick candidates from `chats`. The store re-checks each one at removal
    /// time, so a chat touched or saved after the snapshot is kept.
    async fn sweep_snapshot(&self, chats: Vec<Chat>) -> Result<SweepReport, StoreError> {
        let cutoff = self.env.wall_clock().saturating_sub(self.config.inactivity_timeout);
        let mut report = SweepReport::default();

        for chat in chats {
            report.examined += 1;

            if chat.idle_since() >= cutoff {
                continue;
            }
            if chat.saved {
                report.kept_saved += 1;
                continue;
            }

            if self.store.delete_chat_if_idle(chat.id, cutoff).await? {
                tracing::debug!(chat = %chat.id, idle_since = chat.idle_since().as_millis(), "chat removed for inactivity");
                report.removed.push(chat.id);
            } else {
                tracing::debug!(chat = %chat.id, "chat changed since snapshot, kept");
            }
        }

        if !report.removed.is_empty() {
            tracing::info!(
                examined = report.examined,
                removed = report.removed.len(),
                kept_saved = report.kept_saved,
                "inactivity sweep"
            );
        }
        Ok(report)
    }

    /// Sweep every `sweep_interval` until `shutdown` resolves.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            timeout_secs = self.config.inactivity_timeout.as_secs(),
            interval_secs = self.config.sweep_interval.as_secs(),
            "inactivity janitor started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = self.env.sleep(self.config.sweep_interval) => {
                    if let Err(e) = self.sweep().await {
                        tracing::warn!(error = %e, transient = e.is_transient(), "inactivity sweep failed");
                    }
                },
            }
        }

        tracing::info!("inactivity janitor stopped");
    }
}
