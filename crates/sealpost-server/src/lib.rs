//! Sealpost server.
//!
//! This crate provides the trusted side of the transport:
//! - `SessionKeyBroker`: decides the current session key per chat and routes
//!   wrapped copies of it
//! - `ChatDirectory`: friend requests and the chats they lead to
//! - `InactivityJanitor`: removes idle chats with their sessions and messages
//! - `SystemEnv`: system time and OS entropy
//!
//! ## Architecture
//!
//! ```text
//! sealpost-server
//!   ├─ SystemEnv          (production Environment impl)
//!   ├─ SessionKeyBroker   (KeyBroker over a ChatStore)
//!   ├─ ChatDirectory      (friend requests, chat recreation)
//!   ├─ InactivityJanitor  (periodic idle-chat sweep)
//!   ├─ MemoryPresence     (connection-counted presence)
//!   └─ ChatStore          (document persistence)
//! ```
//!
//! The broker never holds a usable key: it stores and hands out RSA-wrapped
//! copies only. Clients mint, wrap and unwrap.
//!
//! There is no network front end. An embedding process builds a [`Server`]
//! over its store, hands [`Server::broker`] and [`Server::presence`] to its
//! clients and drives [`Server::run`] until shutdown. The `sealpost-sim`
//! binary in `sealpost-harness` does exactly that over a simulated clock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod broker;
mod directory;
mod error;
mod janitor;
mod system_env;
#[cfg(test)]
mod testing;

use std::sync::Arc;

pub use broker::{BrokerConfig, SessionKeyBroker};
pub use directory::{ChatDirectory, DirectoryError};
pub use error::ServerError;
pub use janitor::{InactivityJanitor, JanitorConfig, SweepReport};
use sealpost_core::{ChatStore, Environment, MemoryChatStore, MemoryPresence};
pub use system_env::SystemEnv;

/// Server configuration for the production runtime.
#[derive(Debug, Clone, Default)]
pub struct ServerRuntimeConfig {
    /// Broker behavior
    pub broker: BrokerConfig,
    /// Inactivity sweep timing
    pub janitor: JanitorConfig,
}

impl ServerRuntimeConfig {
    /// Reject configurations the janitor cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.janitor.sweep_interval.is_zero() {
            return Err(ServerError::Config("sweep interval must be non-zero".to_string()));
        }
        if self.janitor.inactivity_timeout.is_zero() {
            return Err(ServerError::Config("inactivity timeout must be non-zero".to_string()));
        }
        if self.broker.max_insert_attempts == 0 {
            return Err(ServerError::Config("max insert attempts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Sealpost server components sharing one store and environment.
pub struct Server<S = MemoryChatStore, E = SystemEnv>
where
    S: ChatStore,
    E: Environment,
{
    store: Arc<S>,
    broker: Arc<SessionKeyBroker<S, E>>,
    directory: ChatDirectory<S, E>,
    janitor: InactivityJanitor<S, E>,
    presence: MemoryPresence,
}

impl<S, E> Server<S, E>
where
    S: ChatStore,
    E: Environment,
{
    /// Assemble a server over `store`.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configuration is invalid.
    pub fn new(store: Arc<S>, env: E, config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self::assemble(store, env, config))
    }

    /// Assemble a server over `store` with the default configuration.
    pub fn with_defaults(store: Arc<S>, env: E) -> Self {
        Self::assemble(store, env, ServerRuntimeConfig::default())
    }

    fn assemble(store: Arc<S>, env: E, config: ServerRuntimeConfig) -> Self {
        let broker =
            Arc::new(SessionKeyBroker::new(Arc::clone(&store), env.clone(), config.broker));
        let directory = ChatDirectory::new(Arc::clone(&store), env.clone());
        let janitor = InactivityJanitor::new(Arc::clone(&store), env, config.janitor);

        Self { store, broker, directory, janitor, presence: MemoryPresence::new() }
    }

    /// Shared document store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Session key broker, shareable with clients.
    pub fn broker(&self) -> Arc<SessionKeyBroker<S, E>> {
        Arc::clone(&self.broker)
    }

    /// Friend requests and chats.
    pub fn directory(&self) -> &ChatDirectory<S, E> {
        &self.directory
    }

    /// Idle chat removal.
    pub fn janitor(&self) -> &InactivityJanitor<S, E> {
        &self.janitor
    }

    /// Presence tracker.
    pub fn presence(&self) -> &MemoryPresence {
        &self.presence
    }

    /// Sweep once, then run background work until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Store` if the startup sweep cannot reach the
    /// store. Later sweep failures are logged and retried.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let report = self.janitor.sweep().await?;
        tracing::info!(chats = report.examined, removed = report.removed.len(), "startup sweep");

        self.janitor.run(shutdown).await;
        tracing::info!("server stopped");
        Ok(())
    }
}
