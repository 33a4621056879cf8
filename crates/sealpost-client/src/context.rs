//! Collaborators shared by every monitor of one client.

use std::sync::Arc;

use sealpost_core::{ChatStore, Environment, KeyBroker, PresenceTracker};

/// Handles to the store, broker and presence feed, plus the environment.
///
/// Cheap to clone. The collaborators are trait objects so a client can talk
/// to an in-process broker or a remote one without changing type.
pub struct ClientContext<E: Environment> {
    /// Document store.
    pub store: Arc<dyn ChatStore>,
    /// Session key broker.
    pub broker: Arc<dyn KeyBroker>,
    /// Presence feed.
    pub presence: Arc<dyn PresenceTracker>,
    /// Time and randomness.
    pub env: E,
}

impl<E: Environment> ClientContext<E> {
    /// Bundle collaborators.
    pub fn new(
        store: Arc<dyn ChatStore>,
        broker: Arc<dyn KeyBroker>,
        presence: Arc<dyn PresenceTracker>,
        env: E,
    ) -> Self {
        Self { store, broker, presence, env }
    }
}

impl<E: Environment> Clone for ClientContext<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            broker: Arc::clone(&self.broker),
            presence: Arc::clone(&self.presence),
            env: self.env.clone(),
        }
    }
}

impl<E: Environment> std::fmt::Debug for ClientContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext").finish_non_exhaustive()
    }
}
