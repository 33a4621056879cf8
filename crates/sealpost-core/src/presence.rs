//! Presence tracking.
//!
//! Presence is a per-user liveness signal. The lifecycle monitor relies on
//! one guarantee: when a user's connection goes away, they transition to
//! offline without any cooperation from the client. [`MemoryPresence`]
//! models that with [`PresenceGuard`]: dropping the guard is the connection
//! loss.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::ids::UserId;

/// Liveness of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Presence {
    /// At least one live connection.
    Online,
    /// No live connection.
    Offline,
}

impl Presence {
    /// Whether the user is reachable.
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

/// Source of presence signals.
pub trait PresenceTracker: Send + Sync + 'static {
    /// Subscribe to a user's presence.
    ///
    /// The receiver starts with the current value and sees every transition.
    /// Users never seen before are offline.
    fn subscribe(&self, user: UserId) -> watch::Receiver<Presence>;

    /// Point-in-time presence of a user.
    fn presence(&self, user: UserId) -> Presence {
        *self.subscribe(user).borrow()
    }
}

struct Channel {
    sender: watch::Sender<Presence>,
    connections: usize,
}

impl Channel {
    fn new() -> Self {
        Self { sender: watch::Sender::new(Presence::Offline), connections: 0 }
    }

    fn publish(&self) {
        let next = if self.connections > 0 { Presence::Online } else { Presence::Offline };
        self.sender.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// In-memory presence with connection-counted liveness.
///
/// A user is online while at least one [`PresenceGuard`] for them is alive.
#[derive(Clone, Default)]
pub struct MemoryPresence {
    channels: Arc<Mutex<HashMap<UserId, Channel>>>,
}

impl MemoryPresence {
    /// Create a tracker with every user offline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection for `user`.
    ///
    /// The user stays online until every guard returned for them is dropped.
    pub fn connect(&self, user: UserId) -> PresenceGuard {
        {
            let mut channels = self.lock();
            let channel = channels.entry(user).or_insert_with(Channel::new);
            channel.connections += 1;
            channel.publish();
        }
        tracing::debug!(user = %user, "presence connected");

        PresenceGuard { tracker: self.clone(), user }
    }

    fn disconnect(&self, user: UserId) {
        let mut channels = self.lock();
        if let Some(channel) = channels.get_mut(&user) {
            channel.connections = channel.connections.saturating_sub(1);
            channel.publish();
            if channel.connections == 0 {
                tracing::debug!(user = %user, "presence lost");
            }
        }
    }

    // Presence must keep working even if a panicking thread held the lock;
    // the map is valid after every individual mutation.
    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PresenceTracker for MemoryPresence {
    fn subscribe(&self, user: UserId) -> watch::Receiver<Presence> {
        self.lock().entry(user).or_insert_with(Channel::new).sender.subscribe()
    }
}

impl std::fmt::Debug for MemoryPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let online = self.lock().values().filter(|c| c.connections > 0).count();
        f.debug_struct("MemoryPresence").field("online", &online).finish()
    }
}

/// A live connection. Dropping it is a disconnect.
#[must_use = "dropping the guard immediately takes the user offline"]
pub struct PresenceGuard {
    tracker: MemoryPresence,
    user: UserId,
}

impl PresenceGuard {
    /// Connected user.
    pub fn user(&self) -> UserId {
        self.user
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.tracker.disconnect(self.user);
    }
}

impl std::fmt::Debug for PresenceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceGuard").field("user", &self.user).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_is_offline() {
        let presence = MemoryPresence::new();
        assert_eq!(presence.presence(UserId(1)), Presence::Offline);
    }

    #[test]
    fn guard_drop_goes_offline() {
        let presence = MemoryPresence::new();

        let guard = presence.connect(UserId(1));
        assert_eq!(presence.presence(UserId(1)), Presence::Online);

        drop(guard);
        assert_eq!(presence.presence(UserId(1)), Presence::Offline);
    }

    #[test]
    fn online_until_last_connection_drops() {
        let presence = MemoryPresence::new();

        let first = presence.connect(UserId(1));
        let second = presence.connect(UserId(1));

        drop(first);
        assert_eq!(presence.presence(UserId(1)), Presence::Online);

        drop(second);
        assert_eq!(presence.presence(UserId(1)), Presence::Offline);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let presence = MemoryPresence::new();
        let mut rx = presence.subscribe(UserId(3));
        assert_eq!(*rx.borrow_and_update(), Presence::Offline);

        let guard = presence.connect(UserId(3));
        rx.changed().await.unwrap_or_default();
        assert_eq!(*rx.borrow_and_update(), Presence::Online);

        drop(guard);
        rx.changed().await.unwrap_or_default();
        assert_eq!(*rx.borrow_and_update(), Presence::Offline);
    }

    #[test]
    fn second_connection_does_not_renotify() {
        let presence = MemoryPresence::new();
        let _first = presence.connect(UserId(4));

        let mut rx = presence.subscribe(UserId(4));
        let _ = rx.borrow_and_update();

        let _second = presence.connect(UserId(4));
        assert!(!rx.has_changed().unwrap_or(true));
    }
}
