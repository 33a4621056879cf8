//! Per-login key material.
//!
//! The keyring holds the unwrapped private identity key and every session
//! key this client has unwrapped or minted. It is an explicit object, owned
//! by an [`AuthSession`](crate::AuthSession) and shared with monitors by
//! `Arc`. There is no global key state.
//!
//! # Invariants
//!
//! - After `clear()` every lookup fails with `ClientError::LoggedOut` and no
//!   key material remains reachable from the keyring.
//! - Session keys are zeroized when evicted or cleared.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use sealpost_core::SessionId;
use sealpost_crypto::{IdentityKey, SessionKey};

use crate::error::ClientError;

#[derive(Default)]
struct KeyringState {
    identity: Option<Arc<IdentityKey>>,
    sessions: HashMap<SessionId, SessionKey>,
}

/// Key material for one logged-in user.
#[derive(Default)]
pub struct Keyring {
    state: Mutex<KeyringState>,
}

impl Keyring {
    /// An empty, logged-out keyring.
    pub fn new() -> Self {
        Self::default()
    }

    /// A keyring unlocked with `identity`.
    pub fn unlocked(identity: IdentityKey) -> Self {
        Self {
            state: Mutex::new(KeyringState {
                identity: Some(Arc::new(identity)),
                sessions: HashMap::new(),
            }),
        }
    }

    /// Whether a private identity key is present.
    pub fn is_unlocked(&self) -> bool {
        self.lock().identity.is_some()
    }

    /// The private identity key.
    pub fn identity(&self) -> Result<Arc<IdentityKey>, ClientError> {
        self.lock().identity.clone().ok_or(ClientError::LoggedOut)
    }

    /// Cache a session key.
    pub fn insert_session(&self, id: SessionId, key: SessionKey) -> Result<(), ClientError> {
        let mut state = self.lock();
        if state.identity.is_none() {
            return Err(ClientError::LoggedOut);
        }
        state.sessions.insert(id, key);
        Ok(())
    }

    /// A cached session key, if this client holds it.
    pub fn session_key(&self, id: SessionId) -> Result<Option<SessionKey>, ClientError> {
        let state = self.lock();
        if state.identity.is_none() {
            return Err(ClientError::LoggedOut);
        }
        Ok(state.sessions.get(&id).cloned())
    }

    /// Forget a session key. Returns whether it was held.
    pub fn evict(&self, id: SessionId) -> bool {
        self.lock().sessions.remove(&id).is_some()
    }

    /// Drop all key material.
    pub fn clear(&self) {
        let mut state = self.lock();
        let sessions = state.sessions.len();
        state.sessions.clear();
        state.identity = None;
        tracing::debug!(sessions, "keyring cleared");
    }

    // Every mutation leaves the maps consistent, so a poisoned lock is safe
    // to reuse.
    fn lock(&self) -> MutexGuard<'_, KeyringState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Keyring")
            .field("unlocked", &state.identity.is_some())
            .field("sessions", &state.sessions.len())
            .finish()
    }
}
