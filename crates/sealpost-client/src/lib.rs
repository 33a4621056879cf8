//! Sealpost client.
//!
//! Everything that touches plaintext or unwrapped keys lives here:
//!
//! - `AuthSession`: register/login, owns the `Keyring`
//! - `SessionLifecycleMonitor`: per-chat session resolution and messaging
//! - `CleanupWatcher`: expires a session once both participants are offline
//!
//! ## Architecture
//!
//! ```text
//! sealpost-client
//!   ├─ AuthSession              (PBKDF2 + RSA identity unlock)
//!   │    └─ Keyring             (identity key, session keys)
//!   ├─ SessionLifecycleMonitor  (Uninitialized → Resolving → Active | AwaitingPeer | Error)
//!   │    └─ send / read_recent  (AES-GCM under the active session)
//!   ├─ CleanupWatcher           (presence-driven expiry + purge)
//!   └─ ClientContext            (ChatStore + KeyBroker + PresenceTracker + Environment)
//! ```
//!
//! RSA key generation, wrapping and unwrapping and PBKDF2 run on tokio's
//! blocking pool so they never stall the async executor.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod context;
mod error;
mod keyring;
mod monitor;
mod watcher;

pub use auth::AuthSession;
pub use context::ClientContext;
pub use error::ClientError;
pub use keyring::Keyring;
pub use monitor::{DecryptedMessage, MessageBody, MonitorState, SessionLifecycleMonitor};
use sealpost_crypto::CryptoError;
pub use watcher::{CleanupReport, CleanupWatcher};

/// Run CPU-heavy crypto on the blocking pool.
async fn offload<T, F>(work: F) -> Result<T, ClientError>
where
    F: FnOnce() -> Result<T, CryptoError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ClientError::InvalidState { reason: format!("crypto task failed: {e}") })?
        .map_err(ClientError::from)
}
