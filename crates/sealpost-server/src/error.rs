//! Server error types.

use sealpost_core::StoreError;
use thiserror::Error;

/// Errors that can occur while configuring or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Invalid runtime configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Store failure outside a broker or directory call
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
