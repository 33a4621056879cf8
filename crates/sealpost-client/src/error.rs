//! Client error types.

use sealpost_core::{BrokerError, SessionId, StoreError, UserId};
use sealpost_crypto::CryptoError;
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Unknown user, wrong password or damaged identity record.
    ///
    /// Deliberately indistinguishable.
    #[error("login failed")]
    LoginFailed,

    /// The keyring was cleared; no key material is available.
    #[error("logged out")]
    LoggedOut,

    /// An identity already exists for this user.
    #[error("user {user} is already registered")]
    AlreadyRegistered {
        /// The registered user.
        user: UserId,
    },

    /// Chat, session or identity does not exist.
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing record.
        what: String,
    },

    /// Stored state violates an invariant (e.g. an active session missing a
    /// participant's wrapped key).
    #[error("corruption: {reason}")]
    Corruption {
        /// Description of the damage.
        reason: String,
    },

    /// Store or broker could not be reached.
    #[error("network error: {reason}")]
    Network {
        /// Description of the failure.
        reason: String,
    },

    /// The session a send was bound to is no longer the chat's active one.
    /// Nothing was stored.
    #[error("session {session} has expired")]
    SessionExpired {
        /// The retired session.
        session: SessionId,
    },

    /// Message authentication failed.
    #[error("message failed authentication")]
    Aead,

    /// Any other cryptographic failure.
    #[error("crypto error: {0}")]
    Crypto(CryptoError),

    /// Client is in an invalid state for the operation.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the state error.
        reason: String,
    },
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable by retrying).
    ///
    /// Fatal errors indicate damaged data or missing key material.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corruption { .. } | Self::LoggedOut => true,
            Self::Crypto(e) => matches!(e, CryptoError::InvalidKey { .. }),
            Self::LoginFailed
            | Self::AlreadyRegistered { .. }
            | Self::NotFound { .. }
            | Self::Network { .. }
            | Self::SessionExpired { .. }
            | Self::Aead
            | Self::InvalidState { .. } => false,
        }
    }

    /// Returns true if the user should be told about this error.
    ///
    /// Everything else is handled in place (retry, placeholder rendering).
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::LoginFailed
                | Self::LoggedOut
                | Self::AlreadyRegistered { .. }
                | Self::Corruption { .. }
                | Self::Network { .. }
        )
    }
}

impl From<CryptoError> for ClientError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Aead => Self::Aead,
            other => Self::Crypto(other),
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable { reason } => Self::Network { reason },
            StoreError::Corrupt { reason } => Self::Corruption { reason },
            StoreError::Missing { what } => Self::NotFound { what },
            StoreError::SessionInactive { session } => Self::SessionExpired { session },
            StoreError::Exists { what } => Self::InvalidState { reason: format!("{what} exists") },
            StoreError::Conflict { expected, got } => Self::InvalidState {
                reason: format!("unexpected store conflict: expected {expected}, got {got}"),
            },
        }
    }
}

impl From<BrokerError> for ClientError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::NotFound { what } => Self::NotFound { what },
            BrokerError::Corruption { .. } => Self::Corruption { reason: err.to_string() },
            BrokerError::Contended { .. } => Self::Network { reason: err.to_string() },
            BrokerError::NotParticipant { .. } | BrokerError::IncompleteWrapSet { .. } => {
                Self::InvalidState { reason: err.to_string() }
            },
            BrokerError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_failure_is_visible_not_fatal() {
        assert!(ClientError::LoginFailed.is_user_visible());
        assert!(!ClientError::LoginFailed.is_fatal());
    }

    #[test]
    fn broker_corruption_is_fatal() {
        let err: ClientError =
            BrokerError::Corruption { session: SessionId(1), participant: UserId(2) }.into();
        assert!(err.is_fatal());
        assert!(err.is_user_visible());
    }

    #[test]
    fn unavailable_store_is_network() {
        let err: ClientError = StoreError::Unavailable { reason: "timeout".to_string() }.into();
        assert_eq!(err, ClientError::Network { reason: "timeout".to_string() });
        assert!(!err.is_fatal());
    }

    #[test]
    fn inactive_session_is_expired_not_fatal() {
        let err: ClientError = StoreError::SessionInactive { session: SessionId(4) }.into();
        assert_eq!(err, ClientError::SessionExpired { session: SessionId(4) });
        assert!(!err.is_fatal());
    }

    #[test]
    fn aead_failure_is_quiet() {
        let err: ClientError = CryptoError::Aead.into();
        assert_eq!(err, ClientError::Aead);
        assert!(!err.is_user_visible());
    }

    #[test]
    fn error_display() {
        let err = ClientError::NotFound { what: "chat 01".to_string() };
        assert_eq!(err.to_string(), "not found: chat 01");
    }
}
