//! Crypto error types.

use thiserror::Error;

/// Errors from cryptographic operations.
///
/// Variants deliberately carry no key material and no detail about which
/// internal step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Identity unwrap failed (wrong password or tampered blob).
    #[error("authentication failed")]
    AuthFailure,

    /// Message authentication failed (tampering, truncation or wrong key).
    #[error("AEAD decryption failed")]
    Aead,

    /// Session key wrap or unwrap failed.
    #[error("session key wrap failed: {reason}")]
    KeyWrap {
        /// Description of the failure.
        reason: String,
    },

    /// A key could not be parsed or has the wrong size.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Description of the failure.
        reason: String,
    },

    /// A wire field was not valid base64.
    #[error("invalid encoding: {reason}")]
    Encoding {
        /// Description of the failure.
        reason: String,
    },

    /// Keypair generation failed.
    #[error("key generation failed: {reason}")]
    KeyGeneration {
        /// Description of the failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failure_display_is_uniform() {
        assert_eq!(CryptoError::AuthFailure.to_string(), "authentication failed");
    }

    #[test]
    fn key_wrap_display() {
        let err = CryptoError::KeyWrap { reason: "bad length".to_string() };
        assert_eq!(err.to_string(), "session key wrap failed: bad length");
    }
}
