//! Session keys and their per-participant wrapping.
//!
//! A chat has exactly one live AES-256 session key. The key is never stored
//! in the clear: each participant gets a copy encrypted under their RSA-OAEP
//! (SHA-256) identity public key, so only the matching private key recovers
//! it.
//!
//! Wire format of a wrapped copy: `base64(RSA-OAEP-SHA256(raw 32-byte key))`.

use rand::{CryptoRng, RngCore};
use rsa::Oaep;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    CryptoError,
    encoding::{decode_base64, encode_base64},
    identity::{IdentityKey, IdentityPublicKey},
};

/// Size of a session key in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// Symmetric key protecting every message of one session.
///
/// Zeroized on drop. `Debug` is redacted.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Mint a fresh key from a CSPRNG.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// A session key encrypted for one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Parse the base64 wire form.
    pub fn from_base64(field: &str) -> Result<Self, CryptoError> {
        decode_base64(field).map(Self)
    }

    /// Base64 wire form.
    pub fn to_base64(&self) -> String {
        encode_base64(&self.0)
    }

    /// Raw RSA ciphertext.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Wrap a session key for a recipient.
pub fn wrap_session_key<R: CryptoRng + RngCore>(
    key: &SessionKey,
    recipient: &IdentityPublicKey,
    rng: &mut R,
) -> Result<WrappedKey, CryptoError> {
    recipient
        .rsa()
        .encrypt(rng, Oaep::new::<Sha256>(), key.as_bytes())
        .map(WrappedKey)
        .map_err(|e| CryptoError::KeyWrap { reason: e.to_string() })
}

/// Recover a session key with the recipient's private identity key.
///
/// Fails with [`CryptoError::KeyWrap`] when the key was wrapped for someone
/// else or the ciphertext was altered.
pub fn unwrap_session_key(
    wrapped: &WrappedKey,
    identity: &IdentityKey,
) -> Result<SessionKey, CryptoError> {
    let raw = Zeroizing::new(
        identity
            .rsa()
            .decrypt(Oaep::new::<Sha256>(), wrapped.as_bytes())
            .map_err(|e| CryptoError::KeyWrap { reason: e.to_string() })?,
    );

    let bytes: [u8; KEY_SIZE] = raw.as_slice().try_into().map_err(|_| CryptoError::KeyWrap {
        reason: format!("unwrapped key is {} bytes, expected {KEY_SIZE}", raw.len()),
    })?;

    Ok(SessionKey(bytes))
}
