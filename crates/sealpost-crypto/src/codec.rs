//! Message codec: AES-256-GCM under the active session key.
//!
//! Each call to [`encrypt`] draws a fresh 96-bit IV from the caller's CSPRNG.
//! Reusing an IV under the same key breaks both confidentiality and
//! integrity of GCM, so the API offers no way to pass one in.
//!
//! Wire format: two sibling base64 fields, the ciphertext (with the 16-byte
//! tag appended) and the IV.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{CryptoRng, RngCore};

use crate::{
    CryptoError, SessionKey,
    encoding::{decode_base64, encode_base64},
    wrap::KEY_SIZE,
};

/// Size of the GCM IV in bytes (96 bits).
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Ciphertext and the IV it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
    /// IV used for this message only.
    pub iv: [u8; IV_SIZE],
}

impl SealedMessage {
    /// Parse the two base64 wire fields.
    ///
    /// A malformed IV is reported as [`CryptoError::Aead`]: for the reader it
    /// is indistinguishable from tampering.
    pub fn from_base64(ciphertext: &str, iv: &str) -> Result<Self, CryptoError> {
        let ciphertext = decode_base64(ciphertext)?;
        let iv: [u8; IV_SIZE] =
            decode_base64(iv)?.as_slice().try_into().map_err(|_| CryptoError::Aead)?;
        Ok(Self { ciphertext, iv })
    }

    /// Base64 ciphertext field.
    pub fn ciphertext_base64(&self) -> String {
        encode_base64(&self.ciphertext)
    }

    /// Base64 IV field.
    pub fn iv_base64(&self) -> String {
        encode_base64(&self.iv)
    }
}

/// Encrypt a message body under a session key.
pub fn encrypt<R: CryptoRng + RngCore>(
    plaintext: &[u8],
    key: &SessionKey,
    rng: &mut R,
) -> Result<SealedMessage, CryptoError> {
    let mut iv = [0u8; IV_SIZE];
    rng.fill_bytes(&mut iv);

    let ciphertext = seal(key.as_bytes(), &iv, plaintext)?;
    Ok(SealedMessage { ciphertext, iv })
}

/// Decrypt a message body.
///
/// Either the complete plaintext or [`CryptoError::Aead`]; never partial
/// output.
pub fn decrypt(sealed: &SealedMessage, key: &SessionKey) -> Result<Vec<u8>, CryptoError> {
    open(key.as_bytes(), &sealed.iv, &sealed.ciphertext)
}

pub(crate) fn seal(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher.encrypt(Nonce::from_slice(iv), plaintext).map_err(|_| CryptoError::Aead)
}

pub(crate) fn open(
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::Aead);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher.decrypt(Nonce::from_slice(iv), ciphertext).map_err(|_| CryptoError::Aead)
}
