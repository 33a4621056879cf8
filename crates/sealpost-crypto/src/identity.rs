//! Long-lived identity keypairs.
//!
//! Every user owns one RSA-OAEP keypair. The public half is published; the
//! private half is stored only as an AES-256-GCM blob sealed under a key
//! derived from the user's password:
//!
//! ```text
//! wrapping_key = PBKDF2-HMAC-SHA256(password, salt, 100_000, 32 bytes)
//! blob         = AES-256-GCM(wrapping_key, iv, PKCS8-DER(private_key))
//! ```
//!
//! Salt and IV are fresh per generation. Because the blob is authenticated,
//! a wrong password surfaces as [`CryptoError::AuthFailure`] instead of a
//! garbage key.

use rand::{CryptoRng, RngCore};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey},
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{
    CryptoError,
    codec::{IV_SIZE, open, seal},
    encoding::{decode_base64, encode_base64},
    wrap::KEY_SIZE,
};

/// RSA modulus size in bits.
pub const RSA_KEY_BITS: usize = 2048;

/// PBKDF2 iteration count for the wrapping key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt size in bytes for the wrapping key derivation.
pub const SALT_SIZE: usize = 16;

/// Private identity key.
///
/// The underlying RSA key zeroizes itself on drop. `Debug` is redacted.
#[derive(Clone)]
pub struct IdentityKey(RsaPrivateKey);

impl IdentityKey {
    /// Generate a fresh keypair.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Result<Self, CryptoError> {
        RsaPrivateKey::new(rng, RSA_KEY_BITS)
            .map(Self)
            .map_err(|e| CryptoError::KeyGeneration { reason: e.to_string() })
    }

    /// Matching public key.
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.0.to_public_key())
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.0
    }
}

impl std::fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("IdentityKey(<redacted>)")
    }
}

/// Public identity key, published as base64 SPKI DER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPublicKey(RsaPublicKey);

impl IdentityPublicKey {
    /// Parse the base64 SPKI DER form.
    pub fn from_base64(field: &str) -> Result<Self, CryptoError> {
        let der = decode_base64(field)?;
        RsaPublicKey::from_public_key_der(&der)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })
    }

    /// Base64 SPKI DER form.
    pub fn to_base64(&self) -> Result<String, CryptoError> {
        let der = self
            .0
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;
        Ok(encode_base64(der.as_bytes()))
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.0
    }
}

/// Everything persisted for an identity. All fields are base64.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityBundle {
    /// SPKI DER public key.
    pub public_key: String,
    /// AES-GCM sealed PKCS8 DER private key.
    pub encrypted_private_key: String,
    /// IV the private key was sealed under.
    pub iv: String,
    /// PBKDF2 salt.
    pub salt: String,
}

impl std::fmt::Debug for IdentityBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityBundle")
            .field("public_key", &self.public_key)
            .field(
                "encrypted_private_key",
                &format!("<redacted {} chars>", self.encrypted_private_key.len()),
            )
            .finish_non_exhaustive()
    }
}

/// Generate an identity and seal its private half under `password`.
///
/// Returns the bundle to persist and the live private key so the caller does
/// not have to unwrap what it just created.
pub fn generate_identity<R: CryptoRng + RngCore>(
    password: &str,
    rng: &mut R,
) -> Result<(IdentityBundle, IdentityKey), CryptoError> {
    let key = IdentityKey::generate(rng)?;

    let mut salt = [0u8; SALT_SIZE];
    rng.fill_bytes(&mut salt);
    let mut iv = [0u8; IV_SIZE];
    rng.fill_bytes(&mut iv);

    let wrapping_key = derive_wrapping_key(password, &salt);
    let pkcs8 =
        key.0.to_pkcs8_der().map_err(|e| CryptoError::InvalidKey { reason: e.to_string() })?;
    let sealed = seal(&wrapping_key, &iv, pkcs8.as_bytes())?;

    let bundle = IdentityBundle {
        public_key: key.public_key().to_base64()?,
        encrypted_private_key: encode_base64(&sealed),
        iv: encode_base64(&iv),
        salt: encode_base64(&salt),
    };

    Ok((bundle, key))
}

/// Recover the private identity key from its sealed bundle.
///
/// Every failure, including malformed fields, is reported as
/// [`CryptoError::AuthFailure`] so callers cannot tell a wrong password from
/// a damaged record.
pub fn unwrap_identity(password: &str, bundle: &IdentityBundle) -> Result<IdentityKey, CryptoError> {
    let salt = decode_base64(&bundle.salt).map_err(|_| CryptoError::AuthFailure)?;
    let iv: [u8; IV_SIZE] = decode_base64(&bundle.iv)
        .map_err(|_| CryptoError::AuthFailure)?
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::AuthFailure)?;
    let sealed =
        decode_base64(&bundle.encrypted_private_key).map_err(|_| CryptoError::AuthFailure)?;

    let wrapping_key = derive_wrapping_key(password, &salt);
    let pkcs8 =
        Zeroizing::new(open(&wrapping_key, &iv, &sealed).map_err(|_| CryptoError::AuthFailure)?);

    RsaPrivateKey::from_pkcs8_der(&pkcs8).map(IdentityKey).map_err(|_| CryptoError::AuthFailure)
}

/// Spend what [`unwrap_identity`] spends, for a user with no identity.
///
/// Runs the same key derivation and AEAD check against a fixed decoy and
/// always returns [`CryptoError::AuthFailure`], so an unknown user costs a
/// login as much time as a wrong password.
pub fn reject_unknown_identity(password: &str) -> CryptoError {
    let wrapping_key = derive_wrapping_key(password, &[0u8; SALT_SIZE]);
    let _ = open(&wrapping_key, &[0u8; IV_SIZE], &[0u8; DECOY_SEALED_LEN]);
    CryptoError::AuthFailure
}

/// Roughly the sealed size of a PKCS8 RSA-2048 key.
const DECOY_SEALED_LEN: usize = 1_232;

fn derive_wrapping_key(password: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, key.as_mut());
    key
}
