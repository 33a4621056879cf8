//! Sealpost Cryptographic Primitives
//!
//! This crate provides the cryptographic building blocks for the Sealpost
//! session-keyed transport.
//!
//! # Design
//!
//! All functions in this crate are pure. Randomness is never drawn from an
//! ambient source: callers pass a cryptographically secure RNG handle, which
//! enables:
//!
//! - Deterministic testing with seeded RNG
//! - Sans-IO architecture compatibility
//! - No coupling to application-level abstractions
//!
//! # Components
//!
//! - [`identity`]: long-lived RSA-OAEP identity keys and their
//!   password-derived wrapping
//! - [`wrap`]: per-participant wrapping of the chat session key
//! - [`codec`]: AES-256-GCM message sealing under a session key
//!
//! # Security Properties
//!
//! - Wrong password fails authentication: identity blobs are AEAD-sealed, so
//!   a bad password never yields garbage key material
//! - IV freshness: the codec draws a new 96-bit IV for every message and does
//!   not accept caller-chosen IVs
//! - Key hygiene: session keys and derived wrapping keys zeroize on drop

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
mod encoding;
mod error;
pub mod identity;
pub mod wrap;

pub use codec::{IV_SIZE, SealedMessage, TAG_SIZE, decrypt, encrypt};
pub use encoding::{decode_base64, encode_base64};
pub use error::CryptoError;
pub use identity::{
    IdentityBundle, IdentityKey, IdentityPublicKey, PBKDF2_ITERATIONS, RSA_KEY_BITS, SALT_SIZE,
    generate_identity, reject_unknown_identity, unwrap_identity,
};
pub use wrap::{KEY_SIZE, SessionKey, WrappedKey, unwrap_session_key, wrap_session_key};
