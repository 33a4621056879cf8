//! CBOR document encoding.
//!
//! Stored documents are opaque bytes to the store. Every read decodes, so a
//! damaged document surfaces as [`StoreError::Corrupt`] instead of a default
//! value.

use serde::{Serialize, de::DeserializeOwned};

use super::StoreError;

/// Encode a document.
pub fn encode_document<T: Serialize>(document: &T) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(document, &mut bytes)
        .map_err(|e| StoreError::Corrupt { reason: e.to_string() })?;
    Ok(bytes)
}

/// Decode a document.
pub fn decode_document<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    ciborium::de::from_reader(bytes).map_err(|e| StoreError::Corrupt { reason: e.to_string() })
}
