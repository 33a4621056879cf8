//! Base64 wire encoding (standard alphabet, padded).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::CryptoError;

/// Encode bytes for a wire field.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a wire field.
pub fn decode_base64(field: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64.decode(field).map_err(|e| CryptoError::Encoding { reason: e.to_string() })
}
