//! Base64 is the canonical wire codec for all cryptographic material: keys,
//! signatures, and deploy payloads all travel as STANDARD-alphabet text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode bytes as Base64 text.
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode Base64 text back to bytes.
pub fn decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}
