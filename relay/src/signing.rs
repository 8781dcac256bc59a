//! HMAC-SHA256 signing shared by the inbound check and the outbound re-sign.
//!
//! Both directions use the same scheme: HMAC-SHA256 over a byte message, with
//! the raw digest encoded as standard (padded) base64.
//!
//! The outbound message is the serialized payload, a literal `|`, and the
//! decimal timestamp:
//!
//! ```text
//! payload-bytes | "|" | "1718000000"
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Separator between the payload and the timestamp in the outbound message.
pub const TIMESTAMP_SEPARATOR: u8 = b'|';

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("HMAC key rejected: {0}")]
    InvalidKey(String),
}

/// Compute `base64(HMAC-SHA256(secret, message))`.
pub fn hmac_sha256_base64(secret: &[u8], message: &[u8]) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// Constant-time comparison of two byte strings.
///
/// Lengths are checked first; equal-length inputs are compared in full no matter
/// where they first differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Build the exact byte string the outbound signature covers.
pub fn forward_signing_input(payload: &[u8], timestamp: u64) -> Vec<u8> {
    let ts = timestamp.to_string();
    let mut message = Vec::with_capacity(payload.len() + 1 + ts.len());
    message.extend_from_slice(payload);
    message.push(TIMESTAMP_SEPARATOR);
    message.extend_from_slice(ts.as_bytes());
    message
}

/// Sign a serialized forward payload for the downstream receiver.
pub fn sign_forward(secret: &[u8], payload: &[u8], timestamp: u64) -> Result<String, SigningError> {
    hmac_sha256_base64(secret, &forward_signing_input(payload, timestamp))
}
