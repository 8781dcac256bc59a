//! Inbound webhook signature verification.
//!
//! The sender signs the exact request body with HMAC-SHA256 and puts the
//! base64 digest in a header. LINE does this with `x-line-signature`.
//! Reference: https://developers.line.biz/en/reference/messaging-api/#signature-validation

use tracing::warn;

use crate::config::Secret;
use crate::signing::{constant_time_eq, hmac_sha256_base64};

/// Verify an inbound webhook signature.
///
/// # Arguments
///
/// * `raw_body` - The request body exactly as received
/// * `signature` - The value of the signature header
/// * `secret` - The shared inbound secret
///
/// # Returns
///
/// `true` only if `signature` equals `base64(HMAC-SHA256(secret, raw_body))`.
pub fn verify_signature(raw_body: &[u8], signature: &str, secret: &Secret) -> bool {
    if signature.is_empty() {
        warn!("inbound_signature_missing");
        return false;
    }

    let expected = match hmac_sha256_base64(secret.as_bytes(), raw_body) {
        Ok(sig) => sig,
        Err(e) => {
            warn!(error = %e, "inbound_signature_invalid_key");
            return false;
        }
    };

    let valid = constant_time_eq(expected.as_bytes(), signature.as_bytes());

    if !valid {
        warn!(
            expected_length = expected.len(),
            actual_length = signature.len(),
            "inbound_signature_mismatch"
        );
    }

    valid
}
