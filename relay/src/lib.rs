//! Webhook Relay - signature-verifying single-hop webhook forwarder.
//!
//! Accepts a webhook signed with one shared secret, and only if the signature
//! is valid, re-signs the payload with a second secret and forwards it to one
//! downstream endpoint.
//!
//! ## Architecture
//!
//! ```text
//! Sender → POST /webhook → verify(inbound secret) → 200 OK
//!                                   └─ spawn → sign(outbound secret) → POST downstream?ts=&sig=
//! ```
//!
//! The downstream receiver checks
//! `base64(HMAC-SHA256(outbound_secret, body + "|" + ts)) == sig`.

pub mod config;
pub mod forward;
pub mod signing;
pub mod web;

#[cfg(test)]
pub(crate) mod testkit;

// Re-export commonly used types
pub use config::{Config, ForwardMode, Secret};
pub use forward::{Delivery, ForwardError, Forwarder, ForwardingEnvelope, HttpTransport, Transport};
pub use signing::{constant_time_eq, hmac_sha256_base64, sign_forward};
pub use web::{router, verify_signature, AppState};
