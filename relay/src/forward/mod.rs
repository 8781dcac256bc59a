//! Re-signing and forwarding of verified webhooks.
//!
//! ```text
//! verified body → ForwardingEnvelope → serialize once → sign(payload|ts) → POST ?ts=&sig=
//! ```

pub mod envelope;
pub mod forwarder;
pub mod transport;

use std::time::Duration;

use thiserror::Error;

pub use envelope::{ForwardingEnvelope, Metadata, SerializedPayload, ALLOWED_HEADERS};
pub use forwarder::{Delivery, ForwardSettings, Forwarder};
pub use transport::{HttpTransport, OutboundRequest, Transport, TransportError, TransportResponse};

/// Why a verified webhook did not reach the downstream receiver.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("forward destination is not configured")]
    MissingDestination,

    #[error("outbound secret is not configured")]
    MissingSecret,

    #[error("inbound body is not valid UTF-8 and cannot be enriched")]
    NonUtf8Body,

    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("failed to sign payload: {0}")]
    Signing(#[from] crate::signing::SigningError),

    #[error("downstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("downstream request failed: {0}")]
    Transport(String),
}

impl ForwardError {
    /// Configuration problems, as opposed to failures of the call itself.
    pub fn is_config(&self) -> bool {
        matches!(self, ForwardError::MissingDestination | ForwardError::MissingSecret)
    }
}
