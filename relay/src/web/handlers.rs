//! Webhook endpoint handlers.
//!
//! The webhook handler only:
//! 1. Reads the raw body
//! 2. Verifies the signature
//! 3. Returns 200 OK
//! 4. Hands the envelope to a detached forward task that starts once the
//!    response body has been handed off
//!
//! The downstream call never delays or changes the response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::{Config, ForwardMode};
use crate::forward::{ForwardSettings, Forwarder, ForwardingEnvelope, Metadata, Transport};
use crate::web::ack::AckBody;
use crate::web::signature::verify_signature;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let forwarder = Forwarder::new(ForwardSettings::from(&config), transport);
        Self {
            config: Arc::new(config),
            forwarder: Arc::new(forwarder),
        }
    }
}

// =============================================================================
// Auxiliary Routes
// =============================================================================

pub async fn index() -> &'static str {
    "webhook relay is alive"
}

pub async fn health() -> &'static str {
    "ok"
}

/// `GET /webhook` hint for people poking at the endpoint in a browser.
pub async fn webhook_get() -> &'static str {
    "Use POST /webhook"
}

// =============================================================================
// Webhook
// =============================================================================

/// Inbound webhook endpoint.
///
/// Returns 500 if no inbound secret is configured, 403 if the signature is
/// missing or wrong, and 200 once the forward has been handed off.
pub async fn webhook(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let received_at = Utc::now();

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let status = rejection.status();
            error!(error = %rejection, status_code = status.as_u16(), "webhook_body_read_failed");
            if status == StatusCode::PAYLOAD_TOO_LARGE {
                return (status, "payload too large").into_response();
            }
            return (StatusCode::INTERNAL_SERVER_ERROR, "err").into_response();
        }
    };

    let config = &state.config;
    let signature = headers
        .get(config.signature_header.as_str())
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    info!(
        body_length = body.len(),
        has_signature = !signature.is_empty(),
        "webhook_received"
    );

    let Some(secret) = config.inbound_secret.as_ref() else {
        error!("inbound_secret_not_configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, "missing secret").into_response();
    };

    if !verify_signature(&body, signature, secret) {
        warn!(
            signature_length = signature.len(),
            "webhook_signature_invalid"
        );
        return (StatusCode::FORBIDDEN, "bad signature").into_response();
    }

    let envelope = match config.forward_mode {
        ForwardMode::Raw => ForwardingEnvelope::raw(body, &headers),
        ForwardMode::Enriched => {
            let peer = peer.map(|ConnectInfo(addr)| addr);
            let metadata = Metadata::capture(&headers, peer, &config.signature_header, received_at);
            ForwardingEnvelope::enriched(body, metadata)
        }
    };

    // The forward waits for the ack body to be handed off; its handle is dropped.
    let (body, acked) = AckBody::new(Body::from("ok"));
    drop(state.forwarder.spawn_after(envelope, acked.handed_off()));

    info!(forward_mode = %config.forward_mode, "webhook_accepted");

    (StatusCode::OK, Body::new(body)).into_response()
}
