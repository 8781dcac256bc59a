//! Web server module for the inbound side of the relay.
//!
//! This module provides a thin web server that:
//! - Receives webhooks on `POST /webhook`
//! - Verifies the HMAC signature over the raw body
//! - Acknowledges immediately and forwards in the background
//!
//! Routes:
//! - `GET /` liveness text
//! - `GET /healthz` health check
//! - `GET /webhook` usage hint
//! - `POST /webhook` the relay itself

pub mod ack;
pub mod handlers;
pub mod signature;

use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

pub use handlers::{health, index, webhook, webhook_get, AppState};
pub use signature::verify_signature;

/// Build the relay router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health))
        .route("/webhook", get(webhook_get).post(webhook))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
