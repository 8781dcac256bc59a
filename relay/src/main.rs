//! Webhook Relay server.
//!
//! Verifies inbound webhooks, acknowledges them immediately, and forwards
//! re-signed payloads to the configured downstream endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::{router, AppState, Config, HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        inbound_secret_configured = config.inbound_secret.is_some(),
        outbound_secret_configured = config.outbound_secret.is_some(),
        forward_host = config.forward_url.as_ref().and_then(|u| u.host_str()).unwrap_or_default(),
        forward_timeout_ms = config.forward_timeout.as_millis() as u64,
        forward_mode = %config.forward_mode,
        signature_header = %config.signature_header,
        "config_loaded"
    );

    if config.inbound_secret.is_none() {
        warn!("inbound_secret_missing_all_webhooks_will_fail");
    }
    if config.forward_url.is_none() || config.outbound_secret.is_none() {
        warn!("forwarding_not_configured_webhooks_will_not_be_forwarded");
    }

    let transport = HttpTransport::from_defaults().context("Failed to build HTTP client")?;

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState::new(config, Arc::new(transport));
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    // Run server with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
