//! Signs envelopes and posts them downstream under a timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::envelope::ForwardingEnvelope;
use super::transport::{OutboundRequest, Transport, TransportError, TransportResponse};
use super::ForwardError;
use crate::config::{Config, Secret};
use crate::signing::{forward_signing_input, hmac_sha256_base64, TIMESTAMP_SEPARATOR};

/// Characters of the inbound body shown in debug logs.
const SIGNING_INPUT_PREVIEW: usize = 160;

/// Outbound side of the configuration.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    pub destination: Option<Url>,
    pub secret: Option<Secret>,
    pub timeout: Duration,
}

impl From<&Config> for ForwardSettings {
    fn from(config: &Config) -> Self {
        Self {
            destination: config.forward_url.clone(),
            secret: config.outbound_secret.clone(),
            timeout: config.forward_timeout,
        }
    }
}

/// A downstream response that arrived within the timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub status: u16,
    pub preview: String,
}

impl Delivery {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<TransportResponse> for Delivery {
    fn from(resp: TransportResponse) -> Self {
        Self {
            status: resp.status,
            preview: resp.preview,
        }
    }
}

/// Forwards verified webhooks to the downstream receiver.
#[derive(Clone)]
pub struct Forwarder {
    settings: ForwardSettings,
    transport: Arc<dyn Transport>,
}

impl Forwarder {
    pub fn new(settings: ForwardSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Forward an envelope, signing it with the current time.
    pub async fn forward(&self, envelope: &ForwardingEnvelope) -> Result<Delivery, ForwardError> {
        self.forward_at(envelope, unix_now()).await
    }

    /// Forward an envelope, signing it with `timestamp`.
    ///
    /// Makes at most one call to the transport; configuration is checked first.
    pub async fn forward_at(
        &self,
        envelope: &ForwardingEnvelope,
        timestamp: u64,
    ) -> Result<Delivery, ForwardError> {
        let request = self.prepare(envelope, timestamp)?;
        let timeout = self.settings.timeout;

        debug!(
            destination_host = request.url.host_str().unwrap_or_default(),
            timestamp = timestamp,
            body_length = request.body.len(),
            "forward_starting"
        );

        // Dropping the transport future on expiry aborts the connection.
        match tokio::time::timeout(timeout, self.transport.post(request)).await {
            Ok(Ok(resp)) => Ok(resp.into()),
            Ok(Err(TransportError::Timeout)) | Err(_) => Err(ForwardError::Timeout(timeout)),
            Ok(Err(TransportError::Request(e))) => Err(ForwardError::Transport(e)),
        }
    }

    /// Serialize, sign and address the outbound request.
    pub fn prepare(
        &self,
        envelope: &ForwardingEnvelope,
        timestamp: u64,
    ) -> Result<OutboundRequest, ForwardError> {
        let destination = self
            .settings
            .destination
            .as_ref()
            .ok_or(ForwardError::MissingDestination)?;
        let secret = self
            .settings
            .secret
            .as_ref()
            .ok_or(ForwardError::MissingSecret)?;

        let payload = envelope.serialize()?;

        let signing_input = forward_signing_input(&payload.body, timestamp);
        let signature = hmac_sha256_base64(secret.as_bytes(), &signing_input)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(
                signing_input_preview = %signing_input_preview(envelope, timestamp),
                signing_input_length = signing_input.len(),
                "forward_signing_input"
            );
        }

        let mut url = destination.clone();
        url.query_pairs_mut()
            .append_pair("ts", &timestamp.to_string())
            .append_pair("sig", &signature);

        Ok(OutboundRequest {
            url,
            content_type: payload.content_type,
            body: payload.body,
        })
    }

    /// Run [`Forwarder::forward`] as a detached task once `gate` resolves.
    ///
    /// The outcome is only logged. Callers are free to drop the handle.
    pub fn spawn_after<G>(self: &Arc<Self>, envelope: ForwardingEnvelope, gate: G) -> JoinHandle<()>
    where
        G: Future<Output = ()> + Send + 'static,
    {
        let forwarder = Arc::clone(self);
        tokio::spawn(async move {
            gate.await;
            let outcome = forwarder.forward(&envelope).await;
            log_outcome(&outcome);
        })
    }
}

/// Diagnostic view of the signed input: inbound body prefix and timestamp.
///
/// Metadata is left out since it carries the inbound signature header.
fn signing_input_preview(envelope: &ForwardingEnvelope, timestamp: u64) -> String {
    let mut preview: String = String::from_utf8_lossy(&envelope.raw_body)
        .chars()
        .take(SIGNING_INPUT_PREVIEW)
        .collect();
    preview.push(char::from(TIMESTAMP_SEPARATOR));
    preview.push_str(&timestamp.to_string());
    preview
}

fn log_outcome(outcome: &Result<Delivery, ForwardError>) {
    match outcome {
        Ok(delivery) if delivery.is_success() => {
            info!(
                status_code = delivery.status,
                body_preview = %delivery.preview,
                "forward_complete"
            );
        }
        Ok(delivery) => {
            warn!(
                status_code = delivery.status,
                body_preview = %delivery.preview,
                "forward_rejected"
            );
        }
        Err(e) if e.is_config() => {
            error!(error = %e, "forward_not_configured");
        }
        Err(e) => {
            error!(error = %e, "forward_failed");
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::Metadata;
    use crate::signing::sign_forward;
    use crate::testkit::{HangingTransport, RecordingTransport};
    use axum::http::HeaderMap;
    use bytes::Bytes;
    use std::time::Instant;

    fn settings(timeout: Duration) -> ForwardSettings {
        ForwardSettings {
            destination: Some(Url::parse("https://script.example.com/macros/exec").unwrap()),
            secret: Secret::new("outbound"),
            timeout,
        }
    }

    fn raw_envelope(body: &'static [u8]) -> ForwardingEnvelope {
        ForwardingEnvelope::raw(Bytes::from_static(body), &HeaderMap::new())
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_prepare_signs_exact_body() {
        let forwarder = Forwarder::new(settings(Duration::from_secs(1)), RecordingTransport::new());
        let request = forwarder.prepare(&raw_envelope(br#"{"x":1}"#), 1_718_000_000).unwrap();

        assert_eq!(&request.body[..], br#"{"x":1}"#);
        assert_eq!(query(&request.url, "ts").as_deref(), Some("1718000000"));

        let expected = sign_forward(b"outbound", &request.body, 1_718_000_000).unwrap();
        assert_eq!(query(&request.url, "sig"), Some(expected));
        assert_eq!(request.url.path(), "/macros/exec");
    }

    #[test]
    fn test_prepare_is_reproducible() {
        let forwarder = Forwarder::new(settings(Duration::from_secs(1)), RecordingTransport::new());
        let envelope = raw_envelope(b"payload");

        let a = forwarder.prepare(&envelope, 42).unwrap();
        let b = forwarder.prepare(&envelope, 42).unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(a.body, b.body);

        let c = forwarder.prepare(&envelope, 43).unwrap();
        assert_ne!(query(&a.url, "sig"), query(&c.url, "sig"));
    }

    #[test]
    fn test_prepare_keeps_existing_query() {
        let mut s = settings(Duration::from_secs(1));
        s.destination = Some(Url::parse("https://example.com/exec?deployment=7").unwrap());
        let forwarder = Forwarder::new(s, RecordingTransport::new());

        let request = forwarder.prepare(&raw_envelope(b"x"), 1).unwrap();
        assert_eq!(query(&request.url, "deployment").as_deref(), Some("7"));
        assert!(query(&request.url, "sig").is_some());
    }

    #[tokio::test]
    async fn test_forward_missing_destination_makes_no_call() {
        let transport = RecordingTransport::new();
        let mut s = settings(Duration::from_secs(1));
        s.destination = None;
        let forwarder = Forwarder::new(s, transport.clone());

        let result = forwarder.forward(&raw_envelope(b"x")).await;
        assert!(matches!(result, Err(ForwardError::MissingDestination)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_forward_missing_secret_makes_no_call() {
        let transport = RecordingTransport::new();
        let mut s = settings(Duration::from_secs(1));
        s.secret = None;
        let forwarder = Forwarder::new(s, transport.clone());

        let result = forwarder.forward(&raw_envelope(b"x")).await;
        assert!(matches!(result, Err(ForwardError::MissingSecret)));
        assert!(result.unwrap_err().is_config());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_forward_delivers_once() {
        let transport = RecordingTransport::with_response(201, "created");
        let forwarder = Forwarder::new(settings(Duration::from_secs(1)), transport.clone());

        let delivery = forwarder.forward_at(&raw_envelope(b"body"), 7).await.unwrap();
        assert_eq!(delivery.status, 201);
        assert_eq!(delivery.preview, "created");
        assert!(delivery.is_success());

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0].body[..], b"body");
        assert_eq!(calls[0].content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_forward_non_2xx_is_a_delivery() {
        let transport = RecordingTransport::with_response(401, "bad sig");
        let forwarder = Forwarder::new(settings(Duration::from_secs(1)), transport);

        let delivery = forwarder.forward(&raw_envelope(b"body")).await.unwrap();
        assert_eq!(delivery.status, 401);
        assert!(!delivery.is_success());
    }

    #[tokio::test]
    async fn test_forward_transport_error() {
        let transport = RecordingTransport::failing("connection refused");
        let forwarder = Forwarder::new(settings(Duration::from_secs(1)), transport.clone());

        let result = forwarder.forward(&raw_envelope(b"body")).await;
        match result {
            Err(ForwardError::Transport(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_forward_times_out_and_releases_request() {
        let transport = HangingTransport::new();
        let timeout = Duration::from_millis(100);
        let forwarder = Forwarder::new(settings(timeout), transport.clone());

        let started = Instant::now();
        let result = forwarder.forward(&raw_envelope(b"body")).await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(ForwardError::Timeout(t)) if t == timeout));
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_secs(2), "took {elapsed:?}");

        assert_eq!(transport.started(), 1);
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_spawn_runs_detached() {
        let transport = RecordingTransport::new();
        let forwarder = Arc::new(Forwarder::new(settings(Duration::from_secs(1)), transport.clone()));

        let (open, gate) = tokio::sync::oneshot::channel::<()>();
        let handle = forwarder.spawn_after(raw_envelope(b"detached"), async move {
            let _ = gate.await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.call_count(), 0);

        open.send(()).unwrap();
        handle.await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(&calls[0].body[..], b"detached");
    }

    #[test]
    fn test_signing_input_preview_omits_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("x-line-signature", "SECRETSIGVALUE".parse().unwrap());
        let metadata = Metadata::capture(&headers, None, "x-line-signature", chrono::Utc::now());
        let envelope = ForwardingEnvelope::enriched(Bytes::from_static(b"{}"), metadata);

        // The signed bytes do carry the header value; the preview must not.
        let request = Forwarder::new(settings(Duration::from_secs(1)), RecordingTransport::new())
            .prepare(&envelope, 99)
            .unwrap();
        assert!(String::from_utf8_lossy(&request.body).contains("SECRETSIGVALUE"));

        let preview = signing_input_preview(&envelope, 99);
        assert_eq!(preview, "{}|99");
    }

    #[test]
    fn test_signing_input_preview_is_bounded() {
        let envelope = ForwardingEnvelope::raw(Bytes::from(vec![b'a'; 1000]), &HeaderMap::new());
        let preview = signing_input_preview(&envelope, 1);
        assert_eq!(preview.len(), SIGNING_INPUT_PREVIEW + 2);
    }
}
