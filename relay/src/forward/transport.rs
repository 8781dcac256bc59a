//! Outbound HTTP transport.
//!
//! The forwarder talks to the downstream receiver through [`Transport`] so the
//! request path can be exercised without a network.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use thiserror::Error;
use url::Url;

/// Largest downstream response preview kept for diagnostics, in bytes.
pub const PREVIEW_LIMIT: usize = 200;

/// One signed POST to the downstream receiver.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Destination including the `ts` and `sig` query parameters
    pub url: Url,
    pub content_type: String,
    pub body: Bytes,
}

/// What came back from the downstream receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// At most [`PREVIEW_LIMIT`] bytes of the response body
    pub preview: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport used in production.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a transport with the relay's default client settings.
    pub fn from_defaults() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(concat!("webhook-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let mut response = self
            .client
            .post(request.url)
            .header(header::CONTENT_TYPE, request.content_type)
            .body(request.body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();

        // Read only as much of the body as the preview needs.
        let mut buf = Vec::with_capacity(PREVIEW_LIMIT);
        while buf.len() < PREVIEW_LIMIT {
            match response.chunk().await {
                Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(
                        error = %e.without_url(),
                        status_code = status,
                        "forward_response_read_error"
                    );
                    break;
                }
            }
        }

        Ok(TransportResponse {
            status,
            preview: truncate_preview(&buf, PREVIEW_LIMIT),
        })
    }
}

/// The request URL carries the outbound signature, so it never reaches an error.
fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.without_url().to_string())
    }
}

/// Lossily decode at most `limit` bytes, never splitting a character.
pub fn truncate_preview(bytes: &[u8], limit: usize) -> String {
    let mut cut = &bytes[..bytes.len().min(limit)];
    if bytes.len() >= limit {
        cut = &cut[..complete_prefix_len(cut)];
    }
    String::from_utf8_lossy(cut).into_owned()
}

/// Length of `bytes` without a trailing, incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}
