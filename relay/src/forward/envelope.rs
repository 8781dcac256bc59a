//! Forwarding envelope and its canonical serialization.
//!
//! An envelope is built only after the inbound signature checks out. In raw
//! mode it serializes to the inbound bytes unchanged; in enriched mode it
//! serializes to:
//!
//! ```json
//! {"rawBody":"...","debug":{"version":"...","proxyReceivedAt":"...","clientIp":"...","headers":{...}}}
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::http::{header, HeaderMap};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::ForwardError;

/// Version tag carried in enriched metadata.
pub const RELAY_VERSION: &str = concat!("relay-v", env!("CARGO_PKG_VERSION"));

/// Content type used when a raw-mode caller sent none.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type of an enriched envelope.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Inbound headers copied into enriched metadata, besides the signature header.
pub const ALLOWED_HEADERS: [&str; 3] = ["user-agent", "content-type", "x-forwarded-for"];

/// Diagnostic data about the inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub version: String,
    pub proxy_received_at: String,
    pub client_ip: String,
    /// Sorted by name so serialization is stable.
    pub headers: BTreeMap<String, String>,
}

impl Metadata {
    /// Capture metadata from an inbound request.
    ///
    /// Only headers named in [`ALLOWED_HEADERS`] or equal to `signature_header`
    /// are kept; everything else the caller sent is dropped.
    pub fn capture(
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
        signature_header: &str,
        received_at: DateTime<Utc>,
    ) -> Self {
        let picked = ALLOWED_HEADERS
            .iter()
            .copied()
            .chain(std::iter::once(signature_header))
            .filter_map(|name| {
                let value = headers.get(name)?.to_str().ok()?;
                Some((name.to_ascii_lowercase(), value.to_string()))
            })
            .collect();

        Metadata {
            version: RELAY_VERSION.to_string(),
            proxy_received_at: received_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            client_ip: client_ip(headers, peer),
            headers: picked,
        }
    }
}

/// Best-effort client address: first `X-Forwarded-For` hop, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// What gets forwarded for one verified webhook.
#[derive(Debug, Clone)]
pub struct ForwardingEnvelope {
    /// Inbound body exactly as verified
    pub raw_body: Bytes,
    /// Inbound `Content-Type`, used in raw mode
    pub content_type: Option<String>,
    /// Present in enriched mode only
    pub metadata: Option<Metadata>,
}

/// A serialized envelope: the bytes that are signed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPayload {
    pub body: Bytes,
    pub content_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnrichedBody<'a> {
    raw_body: &'a str,
    debug: &'a Metadata,
}

impl ForwardingEnvelope {
    /// Envelope that forwards the inbound body verbatim.
    pub fn raw(raw_body: Bytes, headers: &HeaderMap) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            raw_body,
            content_type,
            metadata: None,
        }
    }

    /// Envelope that wraps the inbound body with metadata.
    pub fn enriched(raw_body: Bytes, metadata: Metadata) -> Self {
        Self {
            raw_body,
            content_type: None,
            metadata: Some(metadata),
        }
    }

    /// Serialize to the exact bytes that are signed and sent downstream.
    pub fn serialize(&self) -> Result<SerializedPayload, ForwardError> {
        let Some(metadata) = &self.metadata else {
            return Ok(SerializedPayload {
                body: self.raw_body.clone(),
                content_type: self
                    .content_type
                    .clone()
                    .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
            });
        };

        let raw_body =
            std::str::from_utf8(&self.raw_body).map_err(|_| ForwardError::NonUtf8Body)?;

        let body = serde_json::to_vec(&EnrichedBody {
            raw_body,
            debug: metadata,
        })
        .map_err(|e| ForwardError::Encode(e.to_string()))?;

        Ok(SerializedPayload {
            body: Bytes::from(body),
            content_type: JSON_CONTENT_TYPE.to_string(),
        })
    }
}
