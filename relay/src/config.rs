//! Configuration module for environment variable parsing.
//!
//! Everything is resolved once at startup into an immutable [`Config`] that is
//! handed to the verifier and the forwarder. Nothing in the request path reads
//! the process environment.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use url::Url;

/// Header LINE uses for its webhook signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-line-signature";

/// A shared HMAC secret.
///
/// Cannot be constructed from an empty string, so holding a `Secret` means the
/// key is configured. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret, returning `None` if it is empty.
    ///
    /// Whitespace is part of the key and is kept as given.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// What gets sent downstream after a webhook is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// The inbound body, byte for byte, with the caller's content type.
    Raw,
    /// A JSON envelope wrapping the inbound body with receipt metadata.
    Enriched,
}

impl FromStr for ForwardMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(ForwardMode::Raw),
            "enriched" => Ok(ForwardMode::Enriched),
            other => Err(format!("unknown forward mode: {other}")),
        }
    }
}

impl fmt::Display for ForwardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardMode::Raw => f.write_str("raw"),
            ForwardMode::Enriched => f.write_str("enriched"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Secret the webhook sender signs request bodies with
    pub inbound_secret: Option<Secret>,

    /// Secret used to re-sign payloads for the downstream receiver
    pub outbound_secret: Option<Secret>,

    /// Downstream endpoint verified webhooks are forwarded to
    pub forward_url: Option<Url>,

    /// Upper bound on the whole downstream call
    pub forward_timeout: Duration,

    /// Raw or enriched forwarding
    pub forward_mode: ForwardMode,

    /// Lower-cased name of the inbound signature header
    pub signature_header: String,

    /// Largest inbound body accepted before verification
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            port: parse_or("PORT", &lookup, 8080),

            inbound_secret: lookup("INBOUND_SECRET").and_then(Secret::new),

            outbound_secret: lookup("OUTBOUND_SECRET").and_then(Secret::new),

            forward_url: lookup("FORWARD_URL").and_then(|raw| parse_forward_url(&raw)),

            forward_timeout: Duration::from_millis(parse_or("FORWARD_TIMEOUT_MS", &lookup, 8000)),

            forward_mode: parse_or("FORWARD_MODE", &lookup, ForwardMode::Enriched),

            signature_header: lookup("SIGNATURE_HEADER")
                .map(|v| v.trim().to_ascii_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string()),

            max_body_bytes: parse_or("MAX_BODY_BYTES", &lookup, 1024 * 1024),
        }
    }
}

/// Parse a variable, warning and falling back to `default` when it is malformed.
fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = match lookup(name) {
        Some(v) if !v.trim().is_empty() => v,
        _ => return default,
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "invalid_config_value_using_default");
            default
        }
    }
}

/// Only absolute http(s) URLs are usable as a forward destination.
fn parse_forward_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url),
        Ok(url) => {
            warn!(scheme = url.scheme(), "forward_url_unsupported_scheme");
            None
        }
        Err(e) => {
            warn!(error = %e, "forward_url_invalid");
            None
        }
    }
}
