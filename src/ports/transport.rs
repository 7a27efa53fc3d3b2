//! Transport port - the only seam through which adapters reach the network.
//!
//! Adapters build a [`WireRequest`], hand it to a [`Transport`], and map the
//! status and body they get back. HTTP status codes are NOT errors at this
//! level: a transport fails only for connection-level problems. This keeps
//! status mapping in one place and lets tests script any vendor reply.

use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, Secret};
use std::fmt;
use std::time::Duration;

use crate::domain::provider::ProviderError;

/// Port for sending vendor requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and reads the whole response body.
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, ProviderError>;

    /// Sends a request and returns the SSE `data` payloads as they arrive.
    ///
    /// Non-2xx replies come back as [`WireBody::Complete`] with the error body.
    async fn open_stream(&self, request: WireRequest) -> Result<WireStream, ProviderError>;
}

/// A header value that may carry a credential.
#[derive(Clone)]
pub enum HeaderValue {
    Plain(String),
    Secret(Secret<String>),
}

impl HeaderValue {
    /// Returns the value to put on the wire.
    pub fn expose(&self) -> &str {
        match self {
            HeaderValue::Plain(value) => value,
            HeaderValue::Secret(secret) => secret.expose_secret(),
        }
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Plain(value) => write!(f, "{value:?}"),
            HeaderValue::Secret(_) => write!(f, "[REDACTED]"),
        }
    }
}

/// A vendor request ready to be sent as a JSON POST.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, HeaderValue)>,
    pub body: serde_json::Value,
}

impl WireRequest {
    /// Creates a request with a JSON body and no headers.
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Adds a plain header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), HeaderValue::Plain(value.into())));
        self
    }

    /// Adds a header whose value must never be logged.
    pub fn secret_header(mut self, name: impl Into<String>, value: Secret<String>) -> Self {
        self.headers.push((name.into(), HeaderValue::Secret(value)));
        self
    }

    /// Looks up a header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

/// A fully read vendor reply.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, when present.
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl WireResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Body of a streaming reply.
pub enum WireBody {
    /// The whole body, used when the vendor answered with an error.
    Complete(String),
    /// SSE `data` payloads in arrival order.
    Events(BoxStream<'static, Result<String, ProviderError>>),
}

impl fmt::Debug for WireBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireBody::Complete(body) => f.debug_tuple("Complete").field(body).finish(),
            WireBody::Events(_) => f.write_str("Events(..)"),
        }
    }
}

/// A streaming vendor reply.
#[derive(Debug)]
pub struct WireStream {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: WireBody,
}

impl WireStream {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_headers_are_redacted_in_debug() {
        let request = WireRequest::post("https://api.example.com", serde_json::json!({}))
            .header("content-type", "application/json")
            .secret_header("authorization", Secret::new("Bearer sk-live-123".to_string()));

        let debug = format!("{request:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(
            request.header_value("Authorization").map(HeaderValue::expose),
            Some("Bearer sk-live-123")
        );
    }

    #[test]
    fn success_covers_2xx_only() {
        let ok = WireResponse { status: 204, retry_after: None, body: String::new() };
        let err = WireResponse { status: 429, retry_after: None, body: String::new() };
        assert!(ok.is_success());
        assert!(!err.is_success());
    }
}
