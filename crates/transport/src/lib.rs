//! HTTP transport abstraction for the portal session client
//!
//! Defines the `Transport` trait that decouples session logic (login, refresh,
//! authenticated requests) from the HTTP client. `HttpTransport` is the
//! reqwest-backed implementation; tests substitute scripted transports that
//! count calls and replay canned responses.

pub mod http;
#[cfg(feature = "test-util")]
pub mod testing;

pub use http::HttpTransport;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::future::Future;
use std::pin::Pin;

/// Errors where no HTTP response was obtained at all.
///
/// A non-success status is NOT a transport error: it comes back as an
/// `HttpResponse` and the caller decides what it means.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Outbound request. `url` may be absolute or relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, url).json(body)
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and body text of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over the HTTP client.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`), so the session crate can hold any implementation
/// behind one pointer type.
pub trait Transport: Send + Sync {
    /// Execute one request. Resolves to `Err` only when no response arrived.
    fn send(&self, request: HttpRequest)
    -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>>;
}
