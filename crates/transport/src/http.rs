//! reqwest-backed transport
//!
//! Relative URLs ("/api/things") are joined onto the configured base URL;
//! absolute http(s) URLs pass through untouched. Every request carries the
//! configured timeout so a hung server surfaces as a transport error instead
//! of stalling the session.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::{HttpRequest, HttpResponse, Result, Transport, TransportError};

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Resolve `url` against the base URL and validate the result.
    pub fn resolve(&self, url: &str) -> Result<reqwest::Url> {
        let joined = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        };
        reqwest::Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let url = self.resolve(&request.url)?;
            let method = request.method.clone();

            let mut builder = self
                .client
                .request(request.method, url.clone())
                .headers(request.headers)
                .timeout(self.timeout);
            if let Some(body) = request.body {
                builder = builder.json(&body);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Request(format!("{method} {url}: {e}")))?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Request(format!("reading body of {method} {url}: {e}")))?;

            debug!(%method, %url, status, "http exchange completed");
            Ok(HttpResponse { status, body })
        })
    }
}
