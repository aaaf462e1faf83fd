//! Network boundary
//!
//! [`Transport`] performs exactly one HTTP exchange. Retrying, backoff and
//! error classification live in [`crate::proxy::retry`]; this layer only
//! reports whether an exchange failed by timing out or by not connecting.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

use crate::http::headers::HeaderMap;
use crate::http::response::{Response, StatusCode};
use crate::proxy::builder::OutboundRequest;

/// Why a single exchange failed before a response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response within the per-attempt timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection refused or reset, DNS failure, or any other I/O failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be sent at all; retrying will not help.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Invalid(_))
    }
}

/// Executes one outbound exchange with a per-attempt timeout.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: &OutboundRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// [`Transport`] backed by a shared `reqwest` client.
///
/// Redirects are relayed to the caller rather than followed.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| TransportError::Invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest, timeout: Duration) -> Result<Response, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Invalid(e.to_string()))?;

        let mut builder = self
            .client
            .request(method, request.url.clone())
            .timeout(timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let upstream = builder
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = StatusCode::from_u16(upstream.status().as_u16())
            .ok_or_else(|| TransportError::Connect("upstream sent an invalid status".to_string()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in upstream.headers() {
            let value = header_text(name.as_str(), value);
            // Repeated headers are folded into one comma-separated value.
            let folded = match headers.get(name.as_str()) {
                Some(existing) => format!("{existing}, {value}"),
                None => value.to_string(),
            };
            headers.insert(name.as_str(), folded);
        }

        let body: Bytes = upstream.bytes().await.map_err(|e| classify(e, timeout))?;

        Ok(Response { status, headers, body })
    }
}

/// Reads a header value as text. Bytes outside visible ASCII are carried
/// over lossily instead of dropping the header.
fn header_text<'a>(name: &str, value: &'a reqwest::header::HeaderValue) -> Cow<'a, str> {
    match value.to_str() {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            tracing::debug!(header = name, "Upstream header is not ASCII, relaying lossily");
            String::from_utf8_lossy(value.as_bytes())
        }
    }
}

/// Maps a reqwest error onto the retry classification. The URL is stripped
/// so query-string credentials never end up in error messages.
fn classify(error: reqwest::Error, timeout: Duration) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(timeout)
    } else if error.is_builder() {
        TransportError::Invalid(error.without_url().to_string())
    } else {
        TransportError::Connect(error.without_url().to_string())
    }
}
