//! Terminal errors of the forwarding engine and their HTTP rendering.

use serde_json::json;
use thiserror::Error;

use crate::http::response::{Response, StatusCode};
use crate::proxy::policy::Rejection;

/// Errors surfaced by [`ProxyOrchestrator::forward`](crate::proxy::ProxyOrchestrator::forward).
///
/// Upstream HTTP error responses are not errors: they are relayed verbatim.
/// Messages carry the target host and attempt count but never header values.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid target url: {0}")]
    InvalidTargetUrl(#[from] Rejection),

    #[error("target unresolved: {0}")]
    TargetUnresolved(String),

    #[error("upstream {host} timed out after {attempts} attempt(s): {cause}")]
    Timeout {
        host: String,
        attempts: u32,
        cause: String,
    },

    #[error("could not reach upstream {host} after {attempts} attempt(s): {cause}")]
    Connection {
        host: String,
        attempts: u32,
        cause: String,
    },

    #[error("upstream {host} answered {status} on all {attempts} attempt(s)")]
    UpstreamExhausted {
        host: String,
        attempts: u32,
        status: u16,
    },

    #[error("proxy error: {0}")]
    Proxy(String),
}

impl ProxyError {
    /// Status code the outer layer answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidTargetUrl(_) => StatusCode::BAD_REQUEST,
            ProxyError::TargetUnresolved(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Connection { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamExhausted { .. } | ProxyError::Proxy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::InvalidTargetUrl(_) => "INVALID_TARGET_URL",
            ProxyError::TargetUnresolved(_) => "TARGET_UNRESOLVED",
            ProxyError::Timeout { .. } => "GATEWAY_TIMEOUT",
            ProxyError::Connection { .. } => "BAD_GATEWAY",
            ProxyError::UpstreamExhausted { .. } => "UPSTREAM_EXHAUSTED",
            ProxyError::Proxy(_) => "PROXY_ERROR",
        }
    }

    /// Number of upstream attempts made before giving up, if any were made.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ProxyError::Timeout { attempts, .. }
            | ProxyError::Connection { attempts, .. }
            | ProxyError::UpstreamExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Renders the error as a JSON response: `{"error": {"code": .., "message": ..}}`.
    pub fn to_response(&self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        Response::json(self.status(), body.to_string())
    }
}
