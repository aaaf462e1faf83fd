//! Maps inbound HTTP requests onto the forwarding engine.
//!
//! - `OPTIONS <any>` answers the CORS preflight locally with 204.
//! - `/proxy?url=<absolute url>` forwards ad-hoc to that URL.
//! - `/proxy/<route>/<sub-path>` forwards through the named route.
//! - Anything else is 404.

use crate::http::request::{Method, Request};
use crate::http::response::Response;
use crate::proxy::builder::ProxyRequest;
use crate::proxy::orchestrator::ProxyOrchestrator;
use crate::proxy::payload::Payload;
use crate::proxy::transport::Transport;

pub const PROXY_PREFIX: &str = "/proxy";
/// Query parameter carrying the ad-hoc target; not forwarded upstream.
pub const TARGET_URL_PARAM: &str = "url";

/// Converts an inbound request into a [`ProxyRequest`], or `None` if the path is not proxied.
pub fn to_proxy_request(req: Request) -> Option<ProxyRequest> {
    let rest = req.path.strip_prefix(PROXY_PREFIX)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let rest = rest.trim_start_matches('/');

    let (route, path, target_url) = if rest.is_empty() {
        (None, String::new(), Some(req.query_param(TARGET_URL_PARAM).unwrap_or_default().to_string()))
    } else {
        let (name, sub_path) = match rest.split_once('/') {
            Some((name, sub_path)) => (name, format!("/{sub_path}")),
            None => (rest, String::new()),
        };
        (Some(name.to_string()), sub_path, None)
    };

    let query = if target_url.is_some() {
        req.query
            .into_iter()
            .filter(|(k, _)| k != TARGET_URL_PARAM)
            .collect()
    } else {
        req.query
    };

    Some(ProxyRequest {
        method: req.method,
        route,
        target_url,
        path,
        query,
        headers: req.headers,
        body: req.body,
    })
}

pub async fn dispatch<T: Transport>(orchestrator: &ProxyOrchestrator<T>, req: Request) -> Response {
    let origin = req.header("Origin").map(str::to_string);

    if req.method == Method::OPTIONS {
        return orchestrator.annotate(Response::no_content(), origin.as_deref());
    }

    let path = req.path.clone();
    let Some(proxy_request) = to_proxy_request(req) else {
        tracing::debug!(path = %path, "No proxy mapping for path");
        return orchestrator.annotate(Response::not_found(), origin.as_deref());
    };

    let response = orchestrator.respond(&proxy_request).await;
    if tracing::enabled!(tracing::Level::DEBUG) {
        tracing::debug!(
            status = response.status.as_u16(),
            body = Payload::from_response(&response).kind(),
            "Relaying response"
        );
    }
    response
}
