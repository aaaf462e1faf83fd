//! Outbound request construction
//!
//! Turns a [`ProxyRequest`] into the [`OutboundRequest`] that goes on the
//! wire: target resolution, path rewriting, header filtering and
//! credential injection. Nothing here touches the network.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use url::Url;

use crate::http::headers::HeaderMap;
use crate::http::request::Method;
use crate::proxy::error::ProxyError;
use crate::proxy::policy::Rejection;
use crate::proxy::route::{AuthSpec, Route, RouteTable};

/// Inbound headers that never reach the upstream.
const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "forwarded",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "transfer-encoding",
    "content-length",
    "te",
    "trailer",
    "upgrade",
];

/// A normalized request handed to the forwarding engine by the outer router.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Name of the matched route, when the router matched one.
    pub route: Option<String>,
    /// Caller-supplied absolute URL for ad-hoc forwarding.
    pub target_url: Option<String>,
    /// Sub-path captured after the route prefix.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn for_route(method: Method, route: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            route: Some(route.into()),
            target_url: None,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn for_url(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            route: None,
            target_url: Some(url.into()),
            path: String::new(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Browser `Origin` of the caller; absent for same-origin or non-browser callers.
    pub fn origin(&self) -> Option<&str> {
        self.headers.get("origin")
    }
}

/// Where a request is going.
#[derive(Debug, Clone)]
pub enum ResolvedTarget {
    /// Through a configured route; route headers and auth apply.
    Route(Arc<Route>),
    /// Ad-hoc passthrough to a caller-supplied URL; no route headers or auth.
    Direct(Url),
}

impl ResolvedTarget {
    pub fn route_name(&self) -> Option<&str> {
        match self {
            ResolvedTarget::Route(route) => Some(&route.name),
            ResolvedTarget::Direct(_) => None,
        }
    }

    /// URL checked against the domain policy.
    pub fn policy_url(&self) -> &Url {
        match self {
            ResolvedTarget::Route(route) => &route.target_base_url,
            ResolvedTarget::Direct(url) => url,
        }
    }

    pub fn host(&self) -> &str {
        self.policy_url().host_str().unwrap_or_default()
    }
}

/// The message sent upstream. Built once per `forward` call and reused unchanged for every attempt.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Resolves the destination of `request`.
///
/// A named route wins over an explicit URL. An unknown route name, or no
/// route and no URL, is [`ProxyError::TargetUnresolved`]; a URL that does not
/// parse is [`ProxyError::InvalidTargetUrl`].
pub fn resolve_target(request: &ProxyRequest, routes: &RouteTable) -> Result<ResolvedTarget, ProxyError> {
    if let Some(name) = request.route.as_deref() {
        return routes
            .get(name)
            .map(ResolvedTarget::Route)
            .ok_or_else(|| ProxyError::TargetUnresolved(format!("no route named '{name}'")));
    }

    match request.target_url.as_deref().map(str::trim) {
        Some("") => Err(Rejection::Missing.into()),
        Some(raw) => Url::parse(raw)
            .map(ResolvedTarget::Direct)
            .map_err(|e| Rejection::Unparseable(e.to_string()).into()),
        None => Err(ProxyError::TargetUnresolved(
            "request names neither a route nor a target url".to_string(),
        )),
    }
}

/// Builds the outbound request for an already resolved target.
pub fn build_outbound(request: &ProxyRequest, target: &ResolvedTarget) -> Result<OutboundRequest, ProxyError> {
    let mut url = match target {
        ResolvedTarget::Route(route) => route_url(route, &request.path)?,
        ResolvedTarget::Direct(url) => url.clone(),
    };

    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }

    let mut headers = filter_request_headers(&request.headers);

    if let ResolvedTarget::Route(route) = target {
        headers.merge(&route.static_headers);
        if let Some(auth) = &route.auth {
            apply_auth(&mut headers, auth);
        }
    }

    let body = if request.method.carries_body() {
        request.body.clone()
    } else {
        Bytes::new()
    };

    Ok(OutboundRequest {
        method: request.method,
        url,
        headers,
        body,
    })
}

/// Resolves and builds in one step.
pub fn build(request: &ProxyRequest, routes: &RouteTable) -> Result<OutboundRequest, ProxyError> {
    let target = resolve_target(request, routes)?;
    build_outbound(request, &target)
}

fn route_url(route: &Route, sub_path: &str) -> Result<Url, ProxyError> {
    let rewritten = route.rewrite_path(sub_path.trim_start_matches('/'));
    let rewritten = rewritten.trim_start_matches('/');

    let mut url = route.target_base_url.clone();
    let base_path = url.path().trim_end_matches('/').to_string();
    let path = if rewritten.is_empty() {
        if base_path.is_empty() { "/".to_string() } else { base_path }
    } else {
        format!("{base_path}/{rewritten}")
    };

    if url.cannot_be_a_base() {
        return Err(ProxyError::Proxy(format!(
            "route '{}' target cannot carry a path",
            route.name
        )));
    }
    url.set_path(&path);
    Ok(url)
}

/// Drops hop-by-hop and proxy-sensitive headers; everything else passes through.
pub fn filter_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.retain(|name, _| {
        !STRIPPED_REQUEST_HEADERS
            .iter()
            .any(|stripped| name.eq_ignore_ascii_case(stripped))
    });
    headers
}

/// Writes the credential header for `auth`, overriding any header of the same name.
pub fn apply_auth(headers: &mut HeaderMap, auth: &AuthSpec) {
    match auth {
        AuthSpec::Bearer { token } => {
            headers.insert("Authorization", format!("Bearer {token}"));
        }
        AuthSpec::Basic { username, password } => {
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            headers.insert("Authorization", format!("Basic {encoded}"));
        }
        AuthSpec::ApiKey { header_name, header_value } => {
            headers.insert(header_name.as_str(), header_value.as_str());
        }
    }
}
