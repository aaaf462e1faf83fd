//! Cross-origin response annotation
//!
//! Upstream CORS and cookie headers are discarded and replaced by the
//! gateway's own. An allowed origin is always echoed back literally, never as
//! `*`, so credentialed browser requests stay valid.

use crate::http::response::Response;
use crate::proxy::policy::SecurityPolicy;

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS, PATCH";
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, Accept, Origin";
pub const MAX_AGE_SECS: u32 = 86_400;

/// Value sent when the caller's origin is not allowed (or absent).
pub const NULL_ORIGIN: &str = "null";

/// Upstream response headers that never reach the browser.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "set-cookie",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-connection",
    "transfer-encoding",
    "trailer",
    "upgrade",
];

/// The `Access-Control-Allow-Origin` value for `origin` under `policy`.
pub fn allow_origin_value<'a>(origin: Option<&'a str>, policy: &SecurityPolicy) -> &'a str {
    match origin {
        Some(origin) if policy.origin_allowed(origin) => origin,
        _ => NULL_ORIGIN,
    }
}

/// Strips upstream hop-by-hop, cookie and CORS headers, then attaches the gateway's CORS headers.
pub fn annotate(mut response: Response, origin: Option<&str>, policy: &SecurityPolicy) -> Response {
    response.headers.retain(|name, _| {
        let lower = name.to_ascii_lowercase();
        !lower.starts_with("access-control-") && !STRIPPED_RESPONSE_HEADERS.contains(&lower.as_str())
    });

    let headers = &mut response.headers;
    headers.insert("Access-Control-Allow-Origin", allow_origin_value(origin, policy));
    headers.insert("Access-Control-Allow-Methods", ALLOWED_METHODS);
    headers.insert("Access-Control-Allow-Headers", ALLOWED_HEADERS);
    headers.insert("Access-Control-Allow-Credentials", "true");
    headers.insert("Access-Control-Max-Age", MAX_AGE_SECS.to_string());
    headers.insert("Vary", "Origin");

    response
}
