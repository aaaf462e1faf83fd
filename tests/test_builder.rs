//! Tests for outbound request construction

use corsway::config::GatewayConfig;
use corsway::http::headers::HeaderMap;
use corsway::http::request::Method;
use corsway::proxy::builder::{self, ProxyRequest};
use corsway::proxy::error::ProxyError;
use corsway::proxy::route::{AuthSpec, RouteTable};

fn routes() -> RouteTable {
    GatewayConfig::from_yaml_str(
        r#"
routes:
  - name: api
    target_base_url: https://api.example.com
    path_rewrite:
      "^v1/": "api/v1/"
      "^api/v1/legacy": "api/v2"
    headers:
      Authorization: Bearer static
      X-Tenant: acme
    auth:
      type: bearer
      token: token123
  - name: keyed
    target_base_url: https://keyed.example.com/root
    auth:
      type: api_key
      header_name: X-Api-Key
      header_value: s3cret
  - name: open
    target_base_url: http://open.example.com:8080
"#,
    )
    .unwrap()
    .route_table()
    .unwrap()
}

#[test]
fn test_rewrites_apply_in_order() {
    let request = ProxyRequest::for_route(Method::GET, "api", "/v1/legacy/items");
    let outbound = builder::build(&request, &routes()).unwrap();
    assert_eq!(outbound.url.as_str(), "https://api.example.com/api/v2/items");
}

#[test]
fn test_auth_overrides_static_and_inbound_authorization() {
    let request = ProxyRequest::for_route(Method::GET, "api", "/v1/me")
        .with_header("Authorization", "Bearer from-browser");
    let outbound = builder::build(&request, &routes()).unwrap();

    assert_eq!(outbound.headers.get("authorization"), Some("Bearer token123"));
    assert_eq!(outbound.headers.get("x-tenant"), Some("acme"));
}

#[test]
fn test_static_headers_override_inbound() {
    let request = ProxyRequest::for_route(Method::GET, "api", "/v1/me").with_header("X-Tenant", "other");
    let outbound = builder::build(&request, &routes()).unwrap();
    assert_eq!(outbound.headers.get("x-tenant"), Some("acme"));
}

#[test]
fn test_api_key_auth_uses_configured_header() {
    let request = ProxyRequest::for_route(Method::GET, "keyed", "/items");
    let outbound = builder::build(&request, &routes()).unwrap();

    assert_eq!(outbound.url.as_str(), "https://keyed.example.com/root/items");
    assert_eq!(outbound.headers.get("x-api-key"), Some("s3cret"));
    assert!(outbound.headers.get("authorization").is_none());
}

#[test]
fn test_query_is_appended_and_port_kept() {
    let request = ProxyRequest::for_route(Method::GET, "open", "/search")
        .with_query("q", "a b")
        .with_query("page", "2");
    let outbound = builder::build(&request, &routes()).unwrap();

    assert_eq!(
        outbound.url.as_str(),
        "http://open.example.com:8080/search?q=a+b&page=2"
    );
}

#[test]
fn test_hop_by_hop_headers_never_leave() {
    let request = ProxyRequest::for_route(Method::POST, "open", "/submit")
        .with_header("Host", "gateway.local")
        .with_header("Connection", "keep-alive")
        .with_header("Content-Length", "2")
        .with_header("X-Forwarded-For", "10.0.0.1")
        .with_header("Content-Type", "application/json")
        .with_body("{}");
    let outbound = builder::build(&request, &routes()).unwrap();

    for dropped in ["host", "connection", "content-length", "x-forwarded-for"] {
        assert!(!outbound.headers.contains(dropped), "{dropped}");
    }
    assert_eq!(outbound.headers.get("content-type"), Some("application/json"));
    assert_eq!(outbound.body, "{}");
}

#[test]
fn test_body_dropped_for_get() {
    let request = ProxyRequest::for_route(Method::GET, "open", "/").with_body("ignored");
    let outbound = builder::build(&request, &routes()).unwrap();
    assert!(outbound.body.is_empty());
}

#[test]
fn test_ad_hoc_target_passes_headers_without_credentials() {
    let request = ProxyRequest::for_url(Method::DELETE, "https://api.example.com/items/1")
        .with_header("Authorization", "Bearer caller")
        .with_body("x");
    let outbound = builder::build(&request, &routes()).unwrap();

    assert_eq!(outbound.url.as_str(), "https://api.example.com/items/1");
    assert_eq!(outbound.headers.get("authorization"), Some("Bearer caller"));
    assert_eq!(outbound.body, "x");
}

#[test]
fn test_route_name_takes_precedence_over_url() {
    let mut request = ProxyRequest::for_route(Method::GET, "open", "/x");
    request.target_url = Some("https://elsewhere.example.com/".to_string());

    let outbound = builder::build(&request, &routes()).unwrap();
    assert_eq!(outbound.url.host_str(), Some("open.example.com"));
}

#[test]
fn test_unresolvable_targets() {
    let routes = routes();

    let unknown = ProxyRequest::for_route(Method::GET, "missing", "/");
    assert!(matches!(
        builder::build(&unknown, &routes),
        Err(ProxyError::TargetUnresolved(_))
    ));

    let mut nothing = ProxyRequest::for_url(Method::GET, "");
    assert!(matches!(
        builder::build(&nothing, &routes),
        Err(ProxyError::InvalidTargetUrl(_))
    ));

    nothing.target_url = None;
    assert!(matches!(
        builder::build(&nothing, &routes),
        Err(ProxyError::TargetUnresolved(_))
    ));
}

#[test]
fn test_basic_auth_header() {
    let mut headers = HeaderMap::new();
    builder::apply_auth(
        &mut headers,
        &AuthSpec::Basic {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        },
    );
    // base64("svc:hunter2")
    assert_eq!(headers.get("Authorization"), Some("Basic c3ZjOmh1bnRlcjI="));
}

#[test]
fn test_auth_is_redacted_in_debug_output() {
    let auth = AuthSpec::Bearer {
        token: "token123".to_string(),
    };
    assert!(!format!("{auth:?}").contains("token123"));
}
