//! Tests for CORS annotation of relayed responses

use corsway::http::response::{Response, ResponseBuilder, StatusCode};
use corsway::proxy::cors::{self, NULL_ORIGIN};
use corsway::proxy::policy::SecurityPolicy;

fn policy(origins: &[&str]) -> SecurityPolicy {
    SecurityPolicy::new(origins.iter().copied(), Vec::<String>::new(), Vec::<String>::new())
}

#[test]
fn test_allowed_origin_is_reflected() {
    let policy = policy(&["https://app.example.com", "https://admin.example.com"]);

    let response = cors::annotate(Response::ok("x"), Some("https://admin.example.com"), &policy);

    assert_eq!(
        response.header("Access-Control-Allow-Origin"),
        Some("https://admin.example.com")
    );
    assert_eq!(response.header("Vary"), Some("Origin"));
}

#[test]
fn test_disallowed_origin_gets_null() {
    let response = cors::annotate(
        Response::ok("x"),
        Some("https://evil.example.com"),
        &policy(&["https://app.example.com"]),
    );
    assert_eq!(response.header("Access-Control-Allow-Origin"), Some(NULL_ORIGIN));
}

#[test]
fn test_wildcard_reflects_the_literal_origin() {
    let response = cors::annotate(Response::ok("x"), Some("https://any.example.org"), &policy(&["*"]));
    assert_eq!(
        response.header("Access-Control-Allow-Origin"),
        Some("https://any.example.org")
    );
}

#[test]
fn test_status_and_body_are_untouched() {
    let upstream = ResponseBuilder::new(StatusCode::NOT_FOUND)
        .header("Content-Type", "text/plain")
        .body("missing")
        .build();

    let response = cors::annotate(upstream, None, &policy(&[]));

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body, "missing");
    assert_eq!(response.header("Access-Control-Allow-Credentials"), Some("true"));
}

#[test]
fn test_allow_origin_value() {
    let policy = policy(&["https://app.example.com"]);
    assert_eq!(
        cors::allow_origin_value(Some("https://app.example.com"), &policy),
        "https://app.example.com"
    );
    assert_eq!(cors::allow_origin_value(None, &policy), "null");
}
