use corsway::http::headers::HeaderMap;
use corsway::http::response::{Response, ResponseBuilder, StatusCode};
use corsway::http::writer::{ResponseWriter, serialize_response};

#[test]
fn test_status_code_constants() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::NO_CONTENT.as_u16(), 204);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    assert_eq!(StatusCode::PAYLOAD_TOO_LARGE.reason_phrase(), "Payload Too Large");
    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR.as_u16(), 500);
    assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
    assert_eq!(StatusCode::GATEWAY_TIMEOUT.as_u16(), 504);
}

#[test]
fn test_arbitrary_upstream_codes_are_representable() {
    let teapot = StatusCode::from_u16(418).unwrap();
    assert_eq!(teapot.as_u16(), 418);
    assert_eq!(teapot.reason_phrase(), "");
    assert!(teapot.is_client_error());

    assert!(StatusCode::from_u16(99).is_none());
    assert!(StatusCode::from_u16(1000).is_none());
}

#[test]
fn test_status_classes() {
    assert!(StatusCode::OK.is_success());
    assert!(StatusCode::NOT_FOUND.is_client_error());
    assert!(StatusCode::BAD_GATEWAY.is_server_error());
    assert!(!StatusCode::TOO_MANY_REQUESTS.is_server_error());
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(StatusCode::NO_CONTENT.reason_phrase(), "No Content");
    assert_eq!(StatusCode::BAD_REQUEST.reason_phrase(), "Bad Request");
    assert_eq!(StatusCode::GATEWAY_TIMEOUT.reason_phrase(), "Gateway Timeout");
    assert_eq!(
        StatusCode::from_u16(503).unwrap().reason_phrase(),
        "Service Unavailable"
    );
}

#[test]
fn test_response_builder_adds_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body("Hello")
        .build();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-length"), Some("5"));
    assert_eq!(response.headers.len(), 2);
    assert_eq!(response.body, "Hello");
}

#[test]
fn test_response_builder_keeps_explicit_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Length", "42")
        .build();

    assert_eq!(response.header("Content-Length"), Some("42"));
    assert_eq!(response.headers.len(), 1);
}

#[test]
fn test_response_builder_with_header_map() {
    let headers: HeaderMap = [("X-One", "1"), ("X-Two", "2")].into_iter().collect();
    let response = ResponseBuilder::new(StatusCode::NO_CONTENT).headers(headers).build();

    assert_eq!(response.header("x-one"), Some("1"));
    assert_eq!(response.header("x-two"), Some("2"));
}

#[test]
fn test_convenience_constructors() {
    let ok = Response::ok("body");
    assert_eq!(ok.status, StatusCode::OK);

    let not_found = Response::not_found();
    assert_eq!(not_found.status, StatusCode::NOT_FOUND);
    assert_eq!(not_found.body, "404 Not Found");

    let json = Response::json(StatusCode::BAD_GATEWAY, r#"{"error":{}}"#);
    assert_eq!(json.header("Content-Type"), Some("application/json"));

    let preflight = Response::no_content();
    assert_eq!(preflight.header("Content-Length"), Some("0"));
    assert!(preflight.body.is_empty());
}

#[test]
fn test_serialize_response_wire_format() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body("hi")
        .build();

    let wire = String::from_utf8(serialize_response(&response)).unwrap();

    assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(wire.contains("Content-Type: text/plain\r\n"));
    assert!(wire.contains("Content-Length: 2\r\n"));
    assert!(wire.ends_with("\r\n\r\nhi"));
}

#[test]
fn test_serialize_unknown_status_has_empty_reason() {
    let response = ResponseBuilder::new(StatusCode::from_u16(418).unwrap()).build();
    let wire = String::from_utf8(serialize_response(&response)).unwrap();
    assert!(wire.starts_with("HTTP/1.1 418 \r\n"));
}

#[tokio::test]
async fn test_writer_drains_whole_response() {
    let response = Response::ok("payload");
    let mut writer = ResponseWriter::new(&response);
    assert_eq!(writer.remaining(), serialize_response(&response).len());

    let mut sink = Vec::new();
    writer.write_to_stream(&mut sink).await.unwrap();

    assert_eq!(writer.remaining(), 0);
    assert_eq!(sink, serialize_response(&response));
}
