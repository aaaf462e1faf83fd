use corsway::http::parser::{MAX_BODY_BYTES, MAX_HEADER_BYTES, ParseError, parse_http_request};
use corsway::http::request::Method;

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host"), Some("example.com"));
    assert!(parsed.query.is_empty());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /proxy/api/items HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.path, "/proxy/api/items");
    assert_eq!(parsed.body, "hello");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_query_string_is_split_and_decoded() {
    let req = b"GET /proxy?url=https%3A%2F%2Fapi.example.com%2Fv1%3Fa%3D1&q=a+b HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.path, "/proxy");
    assert_eq!(parsed.query_param("url"), Some("https://api.example.com/v1?a=1"));
    assert_eq!(parsed.query_param("q"), Some("a b"));
}

#[test]
fn test_header_lookup_ignores_case() {
    let req = b"GET / HTTP/1.1\r\nContent-Type: application/json\r\nORIGIN: https://app.example.com\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.header("content-type"), Some("application/json"));
    assert_eq!(parsed.header("Origin"), Some("https://app.example.com"));
}

#[test]
fn test_pipelined_requests_consume_only_the_first() {
    let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
    let (first, consumed) = parse_http_request(req).unwrap();
    assert_eq!(first.path, "/a");

    let (second, _) = parse_http_request(&req[consumed..]).unwrap();
    assert_eq!(second.path, "/b");
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::Incomplete);
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /api HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::Incomplete);
}

#[test]
fn test_parse_invalid_http_method() {
    let req = b"INVALID / HTTP/1.1\r\n\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidMethod);
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidHeader);

    let req = b"GET / HTTP/1.1\r\n: no-name\r\n\r\n";
    assert_eq!(parse_http_request(req).unwrap_err(), ParseError::InvalidHeader);
}

#[test]
fn test_invalid_content_length() {
    let req = b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
    assert_eq!(
        parse_http_request(req).unwrap_err(),
        ParseError::InvalidContentLength
    );
}

#[test]
fn test_chunked_bodies_are_rejected() {
    let req = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
    assert_eq!(
        parse_http_request(req).unwrap_err(),
        ParseError::UnsupportedTransferEncoding
    );
}

#[test]
fn test_oversized_headers_are_rejected() {
    let mut req = b"GET / HTTP/1.1\r\nX-Big: ".to_vec();
    req.extend(std::iter::repeat_n(b'a', MAX_HEADER_BYTES));

    assert_eq!(parse_http_request(&req).unwrap_err(), ParseError::HeadersTooLarge);
}

#[test]
fn test_oversized_declared_body_is_rejected_before_it_arrives() {
    let too_big = MAX_BODY_BYTES + 1;
    let req = format!("POST /upload HTTP/1.1\r\nContent-Length: {too_big}\r\n\r\npartial");

    assert_eq!(
        parse_http_request(req.as_bytes()).unwrap_err(),
        ParseError::BodyTooLarge(too_big)
    );
}

#[test]
fn test_body_at_the_limit_waits_for_more_data() {
    let req = format!("POST /upload HTTP/1.1\r\nContent-Length: {MAX_BODY_BYTES}\r\n\r\n");

    assert_eq!(parse_http_request(req.as_bytes()).unwrap_err(), ParseError::Incomplete);
}

#[test]
fn test_parse_various_http_methods() {
    let methods = [
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{method_str} / HTTP/1.1\r\n\r\n");
        let (parsed, _) = parse_http_request(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, expected_method);
    }
}

#[test]
fn test_parse_request_with_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body.as_ref(), &[0, 1, 2, 3]);
}
