//! Body interpretation by declared content type.
//!
//! The gateway relays upstream bytes untouched; this decides how a caller
//! should read them.

use bytes::Bytes;
use serde_json::Value;

use crate::http::response::Response;

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `application/json` or `+json` body that parsed as JSON.
    Json(Value),
    /// Textual, non-JSON body (`text/*`, XML, form data, JavaScript).
    Text(String),
    /// Everything else, or a body that did not match its declared type.
    Binary(Bytes),
}

impl Payload {
    pub fn from_response(response: &Response) -> Self {
        Self::decode(response.header("content-type"), &response.body)
    }

    pub fn decode(content_type: Option<&str>, body: &Bytes) -> Self {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if is_json(&mime) {
            if let Ok(value) = serde_json::from_slice(body) {
                return Payload::Json(value);
            }
        }

        if is_json(&mime) || is_textual(&mime) {
            if let Ok(text) = std::str::from_utf8(body) {
                return Payload::Text(text.to_string());
            }
        }

        Payload::Binary(body.clone())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Json(_) => "json",
            Payload::Text(_) => "text",
            Payload::Binary(_) => "binary",
        }
    }
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

fn is_textual(mime: &str) -> bool {
    mime.starts_with("text/")
        || mime.ends_with("+xml")
        || matches!(
            mime,
            "application/xml" | "application/javascript" | "application/x-www-form-urlencoded"
        )
}
