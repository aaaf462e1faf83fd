//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use corsway::http::response::{Response, ResponseBuilder, StatusCode};
use corsway::proxy::builder::OutboundRequest;
use corsway::proxy::transport::{Transport, TransportError};

/// In-memory transport that replays a script of outcomes and records every request.
///
/// Once the script runs out every call answers `200 OK` with body `ok`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<Result<Response, TransportError>>>>,
    sent: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Result<Response, TransportError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            sent: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> OutboundRequest {
        self.sent.lock().unwrap().last().cloned().expect("no request was sent")
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest, _timeout: Duration) -> Result<Response, TransportError> {
        self.sent.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(status(200, "ok")))
    }
}

pub fn status(code: u16, body: &str) -> Response {
    ResponseBuilder::new(StatusCode::from_u16(code).unwrap())
        .header("Content-Type", "text/plain")
        .body(body.to_string())
        .build()
}

pub fn json(code: u16, body: &str) -> Response {
    ResponseBuilder::new(StatusCode::from_u16(code).unwrap())
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .build()
}

pub fn refused() -> Result<Response, TransportError> {
    Err(TransportError::Connect("connection refused".to_string()))
}

pub fn timed_out() -> Result<Response, TransportError> {
    Err(TransportError::Timeout(Duration::from_secs(30)))
}
