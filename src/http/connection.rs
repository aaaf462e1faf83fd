use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::proxy::orchestrator::ProxyOrchestrator;
use crate::proxy::transport::Transport;
use crate::server::router;

pub struct Connection<S, T> {
    stream: S,
    buffer: Vec<u8>,
    state: ConnectionState,
    orchestrator: Arc<ProxyOrchestrator<T>>,
}

pub enum ConnectionState {
    Reading,
    Processing(Request),
    Writing(ResponseWriter, bool), // bool = keep_alive?
    Closed,
}

impl<S, T> Connection<S, T>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Transport,
{
    pub fn new(stream: S, orchestrator: Arc<ProxyOrchestrator<T>>) -> Self {
        Self {
            stream,
            buffer: Vec::with_capacity(4096),
            state: ConnectionState::Reading,
            orchestrator,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await {
                        Ok(Some(req)) => ConnectionState::Processing(req),
                        Ok(None) => ConnectionState::Closed,
                        Err(e) => {
                            // Malformed or oversized request: answer and close
                            tracing::debug!(error = %e, "Rejecting malformed request");
                            let status = match e {
                                ParseError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
                                _ => StatusCode::BAD_REQUEST,
                            };
                            let response = ResponseBuilder::new(status)
                                .header("Content-Type", "text/plain")
                                .header("Connection", "close")
                                .body(format!("{} {}: {e}", status.as_u16(), status.reason_phrase()))
                                .build();
                            ConnectionState::Writing(ResponseWriter::new(&response), false)
                        }
                    };
                }

                ConnectionState::Processing(req) => {
                    let keep_alive = req.keep_alive();
                    let response = self.handle_request(req, keep_alive).await;

                    let writer = ResponseWriter::new(&response);
                    self.state = ConnectionState::Writing(writer, keep_alive);
                }

                ConnectionState::Writing(mut writer, keep_alive) => {
                    writer.write_to_stream(&mut self.stream).await?;

                    self.state = if keep_alive {
                        ConnectionState::Reading // go back for next request
                    } else {
                        ConnectionState::Closed
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> Result<Option<Request>, ParseError> {
        loop {
            // Try parsing whatever we already have
            match parse_http_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.drain(..consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => return Err(e),
            }

            let mut temp = [0u8; 4096];
            let n = match self.stream.read(&mut temp).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "Read failed, closing connection");
                    return Ok(None);
                }
            };

            if n == 0 {
                // Client closed connection
                return Ok(None);
            }

            self.buffer.extend_from_slice(&temp[..n]);
        }
    }

    async fn handle_request(&self, req: Request, keep_alive: bool) -> Response {
        let is_head = req.method == Method::HEAD;
        let mut response = router::dispatch(&self.orchestrator, req).await;

        // The body is always fully buffered, so its length is authoritative.
        // HEAD advertises that length but never sends the bytes.
        if is_head {
            response
                .headers
                .insert_if_absent("Content-Length", response.body.len().to_string());
            response.body = Bytes::new();
        } else {
            response
                .headers
                .insert("Content-Length", response.body.len().to_string());
        }
        if !keep_alive {
            response.headers.insert("Connection", "close");
        }
        response
    }
}
