//! Response serialization
//!
//! A [`Response`] is rendered into one contiguous HTTP/1.1 buffer up front.
//! [`ResponseWriter`] then drains that buffer into any async stream, which
//! lets the connection loop write to a `TcpStream` in production and to an
//! in-memory duplex pipe in tests.

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Renders the status line, headers in map order, and the body.
///
/// Framing headers are the caller's job; nothing is added here.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256 + resp.body.len());

    buf.extend_from_slice(
        format!(
            "{HTTP_VERSION} {} {}\r\n",
            resp.status.as_u16(),
            resp.status.reason_phrase()
        )
        .as_bytes(),
    );

    for (name, value) in &resp.headers {
        for part in [name.as_bytes(), &b": "[..], value.as_bytes(), &b"\r\n"[..]] {
            buf.extend_from_slice(part);
        }
    }
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&resp.body);

    buf
}

/// A serialized response plus how much of it has reached the peer.
pub struct ResponseWriter {
    wire: Vec<u8>,
    sent: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            wire: serialize_response(response),
            sent: 0,
        }
    }

    /// Bytes not yet written.
    pub fn remaining(&self) -> usize {
        self.wire.len() - self.sent
    }

    /// Writes the rest of the response and flushes.
    ///
    /// A zero-length write means the peer went away; that is an error.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.remaining() > 0 {
            match stream.write(&self.wire[self.sent..]).await? {
                0 => anyhow::bail!("peer closed after {} of {} response bytes", self.sent, self.wire.len()),
                n => self.sent += n,
            }
        }

        stream.flush().await?;
        Ok(())
    }
}
