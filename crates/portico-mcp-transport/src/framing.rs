//! Newline-delimited JSON framing.
//!
//! One JSON object per `\n`-terminated line, UTF-8, no BOM. The reader
//! accumulates bytes until a newline, slices the completed line, and
//! parses it; a partial tail stays buffered across reads, so a message
//! arriving in arbitrarily small chunks still yields exactly one
//! frame. A line that fails to parse produces a recoverable
//! [`TransportError::Framing`] and the stream continues.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use portico_mcp_core::protocol::{parse_message, serialize_message, JsonRpcMessage};

use crate::{Result, TransportError};

const READ_CHUNK_SIZE: usize = 8192;

/// Line-framed reader/writer pair over any async byte stream.
pub struct LineFramed<R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
    eof: bool,
}

impl<R, W> LineFramed<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::new(),
            eof: false,
        }
    }

    /// Serialize and write one message followed by `\n`. serde_json's
    /// compact form never contains a raw newline, which upholds the
    /// producer guarantee.
    pub async fn send(&mut self, message: &JsonRpcMessage) -> Result<()> {
        let mut bytes =
            serialize_message(message).map_err(|e| TransportError::Serialization {
                message: e.to_string(),
            })?;
        bytes.push(b'\n');
        self.writer
            .write_all(&bytes)
            .await
            .map_err(|e| TransportError::SendFailed {
                message: e.to_string(),
            })?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed {
                message: e.to_string(),
            })?;
        trace!(bytes = bytes.len(), "frame sent");
        Ok(())
    }

    /// Read the next complete line and parse it.
    pub async fn receive(&mut self) -> Result<JsonRpcMessage> {
        loop {
            if let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                let mut line = &line[..line.len() - 1];
                if line.ends_with(b"\r") {
                    line = &line[..line.len() - 1];
                }
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                trace!(bytes = line.len(), "frame received");
                return parse_message(line).map_err(|e| TransportError::Framing {
                    message: e.to_string(),
                });
            }

            if self.eof {
                return Err(TransportError::ConnectionClosed);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let n = self
                .reader
                .read(&mut chunk)
                .await
                .map_err(|e| TransportError::ReceiveFailed {
                    message: e.to_string(),
                })?;
            if n == 0 {
                self.eof = true;
                // A partial tail without a terminating newline is
                // dropped at EOF.
                self.buffer.clear();
                return Err(TransportError::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed {
                message: e.to_string(),
            })
    }
}
