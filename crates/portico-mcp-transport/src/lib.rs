//! # Portico MCP Transport
//!
//! Transport implementations for MCP sessions: STDIO (server side and
//! spawned child processes), streamable HTTP with resumable SSE, and
//! an in-memory pair for tests and in-process composition.
//!
//! A transport frames and delivers [`JsonRpcMessage`]s and owns the
//! underlying stream. Framing problems on a single message surface as
//! recoverable errors; stream-level failures close the transport, and
//! the engine fails all in-flight requests with `ConnectionClosed`.

use async_trait::async_trait;
use thiserror::Error;

use portico_mcp_core::protocol::JsonRpcMessage;

pub mod framing;
pub mod http;
pub mod memory;
pub mod stdio;

pub use http::{HttpClientConfig, HttpClientTransport, HttpServerConfig, HttpTransportServer};
pub use memory::InMemoryTransport;
pub use stdio::{StdioClientConfig, StdioClientTransport, StdioTransport};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    /// One inbound message could not be framed or parsed. The stream
    /// survives; callers should log and keep receiving.
    #[error("framing error: {message}")]
    Framing { message: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {message}")]
    SendFailed { message: String },

    #[error("receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("session rejected: {message}")]
    SessionRejected { message: String },

    #[error("initialization error: {message}")]
    Initialization { message: String },
}

impl TransportError {
    /// Whether the transport is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Framing { .. })
    }
}

/// Bidirectional message transport for one session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one message. Outbound bytes are serialized per message; a
    /// partial message never interleaves with another.
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()>;

    /// Receive the next message, suspending until one arrives.
    async fn receive(&mut self) -> Result<JsonRpcMessage>;

    /// Close the transport. Subsequent sends fail with
    /// [`TransportError::ConnectionClosed`].
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_errors_are_recoverable() {
        assert!(!TransportError::Framing {
            message: "bad json".to_string()
        }
        .is_fatal());
        assert!(TransportError::ConnectionClosed.is_fatal());
        assert!(TransportError::ReceiveFailed {
            message: "io".to_string()
        }
        .is_fatal());
    }
}
