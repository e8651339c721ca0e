//! Error types shared across the Portico MCP workspace.
//!
//! `Error` is the canonical error for protocol operations. Variants are
//! grouped by failure domain (protocol, transport, tool, resource) and
//! convert to wire-level [`JsonRpcError`](crate::protocol::JsonRpcError)
//! objects with the documented error codes.

use thiserror::Error;

/// Canonical result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidParams(msg.into()))
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::MethodNotFound(method.into()))
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::InvalidRequest(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::Internal(msg.into()))
    }

    pub fn capability_not_supported(capability: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::CapabilityNotSupported(capability.into()))
    }

    pub fn request_timeout() -> Self {
        Self::Protocol(ProtocolError::RequestTimeout)
    }

    pub fn cancelled() -> Self {
        Self::Protocol(ProtocolError::Cancelled)
    }

    pub fn connection_closed() -> Self {
        Self::Protocol(ProtocolError::ConnectionClosed)
    }

    pub fn not_connected() -> Self {
        Self::Protocol(ProtocolError::NotConnected)
    }

    /// True when the waiter was terminated without a peer response
    /// (cancel, timeout, or connection loss).
    pub fn is_terminal_without_response(&self) -> bool {
        matches!(
            self,
            Error::Protocol(
                ProtocolError::Cancelled
                    | ProtocolError::RequestTimeout
                    | ProtocolError::ConnectionClosed
            )
        )
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON-RPC version: {0}")]
    InvalidVersion(String),

    #[error("invalid request id: {0}")]
    InvalidRequestId(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    RequestTimeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("capability not supported: {0}")]
    CapabilityNotSupported(String),

    #[error("unsupported protocol version: {0}")]
    UnsupportedProtocolVersion(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("not connected")]
    NotConnected,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid URI: {0}")]
    InvalidUri(String),
}

impl From<crate::protocol::JsonRpcError> for Error {
    fn from(err: crate::protocol::JsonRpcError) -> Self {
        use crate::protocol::jsonrpc::{app_error_codes, error_codes};
        match err.code {
            error_codes::METHOD_NOT_FOUND => {
                Error::Protocol(ProtocolError::MethodNotFound(err.message))
            }
            error_codes::INVALID_PARAMS => {
                Error::Protocol(ProtocolError::InvalidParams(err.message))
            }
            error_codes::INVALID_REQUEST => {
                Error::Protocol(ProtocolError::InvalidRequest(err.message))
            }
            app_error_codes::REQUEST_TIMEOUT => Error::Protocol(ProtocolError::RequestTimeout),
            app_error_codes::CAPABILITY_NOT_SUPPORTED => {
                Error::Protocol(ProtocolError::CapabilityNotSupported(err.message))
            }
            app_error_codes::INITIALIZATION_FAILED => {
                Error::Protocol(ProtocolError::InitializationFailed(err.message))
            }
            app_error_codes::PROTOCOL_VERSION_NOT_SUPPORTED => {
                Error::Protocol(ProtocolError::UnsupportedProtocolVersion(err.message))
            }
            _ => Error::Protocol(ProtocolError::Internal(err.message)),
        }
    }
}

impl From<Error> for crate::protocol::JsonRpcError {
    fn from(err: Error) -> Self {
        use crate::protocol::jsonrpc::{app_error_codes, error_codes, JsonRpcError};

        match err {
            Error::Protocol(ProtocolError::InvalidVersion(v)) => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                format!("invalid JSON-RPC version: {v}"),
            ),
            Error::Protocol(ProtocolError::InvalidRequestId(id)) => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                format!("invalid request id: {id}"),
            ),
            Error::Protocol(ProtocolError::MethodNotFound(m)) => {
                JsonRpcError::method_not_found(&m)
            }
            Error::Protocol(ProtocolError::InvalidParams(msg)) => {
                JsonRpcError::new(error_codes::INVALID_PARAMS, format!("invalid params: {msg}"))
            }
            Error::Protocol(ProtocolError::InvalidRequest(msg)) => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                format!("invalid request: {msg}"),
            ),
            Error::Protocol(ProtocolError::InvalidResponse(msg)) => JsonRpcError::new(
                error_codes::INVALID_REQUEST,
                format!("invalid response: {msg}"),
            ),
            Error::Protocol(ProtocolError::RequestTimeout) => JsonRpcError::new(
                app_error_codes::REQUEST_TIMEOUT,
                "request timed out".to_string(),
            ),
            Error::Protocol(ProtocolError::Cancelled) => JsonRpcError::new(
                error_codes::INTERNAL_ERROR,
                "request cancelled".to_string(),
            ),
            Error::Protocol(ProtocolError::Internal(msg)) => JsonRpcError::new(
                error_codes::INTERNAL_ERROR,
                format!("internal error: {msg}"),
            ),
            Error::Protocol(ProtocolError::InitializationFailed(msg)) => JsonRpcError::new(
                app_error_codes::INITIALIZATION_FAILED,
                format!("initialization failed: {msg}"),
            ),
            Error::Protocol(ProtocolError::CapabilityNotSupported(cap)) => JsonRpcError::new(
                app_error_codes::CAPABILITY_NOT_SUPPORTED,
                format!("capability not supported: {cap}"),
            ),
            Error::Protocol(ProtocolError::UnsupportedProtocolVersion(v)) => JsonRpcError::new(
                app_error_codes::PROTOCOL_VERSION_NOT_SUPPORTED,
                format!("unsupported protocol version: {v}"),
            ),
            Error::Protocol(ProtocolError::ConnectionClosed)
            | Error::Transport(TransportError::ConnectionClosed) => JsonRpcError::new(
                error_codes::INTERNAL_ERROR,
                "connection closed".to_string(),
            ),
            Error::Protocol(ProtocolError::NotConnected) => JsonRpcError::new(
                error_codes::INTERNAL_ERROR,
                "not connected".to_string(),
            ),
            Error::Transport(e) => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, format!("transport error: {e}"))
            }
            Error::Tool(ToolError::NotFound(name)) => JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("tool not found: {name}"),
            ),
            Error::Tool(ToolError::ExecutionFailed(msg)) => JsonRpcError::new(
                app_error_codes::TOOL_EXECUTION_ERROR,
                format!("tool execution failed: {msg}"),
            ),
            Error::Tool(ToolError::SchemaValidation(msg)) => {
                let fields: Vec<&str> = msg.split("; ").collect();
                JsonRpcError::new(
                    error_codes::INVALID_PARAMS,
                    format!("schema validation failed: {msg}"),
                )
                .with_data(serde_json::json!({ "errors": fields }))
            }
            Error::Resource(ResourceError::NotFound(uri)) => JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("resource not found: {uri}"),
            ),
            Error::Resource(ResourceError::InvalidUri(uri)) => JsonRpcError::new(
                app_error_codes::INVALID_URI,
                format!("invalid URI: {uri}"),
            ),
            Error::Serialization(e) => JsonRpcError::new(
                error_codes::PARSE_ERROR,
                format!("serialization error: {e}"),
            ),
            Error::Io(e) => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, format!("io error: {e}"))
            }
            Error::Other(e) => JsonRpcError::new(error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }
}
