//! # Portico MCP Core
//!
//! Protocol-level types for the Model Context Protocol: JSON-RPC 2.0
//! envelopes, capability and lifecycle types, the JSON Schema subset
//! validator, URI templates, and pagination cursors. Higher layers
//! (transport, engine, server, client, auth) build on this crate; it
//! performs no I/O itself.

pub mod error;
pub mod ids;
pub mod pagination;
pub mod protocol;
pub mod schema;
pub mod types;
pub mod uri;

pub use error::{Error, ProtocolError, ResourceError, Result, ToolError, TransportError};
pub use protocol::{
    ClientCapabilities, JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ProtocolVersion, RequestId, ServerCapabilities, SessionPhase,
    VersionNegotiator,
};
pub use uri::UriTemplate;
