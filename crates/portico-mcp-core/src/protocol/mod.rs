//! Protocol-level building blocks: JSON-RPC envelopes, versions,
//! capabilities, and the initialization handshake.

pub mod capabilities;
pub mod constants;
pub mod jsonrpc;
pub mod lifecycle;
pub mod version;

pub use capabilities::{ClientCapabilities, ServerCapabilities};
pub use constants::{methods, JSONRPC_VERSION};
pub use jsonrpc::{
    parse_message, serialize_message, JsonRpcError, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};
pub use lifecycle::{InitializeRequest, InitializeResponse, SessionPhase};
pub use version::{ProtocolVersion, VersionNegotiator};
