//! # Portico MCP
//!
//! A Model Context Protocol implementation for Rust: a bidirectional
//! JSON-RPC 2.0 protocol engine with capability negotiation, pluggable
//! transports (STDIO, streamable HTTP with resumable SSE, in-memory),
//! a server-side registry of tools/resources/prompts, JSON Schema
//! validation, and OAuth 2.1 authorization.
//!
//! Most applications start from [`PorticoServer`] or [`PorticoClient`]:
//!
//! ```rust,no_run
//! use portico_mcp::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> portico_mcp::Result<()> {
//! let server = PorticoServer::new(ServerInfo::new("adder", "1.0.0"));
//! server.register_tool(
//!     Tool::new(
//!         "add",
//!         json!({
//!             "type": "object",
//!             "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
//!             "required": ["a", "b"]
//!         }),
//!     ),
//!     tool_fn(|arguments, _ctx| async move {
//!         let a = arguments["a"].as_f64().unwrap_or(0.0);
//!         let b = arguments["b"].as_f64().unwrap_or(0.0);
//!         Ok(ToolResult::text(format!("{}", a + b)))
//!     }),
//! )?;
//! server.serve_stdio().await
//! # }
//! ```

pub use portico_mcp_core as core;
pub use portico_mcp_engine as engine;
pub use portico_mcp_transport as transport;

pub use portico_mcp_auth as auth;
pub use portico_mcp_client::{ClientConfig, PorticoClient, ResourceUpdateCallback};
pub use portico_mcp_server::{
    prompt_fn, resource_fn, tool_fn, PorticoServer, PromptHandler, RegistrationHandle, Registry,
    ResourceHandler, RouterConfig, ToolHandler,
};

pub use portico_mcp_core::error::{Error, Result};
pub use portico_mcp_core::protocol::{
    ClientCapabilities, JsonRpcError, JsonRpcMessage, ProtocolVersion, RequestId,
    ServerCapabilities,
};
pub use portico_mcp_core::types::{
    ClientInfo, Prompt, PromptArgument, Resource, ResourceContent, ResourceTemplate, ServerInfo,
    Tool, ToolCall, ToolResult,
};
pub use portico_mcp_engine::{Endpoint, EngineConfig, RequestOptions};

pub mod prelude;
