//! Convenience imports for typical server and client code.

pub use portico_mcp_client::{ClientConfig, PorticoClient};
pub use portico_mcp_core::error::{Error, Result};
pub use portico_mcp_core::protocol::{ClientCapabilities, ServerCapabilities};
pub use portico_mcp_core::types::{
    ClientInfo, GetPromptResponse, Prompt, PromptArgument, PromptMessage, ReadResourceResponse,
    Resource, ResourceContent, ResourceTemplate, ServerInfo, Tool, ToolCall, ToolResult,
};
pub use portico_mcp_engine::{EngineConfig, RequestOptions};
pub use portico_mcp_server::{prompt_fn, resource_fn, tool_fn, PorticoServer};
pub use portico_mcp_transport::{
    HttpClientConfig, HttpServerConfig, InMemoryTransport, StdioClientConfig,
};
