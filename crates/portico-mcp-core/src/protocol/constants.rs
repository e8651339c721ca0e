//! Wire-level constants: method names, header names, and limits.

/// JSON-RPC version string carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Maximum accepted length for string request ids.
pub const MAX_REQUEST_ID_LENGTH: usize = 256;

/// Bounds for numeric request ids.
pub const MIN_REQUEST_ID_NUMBER: i64 = 0;
pub const MAX_REQUEST_ID_NUMBER: i64 = i64::MAX / 2;

/// Session id header for the streamable HTTP transport.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Protocol version header for the streamable HTTP transport.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// SSE resume header.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Request and notification method names.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";

    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    pub const RESOURCES_READ: &str = "resources/read";
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";

    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";

    pub const PROGRESS: &str = "notifications/progress";
    pub const CANCELLED: &str = "notifications/cancelled";

    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    pub const LOGGING_MESSAGE: &str = "notifications/message";

    pub const COMPLETION_COMPLETE: &str = "completion/complete";
}
