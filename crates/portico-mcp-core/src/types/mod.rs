//! MCP entity types: tools, resources, prompts, notifications.

pub mod info;
pub mod notifications;
pub mod prompts;
pub mod resources;
pub mod tools;

pub use info::{ClientInfo, ServerInfo};
pub use notifications::{
    CancelledNotification, LogLevel, ProgressNotification, ProgressToken, RequestMeta,
    ResourceUpdatedNotification,
};
pub use prompts::{
    GetPromptRequest, GetPromptResponse, ListPromptsRequest, ListPromptsResponse, Prompt,
    PromptArgument, PromptMessage,
};
pub use resources::{
    ListResourceTemplatesRequest, ListResourceTemplatesResponse, ListResourcesRequest,
    ListResourcesResponse, ReadResourceRequest, ReadResourceResponse, Resource, ResourceContent,
    ResourceTemplate, SubscribeRequest, TemplateBindings, UnsubscribeRequest,
};
pub use tools::{
    ListToolsRequest, ListToolsResponse, Tool, ToolCall, ToolContent, ToolResult,
};
