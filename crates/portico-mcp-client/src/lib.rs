//! # Portico MCP Client
//!
//! The client role: drives the initialization handshake, exposes a
//! typed request surface over the protocol engine, and dispatches
//! resource-update notifications to subscription callbacks. The client
//! never calls a model itself; sampling and elicitation requests from
//! the server are routed to handlers the host registers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use portico_mcp_core::error::{Error, ProtocolError, Result};
use portico_mcp_core::protocol::constants::methods;
use portico_mcp_core::protocol::{
    ClientCapabilities, InitializeRequest, InitializeResponse, ProtocolVersion,
    ServerCapabilities, SessionPhase,
};
use portico_mcp_core::types::info::{ClientInfo, ServerInfo};
use portico_mcp_core::types::notifications::{LogLevel, ResourceUpdatedNotification};
use portico_mcp_core::types::{
    GetPromptRequest, GetPromptResponse, ListPromptsResponse, ListResourceTemplatesResponse,
    ListResourcesResponse, ListToolsResponse, ReadResourceRequest, ReadResourceResponse,
    SubscribeRequest, ToolCall, ToolResult, UnsubscribeRequest,
};
use portico_mcp_engine::{
    notification_handler, Endpoint, EngineConfig, RequestHandle, RequestOptions,
};
use portico_mcp_transport::{
    HttpClientConfig, HttpClientTransport, StdioClientConfig, StdioClientTransport, Transport,
};

/// Callback invoked when a subscribed resource reports an update.
pub type ResourceUpdateCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub info: ClientInfo,
    pub capabilities: ClientCapabilities,
    pub protocol_version: ProtocolVersion,
    pub engine: EngineConfig,
}

impl ClientConfig {
    pub fn new(info: ClientInfo) -> Self {
        Self {
            info,
            capabilities: ClientCapabilities::default(),
            protocol_version: ProtocolVersion::latest(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ClientCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// The MCP client.
pub struct PorticoClient {
    config: ClientConfig,
    endpoint: Endpoint,
    server_info: RwLock<Option<ServerInfo>>,
    server_capabilities: RwLock<Option<ServerCapabilities>>,
    subscriptions: Arc<RwLock<HashMap<String, ResourceUpdateCallback>>>,
}

impl PorticoClient {
    pub fn new(config: ClientConfig) -> Self {
        let endpoint = Endpoint::new(config.engine.clone());
        let subscriptions: Arc<RwLock<HashMap<String, ResourceUpdateCallback>>> =
            Arc::new(RwLock::new(HashMap::new()));

        // Resource updates are fanned out to exactly the callbacks
        // registered for the reported URI.
        {
            let subscriptions = subscriptions.clone();
            endpoint.on_notification(
                methods::RESOURCES_UPDATED,
                notification_handler(move |params| {
                    let subscriptions = subscriptions.clone();
                    async move {
                        let Some(update) = params.and_then(|p| {
                            serde_json::from_value::<ResourceUpdatedNotification>(p).ok()
                        }) else {
                            warn!("malformed resources/updated notification");
                            return;
                        };
                        let callback = subscriptions.read().await.get(&update.uri).cloned();
                        match callback {
                            Some(callback) => callback(update.uri),
                            None => debug!(uri = %update.uri, "update for unwatched resource"),
                        }
                    }
                }),
            );
        }

        Self {
            config,
            endpoint,
            server_info: RwLock::new(None),
            server_capabilities: RwLock::new(None),
            subscriptions,
        }
    }

    /// Register a handler for server-initiated requests (sampling,
    /// elicitation, roots) the host chooses to support.
    pub fn on_request(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn portico_mcp_engine::RequestHandler>,
    ) {
        self.endpoint.on_request(method, handler);
    }

    /// Register a handler for server notifications (e.g. the
    /// list-changed family).
    pub fn on_notification(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn portico_mcp_engine::NotificationHandler>,
    ) {
        self.endpoint.on_notification(method, handler);
    }

    /// Connect over a spawned child process speaking STDIO.
    pub async fn connect_stdio(&self, config: StdioClientConfig) -> Result<()> {
        let transport = StdioClientTransport::spawn(config)
            .map_err(|e| Error::Transport(portico_mcp_core::error::TransportError::ConnectionFailed(e.to_string())))?;
        self.connect(Box::new(transport)).await
    }

    /// Connect over streamable HTTP.
    pub async fn connect_http(&self, config: HttpClientConfig) -> Result<()> {
        let transport = HttpClientTransport::new(config)
            .map_err(|e| Error::Transport(portico_mcp_core::error::TransportError::ConnectionFailed(e.to_string())))?;
        self.connect(Box::new(transport)).await
    }

    /// Connect over any transport and run the handshake.
    pub async fn connect(&self, transport: Box<dyn Transport>) -> Result<()> {
        self.endpoint.connect(transport).await?;
        self.initialize().await
    }

    /// The `initialize`/`initialized` handshake. On an incompatible
    /// negotiated version the session is terminated.
    async fn initialize(&self) -> Result<()> {
        let request = InitializeRequest {
            protocol_version: self.config.protocol_version.to_string(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.info.clone(),
        };
        let value = self
            .endpoint
            .request_and_wait(
                methods::INITIALIZE,
                Some(serde_json::to_value(&request)?),
                RequestOptions::default(),
            )
            .await?;
        let response: InitializeResponse = serde_json::from_value(value)
            .map_err(|e| Error::Protocol(ProtocolError::InvalidResponse(e.to_string())))?;

        let negotiated = ProtocolVersion::parse(&response.protocol_version).map_err(|_| {
            Error::Protocol(ProtocolError::UnsupportedProtocolVersion(
                response.protocol_version.clone(),
            ))
        })?;
        if !ProtocolVersion::supported().contains(&negotiated) {
            // The server countered with a version we cannot speak.
            warn!(version = %negotiated, "incompatible protocol version, terminating");
            self.endpoint.close().await?;
            return Err(Error::Protocol(ProtocolError::UnsupportedProtocolVersion(
                response.protocol_version,
            )));
        }

        info!(
            server = %response.server_info.name,
            version = %negotiated,
            "initialized"
        );
        *self.server_info.write().await = Some(response.server_info);
        *self.server_capabilities.write().await = Some(response.capabilities);

        self.endpoint
            .notify(methods::INITIALIZED, None)
            .await?;
        self.endpoint.set_phase(SessionPhase::Operational);
        Ok(())
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.server_info.read().await.clone()
    }

    pub async fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities.read().await.clone()
    }

    /// Strict capability assertion: reject calls the server never
    /// advertised with method-not-found semantics.
    async fn assert_capability(&self, method: &str) -> Result<()> {
        let capabilities = self.server_capabilities.read().await;
        match capabilities.as_ref() {
            Some(capabilities) if capabilities.allows_method(method) => Ok(()),
            Some(_) => Err(Error::method_not_found(method)),
            None => Err(Error::Protocol(ProtocolError::InitializationFailed(
                "not initialized".to_string(),
            ))),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T> {
        self.assert_capability(method).await?;
        let value = self.endpoint.request_and_wait(method, params, options).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(ProtocolError::InvalidResponse(e.to_string())))
    }

    // --- tools ---

    pub async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResponse> {
        let params = cursor.map(|cursor| serde_json::json!({ "cursor": cursor }));
        self.call(methods::TOOLS_LIST, params, RequestOptions::default())
            .await
    }

    pub async fn call_tool(&self, call: ToolCall) -> Result<ToolResult> {
        self.call_tool_with_options(call, RequestOptions::default())
            .await
    }

    pub async fn call_tool_with_options(
        &self,
        call: ToolCall,
        options: RequestOptions,
    ) -> Result<ToolResult> {
        self.call(
            methods::TOOLS_CALL,
            Some(serde_json::to_value(call)?),
            options,
        )
        .await
    }

    /// Start a tool call and return its handle for cancellation or
    /// progress-aware waiting.
    pub async fn call_tool_handle(
        &self,
        call: ToolCall,
        options: RequestOptions,
    ) -> Result<RequestHandle> {
        self.assert_capability(methods::TOOLS_CALL).await?;
        self.endpoint
            .request(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(call)?),
                options,
            )
            .await
    }

    // --- resources ---

    pub async fn list_resources(&self, cursor: Option<String>) -> Result<ListResourcesResponse> {
        let params = cursor.map(|cursor| serde_json::json!({ "cursor": cursor }));
        self.call(methods::RESOURCES_LIST, params, RequestOptions::default())
            .await
    }

    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourceTemplatesResponse> {
        let params = cursor.map(|cursor| serde_json::json!({ "cursor": cursor }));
        self.call(
            methods::RESOURCES_TEMPLATES_LIST,
            params,
            RequestOptions::default(),
        )
        .await
    }

    pub async fn read_resource(&self, uri: impl Into<String>) -> Result<ReadResourceResponse> {
        let request = ReadResourceRequest { uri: uri.into() };
        self.call(
            methods::RESOURCES_READ,
            Some(serde_json::to_value(request)?),
            RequestOptions::default(),
        )
        .await
    }

    /// Subscribe to updates for `uri`. The callback fires once per
    /// `resources/updated` notification for that URI.
    pub async fn subscribe_resource<F>(&self, uri: impl Into<String>, callback: F) -> Result<()>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let uri = uri.into();
        self.subscriptions
            .write()
            .await
            .insert(uri.clone(), Arc::new(callback));
        let request = SubscribeRequest { uri: uri.clone() };
        let result: Result<serde_json::Value> = self
            .call(
                methods::RESOURCES_SUBSCRIBE,
                Some(serde_json::to_value(request)?),
                RequestOptions::default(),
            )
            .await;
        if result.is_err() {
            // Keep local state consistent with the server's.
            self.subscriptions.write().await.remove(&uri);
        }
        result.map(|_| ())
    }

    /// Unsubscribe; removing an absent subscription is harmless.
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> Result<()> {
        let uri = uri.into();
        self.subscriptions.write().await.remove(&uri);
        let request = UnsubscribeRequest { uri };
        let _: serde_json::Value = self
            .call(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(serde_json::to_value(request)?),
                RequestOptions::default(),
            )
            .await?;
        Ok(())
    }

    // --- prompts ---

    pub async fn list_prompts(&self, cursor: Option<String>) -> Result<ListPromptsResponse> {
        let params = cursor.map(|cursor| serde_json::json!({ "cursor": cursor }));
        self.call(methods::PROMPTS_LIST, params, RequestOptions::default())
            .await
    }

    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResponse> {
        let request = GetPromptRequest {
            name: name.into(),
            arguments,
        };
        self.call(
            methods::PROMPTS_GET,
            Some(serde_json::to_value(request)?),
            RequestOptions::default(),
        )
        .await
    }

    // --- logging / liveness / shutdown ---

    pub async fn set_log_level(&self, level: LogLevel) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                methods::LOGGING_SET_LEVEL,
                Some(serde_json::json!({ "level": level })),
                RequestOptions::default(),
            )
            .await?;
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        self.endpoint.ping().await.map(|_| ())
    }

    pub async fn close(&self) -> Result<()> {
        self.endpoint.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::new(ClientInfo::new("test-client", "1.0"));
        assert_eq!(config.protocol_version, ProtocolVersion::latest());
        assert!(config.capabilities.sampling.is_none());
    }

    #[tokio::test]
    async fn calls_before_initialization_fail() {
        let client = PorticoClient::new(ClientConfig::new(ClientInfo::new("c", "1")));
        let err = client.list_tools(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InitializationFailed(_))
        ));
    }
}
