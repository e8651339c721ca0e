//! Method routing: binds the registry and handshake to an engine
//! endpoint for one session.

use std::collections::HashMap;
use std::sync::Arc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use portico_mcp_core::error::{Error, Result};
use portico_mcp_core::protocol::constants::methods;
use portico_mcp_core::protocol::{
    ClientCapabilities, InitializeRequest, InitializeResponse, ServerCapabilities, SessionPhase,
    VersionNegotiator,
};
use portico_mcp_core::schema::SchemaCache;
use portico_mcp_core::types::info::ServerInfo;
use portico_mcp_core::types::notifications::SetLevelRequest;
use portico_mcp_core::types::{
    GetPromptRequest, ListPromptsResponse, ListResourceTemplatesResponse, ListResourcesResponse,
    ListToolsResponse, ReadResourceRequest, SubscribeRequest, ToolCall, UnsubscribeRequest,
};
use portico_mcp_engine::{notification_handler, request_handler, Endpoint};

use crate::registry::Registry;

/// Static routing configuration shared by all sessions.
pub struct RouterConfig {
    pub info: ServerInfo,
    pub capabilities: ServerCapabilities,
    pub instructions: Option<String>,
    pub page_size: usize,
    pub negotiator: VersionNegotiator,
}

/// Mutable per-session negotiation state.
#[derive(Default)]
pub struct SessionState {
    pub client_capabilities: std::sync::Mutex<Option<ClientCapabilities>>,
    pub log_level: std::sync::Mutex<Option<portico_mcp_core::types::LogLevel>>,
}

fn cursor_of(params: &Option<Value>) -> Option<String> {
    params
        .as_ref()
        .and_then(|p| p.get("cursor"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn require_capability(config: &RouterConfig, method: &str) -> Result<()> {
    if config.capabilities.allows_method(method) {
        Ok(())
    } else {
        // Capability assertions are strict: an unadvertised method
        // fails with method-not-found semantics.
        Err(Error::method_not_found(method))
    }
}

/// Register every server-role handler on `endpoint` for one session.
pub fn attach(
    endpoint: &Endpoint,
    session_id: &str,
    registry: Arc<Registry>,
    config: Arc<RouterConfig>,
) -> Arc<SessionState> {
    let state = Arc::new(SessionState::default());
    let schemas = SchemaCache::new();

    // --- lifecycle ---

    {
        let config = config.clone();
        let state = state.clone();
        endpoint.on_request(
            methods::INITIALIZE,
            request_handler(move |params, ctx| {
                let config = config.clone();
                let state = state.clone();
                async move {
                    if ctx.peer.phase() == Some(SessionPhase::Operational) {
                        return Err(Error::Protocol(
                            portico_mcp_core::error::ProtocolError::InitializationFailed(
                                "session already initialized".to_string(),
                            ),
                        ));
                    }
                    let request: InitializeRequest = parse_params(params)?;
                    let negotiated = config.negotiator.negotiate(&request.protocol_version);
                    info!(
                        client = %request.client_info.name,
                        requested = %request.protocol_version,
                        negotiated = %negotiated,
                        "initialize"
                    );
                    *state
                        .client_capabilities
                        .lock()
                        .map_err(|_| Error::internal("state lock poisoned"))? =
                        Some(request.capabilities);

                    let response = InitializeResponse {
                        protocol_version: negotiated.to_string(),
                        capabilities: config.capabilities.clone(),
                        server_info: config.info.clone(),
                        instructions: config.instructions.clone(),
                    };
                    Ok(serde_json::to_value(response)?)
                }
            }),
        );
    }

    endpoint.on_notification(
        methods::INITIALIZED,
        notification_handler({
            let peer = endpoint.peer();
            move |_params| {
                let peer = peer.clone();
                async move {
                    match peer.phase() {
                        Some(SessionPhase::Operational) => {
                            // Duplicate initialized notifications after
                            // the first are ignored.
                            debug!("duplicate initialized notification ignored");
                        }
                        Some(_) => {
                            info!("session operational");
                            peer.set_session_phase(SessionPhase::Operational);
                        }
                        None => {}
                    }
                }
            }
        }),
    );

    // --- tools ---

    {
        let registry = registry.clone();
        let config = config.clone();
        endpoint.on_request(
            methods::TOOLS_LIST,
            request_handler(move |params, _ctx| {
                let registry = registry.clone();
                let config = config.clone();
                async move {
                    require_capability(&config, methods::TOOLS_LIST)?;
                    let (tools, next_cursor) =
                        registry.list_tools(cursor_of(&params).as_deref(), config.page_size)?;
                    Ok(serde_json::to_value(ListToolsResponse { tools, next_cursor })?)
                }
            }),
        );
    }

    {
        let registry = registry.clone();
        let config = config.clone();
        let schemas = schemas.clone();
        endpoint.on_request(
            methods::TOOLS_CALL,
            request_handler(move |params, ctx| {
                let registry = registry.clone();
                let config = config.clone();
                let schemas = schemas.clone();
                async move {
                    require_capability(&config, methods::TOOLS_CALL)?;
                    let call: ToolCall = parse_params(params)?;
                    let (tool, handler) = registry.resolve_tool(&call.name)?;

                    let arguments = call.arguments.unwrap_or_else(|| json!({}));
                    validate_against(&schemas, &tool.input_schema, &arguments)?;

                    let result = handler.call(arguments, ctx).await?;

                    if let (Some(schema), Some(structured)) =
                        (&tool.output_schema, &result.structured_content)
                    {
                        if let Err(errors) = schemas
                            .get_or_compile(schema)
                            .map_err(|e| Error::internal(e.join("; ")))?
                            .validate(structured)
                        {
                            warn!(tool = %tool.name, "structured result failed output schema");
                            return Err(Error::internal(format!(
                                "tool result violates output schema: {}",
                                errors.join("; ")
                            )));
                        }
                    }
                    Ok(serde_json::to_value(result)?)
                }
            }),
        );
    }

    // --- resources ---

    {
        let registry = registry.clone();
        let config = config.clone();
        endpoint.on_request(
            methods::RESOURCES_LIST,
            request_handler(move |params, _ctx| {
                let registry = registry.clone();
                let config = config.clone();
                async move {
                    require_capability(&config, methods::RESOURCES_LIST)?;
                    let (resources, next_cursor) =
                        registry.list_resources(cursor_of(&params).as_deref(), config.page_size)?;
                    Ok(serde_json::to_value(ListResourcesResponse {
                        resources,
                        next_cursor,
                    })?)
                }
            }),
        );
    }

    {
        let registry = registry.clone();
        let config = config.clone();
        endpoint.on_request(
            methods::RESOURCES_TEMPLATES_LIST,
            request_handler(move |params, _ctx| {
                let registry = registry.clone();
                let config = config.clone();
                async move {
                    require_capability(&config, methods::RESOURCES_TEMPLATES_LIST)?;
                    let (resource_templates, next_cursor) =
                        registry.list_templates(cursor_of(&params).as_deref(), config.page_size)?;
                    Ok(serde_json::to_value(ListResourceTemplatesResponse {
                        resource_templates,
                        next_cursor,
                    })?)
                }
            }),
        );
    }

    {
        let registry = registry.clone();
        let config = config.clone();
        endpoint.on_request(
            methods::RESOURCES_READ,
            request_handler(move |params, ctx| {
                let registry = registry.clone();
                let config = config.clone();
                async move {
                    require_capability(&config, methods::RESOURCES_READ)?;
                    let request: ReadResourceRequest = parse_params(params)?;
                    let (handler, bindings) = registry.resolve_resource(&request.uri)?;
                    let response = handler.read(&request.uri, bindings, ctx).await?;
                    Ok(serde_json::to_value(response)?)
                }
            }),
        );
    }

    {
        let registry = registry.clone();
        let config = config.clone();
        let session = session_id.to_string();
        endpoint.on_request(
            methods::RESOURCES_SUBSCRIBE,
            request_handler(move |params, _ctx| {
                let registry = registry.clone();
                let config = config.clone();
                let session = session.clone();
                async move {
                    require_capability(&config, methods::RESOURCES_SUBSCRIBE)?;
                    let request: SubscribeRequest = parse_params(params)?;
                    if !registry.knows_uri(&request.uri) {
                        return Err(Error::invalid_params(format!(
                            "unknown resource: {}",
                            request.uri
                        )));
                    }
                    registry.subscribe(&session, &request.uri)?;
                    Ok(json!({}))
                }
            }),
        );
    }

    {
        let registry = registry.clone();
        let config = config.clone();
        let session = session_id.to_string();
        endpoint.on_request(
            methods::RESOURCES_UNSUBSCRIBE,
            request_handler(move |params, _ctx| {
                let registry = registry.clone();
                let config = config.clone();
                let session = session.clone();
                async move {
                    require_capability(&config, methods::RESOURCES_UNSUBSCRIBE)?;
                    let request: UnsubscribeRequest = parse_params(params)?;
                    registry.unsubscribe(&session, &request.uri)?;
                    Ok(json!({}))
                }
            }),
        );
    }

    // --- prompts ---

    {
        let registry = registry.clone();
        let config = config.clone();
        endpoint.on_request(
            methods::PROMPTS_LIST,
            request_handler(move |params, _ctx| {
                let registry = registry.clone();
                let config = config.clone();
                async move {
                    require_capability(&config, methods::PROMPTS_LIST)?;
                    let (prompts, next_cursor) =
                        registry.list_prompts(cursor_of(&params).as_deref(), config.page_size)?;
                    Ok(serde_json::to_value(ListPromptsResponse {
                        prompts,
                        next_cursor,
                    })?)
                }
            }),
        );
    }

    {
        let registry = registry.clone();
        let config = config.clone();
        endpoint.on_request(
            methods::PROMPTS_GET,
            request_handler(move |params, ctx| {
                let registry = registry.clone();
                let config = config.clone();
                async move {
                    require_capability(&config, methods::PROMPTS_GET)?;
                    let request: GetPromptRequest = parse_params(params)?;
                    let (prompt, handler) = registry.resolve_prompt(&request.name)?;
                    let arguments: HashMap<String, String> =
                        request.arguments.unwrap_or_default();
                    prompt.validate_arguments(&arguments)?;
                    let response = handler.get(arguments, ctx).await?;
                    Ok(serde_json::to_value(response)?)
                }
            }),
        );
    }

    // --- logging ---

    {
        let config = config.clone();
        let state = state.clone();
        endpoint.on_request(
            methods::LOGGING_SET_LEVEL,
            request_handler(move |params, _ctx| {
                let config = config.clone();
                let state = state.clone();
                async move {
                    require_capability(&config, methods::LOGGING_SET_LEVEL)?;
                    let request: SetLevelRequest = parse_params(params)?;
                    debug!(level = ?request.level, "log level set by client");
                    *state
                        .log_level
                        .lock()
                        .map_err(|_| Error::internal("state lock poisoned"))? =
                        Some(request.level);
                    Ok(json!({}))
                }
            }),
        );
    }

    state
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T> {
    serde_json::from_value(params.unwrap_or_else(|| json!({})))
        .map_err(|e| Error::invalid_params(e.to_string()))
}

fn validate_against(cache: &SchemaCache, schema: &Value, data: &Value) -> Result<()> {
    let compiled = cache
        .get_or_compile(schema)
        .map_err(|errors| Error::internal(errors.join("; ")))?;
    compiled.validate(data).map_err(|errors| {
        Error::Tool(portico_mcp_core::error::ToolError::SchemaValidation(
            errors.join("; "),
        ))
    })
}
