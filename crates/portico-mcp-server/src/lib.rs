//! # Portico MCP Server
//!
//! The server role: a registry of tools, resources, resource
//! templates, and prompts; method routing over the protocol engine;
//! and serving over STDIO, streamable HTTP, or any custom transport.

pub mod handlers;
pub mod registry;
pub mod router;

pub use handlers::{
    prompt_fn, resource_fn, tool_fn, PromptHandler, ResourceHandler, ToolHandler,
};
pub use registry::{ChangeNotifier, EntityKind, RegistrationHandle, Registry};
pub use router::{RouterConfig, SessionState};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use portico_mcp_core::error::Result;
use portico_mcp_core::protocol::constants::methods;
use portico_mcp_core::protocol::{ServerCapabilities, VersionNegotiator};
use portico_mcp_core::types::info::ServerInfo;
use portico_mcp_core::types::notifications::ResourceUpdatedNotification;
use portico_mcp_core::types::{Prompt, Resource, ResourceTemplate, Tool};
use portico_mcp_engine::{Endpoint, EngineConfig, Peer};
use portico_mcp_transport::http::{HttpServerConfig, HttpServerState, SessionMessage};
use portico_mcp_transport::{StdioTransport, Transport};

/// Session id used for single-session transports (STDIO, in-memory).
const LOCAL_SESSION: &str = "local";

/// The MCP server: registry plus serving plumbing.
pub struct PorticoServer {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
    engine_config: EngineConfig,
    page_size: usize,
    registry: Arc<Registry>,
    sessions: Arc<RwLock<HashMap<String, Peer>>>,
}

impl PorticoServer {
    pub fn new(info: ServerInfo) -> Self {
        Self {
            info,
            capabilities: default_capabilities(),
            instructions: None,
            engine_config: EngineConfig::default(),
            page_size: 50,
            registry: Registry::new(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn register_tool(
        &self,
        tool: Tool,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<RegistrationHandle> {
        self.registry.register_tool(tool, handler)
    }

    pub fn register_resource(
        &self,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<RegistrationHandle> {
        self.registry.register_resource(resource, handler)
    }

    pub fn register_template(
        &self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<RegistrationHandle> {
        self.registry.register_template(template, handler)
    }

    pub fn register_prompt(
        &self,
        prompt: Prompt,
        handler: Arc<dyn PromptHandler>,
    ) -> Result<RegistrationHandle> {
        self.registry.register_prompt(prompt, handler)
    }

    /// Publish a resource update: exactly the sessions subscribed to
    /// `uri` receive `notifications/resources/updated`. Returns how
    /// many sessions were notified.
    pub async fn notify_resource_updated(&self, uri: &str) -> usize {
        let subscribers = self.registry.subscribers_of(uri);
        if subscribers.is_empty() {
            return 0;
        }
        let params = match serde_json::to_value(ResourceUpdatedNotification {
            uri: uri.to_string(),
        }) {
            Ok(params) => params,
            Err(_) => return 0,
        };
        let sessions = self.sessions.read().await;
        let mut notified = 0;
        for session_id in subscribers {
            if let Some(peer) = sessions.get(&session_id) {
                if peer
                    .notify(methods::RESOURCES_UPDATED, Some(params.clone()))
                    .await
                    .is_ok()
                {
                    notified += 1;
                }
            }
        }
        debug!(uri, notified, "resource update fanned out");
        notified
    }

    fn router_config(&self) -> Arc<RouterConfig> {
        Arc::new(RouterConfig {
            info: self.info.clone(),
            capabilities: self.capabilities.clone(),
            instructions: self.instructions.clone(),
            page_size: self.page_size,
            negotiator: VersionNegotiator::default(),
        })
    }

    /// Wire one session's endpoint: routing handlers, the list-changed
    /// notifier, and the peer table used for subscription fan-out.
    pub async fn attach_session(&self, endpoint: &Endpoint, session_id: &str) -> Arc<SessionState> {
        let state = router::attach(
            endpoint,
            session_id,
            self.registry.clone(),
            self.router_config(),
        );
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), endpoint.peer());
        self.install_notifier();
        state
    }

    /// Broadcast debounced list-changed notifications to every live
    /// session, but only for kinds whose capability was advertised.
    fn install_notifier(&self) {
        let sessions = self.sessions.clone();
        let capabilities = self.capabilities.clone();
        self.registry.set_notifier(Arc::new(move |kind| {
            let method = match kind {
                EntityKind::Tools if capabilities.tools_list_changed() => {
                    methods::TOOLS_LIST_CHANGED
                }
                EntityKind::Resources if capabilities.resources_list_changed() => {
                    methods::RESOURCES_LIST_CHANGED
                }
                EntityKind::Prompts if capabilities.prompts_list_changed() => {
                    methods::PROMPTS_LIST_CHANGED
                }
                _ => return,
            };
            let sessions = sessions.clone();
            tokio::spawn(async move {
                let sessions = sessions.read().await;
                for peer in sessions.values() {
                    let _ = peer.notify_debounced(method, None).await;
                }
            });
        }));
    }

    /// Attach and connect a custom transport as one session. Returns
    /// the endpoint for lifecycle control.
    pub async fn connect_session(
        &self,
        transport: Box<dyn Transport>,
        session_id: &str,
    ) -> Result<Arc<Endpoint>> {
        let endpoint = Arc::new(Endpoint::new(self.engine_config.clone()));
        self.attach_session(&endpoint, session_id).await;
        endpoint.connect(transport).await?;
        Ok(endpoint)
    }

    /// Serve a single session over stdin/stdout until the peer closes
    /// the stream.
    pub async fn serve_stdio(&self) -> Result<()> {
        info!(server = %self.info.name, "serving over stdio");
        let endpoint = self
            .connect_session(Box::new(StdioTransport::new()), LOCAL_SESSION)
            .await?;
        endpoint.wait().await;
        self.registry.drop_session(LOCAL_SESSION);
        self.sessions.write().await.remove(LOCAL_SESSION);
        Ok(())
    }

    /// Serve over streamable HTTP: one engine endpoint per transport
    /// session, all sharing this server's registry.
    pub async fn serve_http(&self, config: HttpServerConfig) -> Result<()> {
        let mut http = portico_mcp_transport::HttpTransportServer::new(config);
        let mut incoming = http
            .take_incoming()
            .ok_or_else(|| portico_mcp_core::error::Error::internal("incoming already taken"))?;
        let state = http.state();

        let server_task = tokio::spawn(async move { http.serve().await });

        let mut channels: HashMap<String, mpsc::UnboundedSender<
            portico_mcp_core::protocol::JsonRpcMessage,
        >> = HashMap::new();
        let mut endpoints: HashMap<String, Arc<Endpoint>> = HashMap::new();

        while let Some(SessionMessage {
            session_id,
            message,
        }) = incoming.recv().await
        {
            let sender = match channels.get(&session_id) {
                Some(sender) if !sender.is_closed() => sender.clone(),
                _ => {
                    debug!(session = %session_id, "starting session endpoint");
                    let (sender, receiver) = mpsc::unbounded_channel();
                    let transport = HttpSessionTransport {
                        session_id: session_id.clone(),
                        state: state.clone(),
                        receiver,
                    };
                    match self.connect_session(Box::new(transport), &session_id).await {
                        Ok(endpoint) => {
                            endpoints.insert(session_id.clone(), endpoint);
                            channels.insert(session_id.clone(), sender.clone());
                            sender
                        }
                        Err(e) => {
                            warn!(session = %session_id, error = %e, "session start failed");
                            continue;
                        }
                    }
                }
            };
            if sender.send(message).is_err() {
                // Session endpoint died (idle sweep or close); forget it.
                channels.remove(&session_id);
                if let Some(endpoint) = endpoints.remove(&session_id) {
                    let _ = endpoint.close().await;
                }
                self.registry.drop_session(&session_id);
                self.sessions.write().await.remove(&session_id);
            }
        }

        server_task.abort();
        Ok(())
    }
}

/// Capabilities advertised by default: all four server features, with
/// change notifications and subscriptions on.
fn default_capabilities() -> ServerCapabilities {
    use portico_mcp_core::protocol::capabilities::{
        LoggingCapability, PromptsCapability, ResourcesCapability, ToolsCapability,
    };
    ServerCapabilities {
        tools: Some(ToolsCapability {
            list_changed: Some(true),
        }),
        resources: Some(ResourcesCapability {
            subscribe: Some(true),
            list_changed: Some(true),
        }),
        prompts: Some(PromptsCapability {
            list_changed: Some(true),
        }),
        logging: Some(LoggingCapability {}),
        ..Default::default()
    }
}

/// Adapter presenting one HTTP session as an engine transport.
struct HttpSessionTransport {
    session_id: String,
    state: HttpServerState,
    receiver: mpsc::UnboundedReceiver<portico_mcp_core::protocol::JsonRpcMessage>,
}

#[async_trait]
impl Transport for HttpSessionTransport {
    async fn send(
        &mut self,
        message: portico_mcp_core::protocol::JsonRpcMessage,
    ) -> portico_mcp_transport::Result<()> {
        self.state.send(&self.session_id, message).await
    }

    async fn receive(
        &mut self,
    ) -> portico_mcp_transport::Result<portico_mcp_core::protocol::JsonRpcMessage> {
        self.receiver
            .recv()
            .await
            .ok_or(portico_mcp_transport::TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> portico_mcp_transport::Result<()> {
        self.receiver.close();
        Ok(())
    }
}
