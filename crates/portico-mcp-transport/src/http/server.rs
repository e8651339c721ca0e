//! Streamable HTTP server transport.
//!
//! One configurable path speaks the whole protocol: `POST` carries
//! client-to-server messages (single or batch), `GET` opens the
//! server-to-client SSE stream with `Last-Event-ID` resumability, and
//! `DELETE` terminates the session. The server issues an
//! `Mcp-Session-Id` on the first response; every later request must
//! echo it. Host and Origin headers are validated against allowlists
//! before anything else (DNS-rebinding protection), and the body size
//! cap is enforced before parsing.

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Form, Json, Router,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use portico_mcp_auth::{AuthorizationServerMetadata, BearerAuth, OAuthErrorResponse,
    ProtectedResourceMetadata, TokenInfo, TokenResponse, TokenStore};
use portico_mcp_core::ids::generate_secure_random;
use portico_mcp_core::protocol::constants::{
    LAST_EVENT_ID_HEADER, PROTOCOL_VERSION_HEADER, SESSION_ID_HEADER,
};
use portico_mcp_core::protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcResponse, ProtocolVersion, RequestId,
};

use super::session::{ReplayLimits, ReplayOutcome, SessionStore, SseEvent};
use crate::{Result, TransportError};

/// Server configuration.
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    /// Request path for the MCP endpoint.
    pub path: String,
    /// Host-header allowlist (compared without the port).
    pub allowed_hosts: Vec<String>,
    /// Origin-header prefix allowlist for browser contexts. `*` allows
    /// any origin.
    pub allowed_origins: Vec<String>,
    /// Request body cap, enforced before parsing.
    pub max_body_bytes: usize,
    pub replay_limits: ReplayLimits,
    pub session_idle_timeout: Duration,
    /// How long a `POST` waits for its synchronous response.
    pub post_response_timeout: Duration,
    pub cors_enabled: bool,
    /// Bearer authentication in front of the endpoint.
    pub bearer: Option<Arc<BearerAuth>>,
    /// Served at `/.well-known/oauth-protected-resource` when set.
    pub resource_metadata: Option<ProtectedResourceMetadata>,
    /// Minimal authorization-server role (token + revocation
    /// endpoints and RFC 8414 metadata) when set.
    pub authorization_server: Option<AuthorizationServerConfig>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path: "/mcp".to_string(),
            allowed_hosts: vec![
                "127.0.0.1".to_string(),
                "localhost".to_string(),
                "[::1]".to_string(),
            ],
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
                "https://localhost".to_string(),
            ],
            max_body_bytes: 2 * 1024 * 1024,
            replay_limits: ReplayLimits::default(),
            session_idle_timeout: Duration::from_secs(300),
            post_response_timeout: Duration::from_secs(30),
            cors_enabled: true,
            bearer: None,
            resource_metadata: None,
            authorization_server: None,
        }
    }
}

/// Minimal authorization-server role.
pub struct AuthorizationServerConfig {
    pub store: Arc<dyn TokenStore>,
    pub token_ttl: chrono::Duration,
    pub metadata: AuthorizationServerMetadata,
}

/// An inbound message tagged with its session.
#[derive(Debug)]
pub struct SessionMessage {
    pub session_id: String,
    pub message: JsonRpcMessage,
}

type PendingPosts = Arc<Mutex<HashMap<(String, RequestId), oneshot::Sender<JsonRpcResponse>>>>;

/// Shared state handed to handlers and to the message consumer.
#[derive(Clone)]
pub struct HttpServerState {
    config: Arc<HttpServerConfig>,
    sessions: Arc<SessionStore>,
    inbound: mpsc::UnboundedSender<SessionMessage>,
    pending: PendingPosts,
}

impl HttpServerState {
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Route an outbound message to a session: a response completes a
    /// waiting `POST` when one is pending, everything else goes out on
    /// the session's SSE stream.
    pub async fn send(&self, session_id: &str, message: JsonRpcMessage) -> Result<()> {
        if let JsonRpcMessage::Response(response) = &message {
            let key = (session_id.to_string(), response.id.clone());
            let waiting = self.pending.lock().await.remove(&key);
            if let Some(sender) = waiting {
                if sender.send(response.clone()).is_ok() {
                    return Ok(());
                }
                // POST side gave up (timeout); fall through to SSE.
            }
        }
        let data = serde_json::to_string(&message).map_err(|e| TransportError::Serialization {
            message: e.to_string(),
        })?;
        self.sessions
            .push_event(session_id, data)
            .await
            .ok_or(TransportError::SessionRejected {
                message: format!("unknown session: {session_id}"),
            })?;
        Ok(())
    }
}

/// The streamable HTTP server.
pub struct HttpTransportServer {
    state: HttpServerState,
    incoming: Option<mpsc::UnboundedReceiver<SessionMessage>>,
}

impl HttpTransportServer {
    pub fn new(config: HttpServerConfig) -> Self {
        let (inbound, incoming) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionStore::new(
            config.replay_limits,
            config.session_idle_timeout,
        ));
        let state = HttpServerState {
            config: Arc::new(config),
            sessions,
            inbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };
        Self {
            state,
            incoming: Some(incoming),
        }
    }

    pub fn state(&self) -> HttpServerState {
        self.state.clone()
    }

    /// Take the inbound message stream. Yields once.
    pub fn take_incoming(&mut self) -> Option<mpsc::UnboundedReceiver<SessionMessage>> {
        self.incoming.take()
    }

    pub fn router(&self) -> Router {
        let state = self.state.clone();
        let config = &self.state.config;

        let mut router = Router::new()
            .route(
                &config.path,
                post(handle_post).get(handle_get).delete(handle_delete),
            )
            .layer(DefaultBodyLimit::max(config.max_body_bytes));

        if config.resource_metadata.is_some() {
            router = router.route(
                "/.well-known/oauth-protected-resource",
                get(handle_resource_metadata),
            );
        }
        if config.authorization_server.is_some() {
            router = router
                .route(
                    "/.well-known/oauth-authorization-server",
                    get(handle_as_metadata),
                )
                .route("/oauth/token", post(handle_token))
                .route("/oauth/revoke", post(handle_revoke));
        }
        if config.cors_enabled {
            router = router.layer(tower_http::cors::CorsLayer::permissive());
        }

        router.with_state(state)
    }

    /// Bind the configured address. Useful with port 0 to let the OS
    /// pick one; the bound address is on the returned listener.
    pub async fn bind(&self) -> Result<tokio::net::TcpListener> {
        let address = format!("{}:{}", self.state.config.host, self.state.config.port);
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| TransportError::Initialization {
                message: format!("failed to bind {address}: {e}"),
            })
    }

    /// Bind and serve until the process is stopped.
    pub async fn serve(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve_with(listener).await
    }

    /// Serve on an already-bound listener. Also runs the idle session
    /// sweeper.
    pub async fn serve_with(self, listener: tokio::net::TcpListener) -> Result<()> {
        if let Ok(address) = listener.local_addr() {
            info!(%address, path = %self.state.config.path, "starting streamable HTTP server");
        }

        let sweeper_sessions = self.state.sessions.clone();
        let sweep_every = self.state.config.session_idle_timeout / 2;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                let swept = sweeper_sessions.sweep_idle().await;
                if swept > 0 {
                    debug!(swept, "idle sessions removed");
                }
            }
        });

        let router = self.router();
        axum::serve(listener, router)
            .await
            .map_err(|e| TransportError::Initialization {
                message: format!("server failed: {e}"),
            })
    }
}

#[derive(Serialize)]
struct SessionErrorBody {
    error: &'static str,
    message: String,
}

fn session_not_found(session_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(SessionErrorBody {
            error: "session_not_found",
            message: format!("unknown or expired session: {session_id}"),
        }),
    )
        .into_response()
}

fn forbidden(reason: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(SessionErrorBody {
            error: "forbidden",
            message: reason.to_string(),
        }),
    )
        .into_response()
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Host-header check against the allowlist, ignoring the port.
fn validate_host(headers: &HeaderMap, allowed: &[String]) -> bool {
    let Some(host) = header_value(headers, header::HOST.as_str()) else {
        return false;
    };
    let bare = if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal, possibly with a port.
        match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        }
    } else {
        host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
    };
    allowed.iter().any(|a| a.eq_ignore_ascii_case(bare))
}

/// Origin check for browser contexts. Absent origin means a
/// non-browser client and passes.
fn validate_origin(headers: &HeaderMap, allowed: &[String]) -> bool {
    match header_value(headers, header::ORIGIN.as_str()) {
        None => true,
        Some(origin) => allowed
            .iter()
            .any(|a| a == "*" || origin.starts_with(a.as_str())),
    }
}

fn validate_protocol_version_header(headers: &HeaderMap) -> std::result::Result<(), String> {
    match header_value(headers, PROTOCOL_VERSION_HEADER) {
        None => Ok(()),
        Some(raw) => match ProtocolVersion::parse(raw) {
            Ok(version) if ProtocolVersion::supported().contains(&version) => Ok(()),
            _ => Err(raw.to_string()),
        },
    }
}

/// Shared request guards: host, origin, protocol version, bearer.
async fn guard_request(
    state: &HttpServerState,
    headers: &HeaderMap,
) -> std::result::Result<Option<portico_mcp_auth::AuthPrincipal>, Response> {
    if !validate_host(headers, &state.config.allowed_hosts) {
        warn!("request rejected: Host header not in allowlist");
        return Err(forbidden("Host not allowed"));
    }
    if !validate_origin(headers, &state.config.allowed_origins) {
        warn!("request rejected: Origin not allowed");
        return Err(forbidden("Origin not allowed"));
    }
    if let Err(version) = validate_protocol_version_header(headers) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(SessionErrorBody {
                error: "unsupported_protocol_version",
                message: version,
            }),
        )
            .into_response());
    }
    match &state.config.bearer {
        None => Ok(None),
        Some(bearer) => {
            let authorization = header_value(headers, header::AUTHORIZATION.as_str());
            match bearer.authenticate(authorization).await {
                Ok(principal) => Ok(Some(principal)),
                Err(rejection) => Err(auth_rejection_response(rejection)),
            }
        }
    }
}

fn auth_rejection_response(rejection: portico_mcp_auth::AuthRejection) -> Response {
    let status = StatusCode::from_u16(rejection.status).unwrap_or(StatusCode::UNAUTHORIZED);
    (
        status,
        [(header::WWW_AUTHENTICATE, rejection.www_authenticate)],
        Json(OAuthErrorResponse::from(&rejection.error)),
    )
        .into_response()
}

async fn handle_post(
    State(state): State<HttpServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let principal = match guard_request(&state, &headers).await {
        Ok(principal) => principal,
        Err(response) => return response,
    };

    // Session resolution: a request without a session id creates one;
    // an unknown id is a 404.
    let session_id = match header_value(&headers, SESSION_ID_HEADER) {
        Some(id) => {
            if state.sessions.get(id).await.is_none() {
                return session_not_found(id);
            }
            id.to_string()
        }
        None => {
            let origin = header_value(&headers, header::ORIGIN.as_str()).map(str::to_string);
            state.sessions.create(origin).await
        }
    };

    if let Some(session) = state.sessions.get(&session_id).await {
        let mut session = session.lock().await;
        session.touch();
        if session.principal.is_none() {
            session.principal = principal.clone();
        }
    }

    // Single message or batch.
    let parsed: std::result::Result<Vec<JsonRpcMessage>, String> = match serde_json::from_slice::<
        serde_json::Value,
    >(&body)
    {
        Err(e) => Err(e.to_string()),
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                serde_json::from_value::<JsonRpcMessage>(item)
                    .map_err(|e| e.to_string())
                    .and_then(|m| m.validate().map(|_| m).map_err(|e| e.to_string()))
            })
            .collect(),
        Ok(single) => serde_json::from_value::<JsonRpcMessage>(single)
            .map_err(|e| e.to_string())
            .and_then(|m| m.validate().map(|_| m).map_err(|e| e.to_string()))
            .map(|m| vec![m]),
    };
    let messages = match parsed {
        Ok(messages) if !messages.is_empty() => messages,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": JsonRpcError::invalid_request("empty batch"),
                })),
            )
                .into_response();
        }
        Err(detail) => {
            return (
                StatusCode::BAD_REQUEST,
                [(SESSION_ID_HEADER, session_id)],
                Json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": JsonRpcError::parse_error(detail),
                })),
            )
                .into_response();
        }
    };

    // Scope checks per request method.
    if let (Some(bearer), Some(principal)) = (&state.config.bearer, &principal) {
        for message in &messages {
            if let JsonRpcMessage::Request(request) = message {
                if let Err(rejection) = bearer.authorize_method(principal, &request.method) {
                    return auth_rejection_response(rejection);
                }
            }
        }
    }

    let single_request_id = match &messages[..] {
        [JsonRpcMessage::Request(request)] => Some(request.id.clone()),
        _ => None,
    };

    // A lone request gets its response synchronously on this POST;
    // batches and notification-only posts are accepted with 202 and
    // answered over the SSE stream.
    let waiter = match &single_request_id {
        Some(id) => {
            let (sender, receiver) = oneshot::channel();
            state
                .pending
                .lock()
                .await
                .insert((session_id.clone(), id.clone()), sender);
            Some(receiver)
        }
        None => None,
    };

    for message in messages {
        if state
            .inbound
            .send(SessionMessage {
                session_id: session_id.clone(),
                message,
            })
            .is_err()
        {
            error!("inbound consumer gone");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(SessionErrorBody {
                    error: "unavailable",
                    message: "server is shutting down".to_string(),
                }),
            )
                .into_response();
        }
    }

    match waiter {
        None => (StatusCode::ACCEPTED, [(SESSION_ID_HEADER, session_id)]).into_response(),
        Some(receiver) => {
            match tokio::time::timeout(state.config.post_response_timeout, receiver).await {
                Ok(Ok(response)) => (
                    StatusCode::OK,
                    [(SESSION_ID_HEADER, session_id)],
                    Json(response),
                )
                    .into_response(),
                _ => {
                    if let Some(id) = single_request_id {
                        state.pending.lock().await.remove(&(session_id.clone(), id));
                    }
                    (
                        StatusCode::GATEWAY_TIMEOUT,
                        [(SESSION_ID_HEADER, session_id)],
                        Json(SessionErrorBody {
                            error: "timeout",
                            message: "no response before the POST deadline".to_string(),
                        }),
                    )
                        .into_response()
                }
            }
        }
    }
}

async fn handle_get(State(state): State<HttpServerState>, headers: HeaderMap) -> Response {
    if let Err(response) = guard_request(&state, &headers).await {
        return response;
    }

    let Some(session_id) = header_value(&headers, SESSION_ID_HEADER).map(str::to_string) else {
        return session_not_found("<missing>");
    };
    let Some(session) = state.sessions.get(&session_id).await else {
        return session_not_found(&session_id);
    };

    let last_event_id = header_value(&headers, LAST_EVENT_ID_HEADER)
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0);

    // Snapshot the replay window and subscribe under one lock so no
    // event is missed or duplicated between the two.
    let (outcome, receiver) = {
        let mut session = session.lock().await;
        session.touch();
        (session.replay_from(last_event_id), session.subscribe())
    };

    let events = match outcome {
        ReplayOutcome::Gone => {
            debug!(session = %session_id, last_event_id, "replay window exhausted");
            let stream = futures::stream::iter(vec![Ok::<Event, std::convert::Infallible>(
                Event::default()
                    .event("events-gone")
                    .data("requested events are no longer buffered"),
            )]);
            return Sse::new(stream.boxed()).into_response();
        }
        ReplayOutcome::Events(events) => events,
    };

    debug!(
        session = %session_id,
        replayed = events.len(),
        "SSE stream opened"
    );

    let replay_stream = futures::stream::iter(
        events
            .into_iter()
            .map(|event| Ok::<Event, std::convert::Infallible>(to_sse(event))),
    );
    let live_stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => return Some((Ok(to_sse(event)), receiver)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "SSE subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    let stream = replay_stream.chain(live_stream).boxed();

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn to_sse(event: SseEvent) -> Event {
    Event::default()
        .id(event.id.to_string())
        .event("message")
        .data(event.data)
}

async fn handle_delete(State(state): State<HttpServerState>, headers: HeaderMap) -> Response {
    if let Err(response) = guard_request(&state, &headers).await {
        return response;
    }
    let Some(session_id) = header_value(&headers, SESSION_ID_HEADER) else {
        return session_not_found("<missing>");
    };
    if state.sessions.remove(session_id).await {
        info!(session = %session_id, "session terminated by client");
        StatusCode::OK.into_response()
    } else {
        session_not_found(session_id)
    }
}

async fn handle_resource_metadata(State(state): State<HttpServerState>) -> Response {
    match &state.config.resource_metadata {
        Some(metadata) => Json(metadata).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_as_metadata(State(state): State<HttpServerState>) -> Response {
    match &state.config.authorization_server {
        Some(auth_server) => Json(&auth_server.metadata).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_token(
    State(state): State<HttpServerState>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let Some(auth_server) = &state.config.authorization_server else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let grant_type = params.get("grant_type").map(String::as_str).unwrap_or("");
    if grant_type != "authorization_code" {
        return (
            StatusCode::BAD_REQUEST,
            Json(OAuthErrorResponse::new(
                "unsupported_grant_type",
                format!("grant_type '{grant_type}' not supported"),
            )),
        )
            .into_response();
    }
    let (Some(code), Some(verifier)) = (params.get("code"), params.get("code_verifier")) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(OAuthErrorResponse::new(
                "invalid_request",
                "code and code_verifier are required",
            )),
        )
            .into_response();
    };

    match auth_server.store.consume_auth_code(code, verifier).await {
        Ok(granted) => {
            let token = generate_secure_random(48);
            let info = TokenInfo {
                token: token.clone(),
                client_id: granted.client_id,
                subject: None,
                scopes: granted.scopes.clone(),
                expires_at: chrono::Utc::now(),
            };
            if let Err(e) = auth_server.store.put(info, auth_server.token_ttl).await {
                error!(error = %e, "failed to persist token");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(OAuthErrorResponse::new("server_error", e.to_string())),
                )
                    .into_response();
            }
            let scope = (!granted.scopes.is_empty()).then(|| {
                let mut scopes: Vec<&str> = granted.scopes.iter().map(String::as_str).collect();
                scopes.sort_unstable();
                scopes.join(" ")
            });
            Json(TokenResponse {
                access_token: token,
                token_type: "Bearer".to_string(),
                expires_in: Some(auth_server.token_ttl.num_seconds().max(0) as u64),
                refresh_token: None,
                scope,
            })
            .into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(OAuthErrorResponse::from(&e)),
        )
            .into_response(),
    }
}

async fn handle_revoke(
    State(state): State<HttpServerState>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    let Some(auth_server) = &state.config.authorization_server else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(token) = params.get("token") {
        if let Err(e) = auth_server.store.delete(token).await {
            error!(error = %e, "token revocation failed");
        }
    }
    // RFC 7009: revocation always answers 200.
    StatusCode::OK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn host_allowlist() {
        let allowed = vec!["localhost".to_string(), "127.0.0.1".to_string()];
        assert!(validate_host(&header_map(&[("host", "localhost:8080")]), &allowed));
        assert!(validate_host(&header_map(&[("host", "127.0.0.1")]), &allowed));
        assert!(!validate_host(
            &header_map(&[("host", "evil.example.com")]),
            &allowed
        ));
        assert!(!validate_host(&header_map(&[]), &allowed));
    }

    #[test]
    fn ipv6_host_parsing() {
        let allowed = vec!["[::1]".to_string()];
        assert!(validate_host(&header_map(&[("host", "[::1]:8080")]), &allowed));
        assert!(validate_host(&header_map(&[("host", "[::1]")]), &allowed));
    }

    #[test]
    fn origin_check() {
        let allowed = vec!["http://localhost".to_string()];
        assert!(validate_origin(
            &header_map(&[("origin", "http://localhost:3000")]),
            &allowed
        ));
        assert!(!validate_origin(
            &header_map(&[("origin", "http://evil.example.com")]),
            &allowed
        ));
        // Non-browser clients send no Origin.
        assert!(validate_origin(&header_map(&[]), &allowed));
        // Wildcard.
        assert!(validate_origin(
            &header_map(&[("origin", "https://anything")]),
            &["*".to_string()]
        ));
    }

    #[test]
    fn protocol_version_header_check() {
        assert!(validate_protocol_version_header(&header_map(&[])).is_ok());
        assert!(validate_protocol_version_header(&header_map(&[(
            "mcp-protocol-version",
            "2025-06-18"
        )]))
        .is_ok());
        assert!(validate_protocol_version_header(&header_map(&[(
            "mcp-protocol-version",
            "1999-01-01"
        )]))
        .is_err());
    }
}
