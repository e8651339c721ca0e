//! Streamable HTTP client transport.
//!
//! `send` POSTs messages to the server, echoing the `Mcp-Session-Id`
//! issued on the first response. A background task keeps the GET SSE
//! stream open for server-to-client messages, reconnecting with
//! `Last-Event-ID` after drops; when the server signals `events-gone`,
//! the resume position resets and higher layers re-establish state via
//! fresh requests.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace, warn};

use portico_mcp_core::protocol::constants::{
    LAST_EVENT_ID_HEADER, SESSION_ID_HEADER,
};
use portico_mcp_core::protocol::JsonRpcMessage;

use super::sse::SseParser;
use crate::{Result, Transport, TransportError};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Full URL of the MCP endpoint, e.g. `http://127.0.0.1:8080/mcp`.
    pub base_url: String,
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(1),
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// Streamable HTTP transport, client side.
pub struct HttpClientTransport {
    http: reqwest::Client,
    config: HttpClientConfig,
    session_id: Arc<RwLock<Option<String>>>,
    last_event_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    inbound_tx: mpsc::UnboundedSender<JsonRpcMessage>,
    inbound_rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
    sse_task: Option<tokio::task::JoinHandle<()>>,
}

impl HttpClientTransport {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed {
                message: e.to_string(),
            })?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Ok(Self {
            http,
            config,
            session_id: Arc::new(RwLock::new(None)),
            last_event_id: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            inbound_tx,
            inbound_rx,
            sse_task: None,
        })
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    fn spawn_sse_loop(&mut self) {
        if self.sse_task.is_some() {
            return;
        }
        // The event stream never times out as a whole; only connects do.
        let http = match reqwest::Client::builder()
            .connect_timeout(self.config.request_timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "failed to build SSE client, staying POST-only");
                return;
            }
        };
        let config = self.config.clone();
        let session_id = self.session_id.clone();
        let last_event_id = self.last_event_id.clone();
        let closed = self.closed.clone();
        let inbound = self.inbound_tx.clone();

        self.sse_task = Some(tokio::spawn(async move {
            while !closed.load(Ordering::SeqCst) {
                let Some(current_session) = session_id.read().await.clone() else {
                    tokio::time::sleep(config.reconnect_delay).await;
                    continue;
                };

                let mut request = http
                    .get(&config.base_url)
                    .header(ACCEPT, "text/event-stream")
                    .header(SESSION_ID_HEADER, &current_session);
                if let Some(token) = &config.auth_token {
                    request = request.header(AUTHORIZATION, format!("Bearer {token}"));
                }
                let resume_from = last_event_id.load(Ordering::SeqCst);
                if resume_from > 0 {
                    request = request.header(LAST_EVENT_ID_HEADER, resume_from.to_string());
                }

                let response = match request.send().await {
                    Ok(response) if response.status().is_success() => response,
                    Ok(response) => {
                        warn!(status = %response.status(), "SSE connect rejected");
                        tokio::time::sleep(config.reconnect_delay).await;
                        continue;
                    }
                    Err(e) => {
                        debug!(error = %e, "SSE connect failed, retrying");
                        tokio::time::sleep(config.reconnect_delay).await;
                        continue;
                    }
                };

                debug!(resume_from, "SSE stream connected");
                let mut parser = SseParser::new();
                let mut stream = response.bytes_stream();
                'stream: while let Some(chunk) = stream.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            debug!(error = %e, "SSE stream broke");
                            break 'stream;
                        }
                    };
                    for frame in parser.feed(&chunk) {
                        if frame.event.as_deref() == Some("events-gone") {
                            // The replay window no longer covers our
                            // position; resync from live and let the
                            // protocol layer refresh its state.
                            warn!("server dropped our replay position, resyncing");
                            last_event_id.store(0, Ordering::SeqCst);
                            break 'stream;
                        }
                        if let Some(id) = frame.id.as_deref().and_then(|v| v.parse::<u64>().ok()) {
                            last_event_id.store(id, Ordering::SeqCst);
                        }
                        match serde_json::from_str::<JsonRpcMessage>(&frame.data) {
                            Ok(message) => {
                                trace!("SSE message received");
                                if inbound.send(message).is_err() {
                                    return;
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping unparsable SSE event"),
                        }
                    }
                }
                if !closed.load(Ordering::SeqCst) {
                    tokio::time::sleep(config.reconnect_delay).await;
                }
            }
        }));
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }

        let body = serde_json::to_vec(&message).map_err(|e| TransportError::Serialization {
            message: e.to_string(),
        })?;

        let mut request = self
            .http
            .post(&self.config.base_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/event-stream")
            .body(body);
        if let Some(session) = self.session_id.read().await.clone() {
            request = request.header(SESSION_ID_HEADER, session);
        }
        if let Some(token) = &self.config.auth_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(|e| TransportError::SendFailed {
            message: e.to_string(),
        })?;

        if let Some(issued) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let mut session = self.session_id.write().await;
            if session.as_deref() != Some(issued) {
                debug!(session = issued, "session established");
                *session = Some(issued.to_string());
            }
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message,
            });
        }

        if status == reqwest::StatusCode::ACCEPTED {
            // Notification/batch accepted; replies arrive over SSE.
        } else {
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            if content_type.starts_with("application/json") {
                let bytes = response.bytes().await.map_err(|e| {
                    TransportError::ReceiveFailed {
                        message: e.to_string(),
                    }
                })?;
                if !bytes.is_empty() {
                    let reply: JsonRpcMessage = serde_json::from_slice(&bytes).map_err(|e| {
                        TransportError::Framing {
                            message: e.to_string(),
                        }
                    })?;
                    let _ = self.inbound_tx.send(reply);
                }
            } else if content_type.starts_with("text/event-stream") {
                // The server streams this reply; feed the frames in.
                let inbound = self.inbound_tx.clone();
                let last_event_id = self.last_event_id.clone();
                tokio::spawn(async move {
                    let mut parser = SseParser::new();
                    let mut stream = response.bytes_stream();
                    while let Some(Ok(chunk)) = stream.next().await {
                        for frame in parser.feed(&chunk) {
                            if let Some(id) =
                                frame.id.as_deref().and_then(|v| v.parse::<u64>().ok())
                            {
                                last_event_id.store(id, Ordering::SeqCst);
                            }
                            if let Ok(message) =
                                serde_json::from_str::<JsonRpcMessage>(&frame.data)
                            {
                                if inbound.send(message).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                });
            }
        }

        // Once a session exists, keep the server-to-client stream open.
        if self.session_id.read().await.is_some() {
            self.spawn_sse_loop();
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        self.inbound_rx
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.sse_task.take() {
            task.abort();
        }
        if let Some(session) = self.session_id.read().await.clone() {
            let mut request = self
                .http
                .delete(&self.config.base_url)
                .header(SESSION_ID_HEADER, session);
            if let Some(token) = &self.config.auth_token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if let Err(e) = request.send().await {
                debug!(error = %e, "session delete failed");
            }
        }
        Ok(())
    }
}
