//! The bidirectional protocol engine.
//!
//! An [`Endpoint`] owns a transport and runs one I/O loop per session:
//! outbound messages are drained from a queue (serializing writes) and
//! inbound messages are dispatched by shape. Requests correlate with
//! responses through a pending-request table keyed by id; ids come
//! from a monotonic per-session counter. Each outbound request has an
//! effective deadline, optionally extended by progress notifications
//! and always capped by `max_total_timeout`. Cancellation removes
//! correlation state, notifies the peer, and signals inbound handlers
//! cooperatively; a late response for a cancelled request is dropped
//! silently.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use portico_mcp_core::error::{Error, Result as CoreResult};
use portico_mcp_core::ids::RequestIdAllocator;
use portico_mcp_core::protocol::constants::methods;
use portico_mcp_core::protocol::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    SessionPhase,
};
use portico_mcp_core::types::notifications::{
    CancelledNotification, ProgressNotification, ProgressToken, RequestMeta,
};
use portico_mcp_transport::Transport;

use crate::debounce::Debouncer;
use crate::handler::{
    cancellation_pair, CancellationSignal, NotificationHandler, Peer, ProgressSender,
    RequestContext, RequestHandler,
};

/// Engine configuration. Every instance is parameterized by its own
/// config; there is no process-wide state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub default_request_timeout: Duration,
    pub debounce_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_request_timeout: Duration::from_secs(30),
            debounce_window: Duration::from_millis(50),
        }
    }
}

/// Callback invoked for progress notifications bound to a request.
pub type ProgressCallback = Arc<dyn Fn(ProgressNotification) + Send + Sync>;

/// Per-request options.
#[derive(Default, Clone)]
pub struct RequestOptions {
    /// Deadline relative to send (engine default when `None`).
    pub timeout: Option<Duration>,
    /// Absolute ceiling that progress resets can never extend.
    pub max_total_timeout: Option<Duration>,
    /// Whether a progress notification resets the deadline.
    pub reset_timeout_on_progress: bool,
    /// Progress delivery; absent means no progress token is attached.
    pub on_progress: Option<ProgressCallback>,
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_total_timeout(mut self, max: Duration) -> Self {
        self.max_total_timeout = Some(max);
        self
    }

    pub fn reset_timeout_on_progress(mut self) -> Self {
        self.reset_timeout_on_progress = true;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressNotification) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

/// Messages queued toward the I/O loop.
#[derive(Debug)]
pub(crate) enum Outbound {
    Message(JsonRpcMessage),
    Close,
}

struct PendingRequest {
    method: String,
    sender: oneshot::Sender<CoreResult<Value>>,
    on_progress: Option<ProgressCallback>,
    progress_token: Option<ProgressToken>,
    reset_timeout_on_progress: bool,
    timeout: Duration,
    deadline: watch::Sender<Instant>,
    hard_deadline: Option<Instant>,
}

/// Completable handle for one outbound request. The dispatcher
/// completes it exactly once with one of result, error, cancelled,
/// timeout, or closed.
#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    receiver: oneshot::Receiver<CoreResult<Value>>,
    inner: Weak<EndpointInner>,
}

impl RequestHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Wait for the outcome.
    pub async fn await_result(self) -> CoreResult<Value> {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::connection_closed()),
        }
    }

    /// Cancel the request: the waiter resolves with `Cancelled`, the
    /// peer receives `notifications/cancelled`, and any late response
    /// is dropped. Cancelling twice is a no-op.
    pub async fn cancel(&self, reason: Option<String>) -> CoreResult<()> {
        match self.inner.upgrade() {
            Some(inner) => {
                inner.cancel_request(&self.id, reason).await;
                Ok(())
            }
            None => Err(Error::not_connected()),
        }
    }
}

pub struct EndpointInner {
    config: EngineConfig,
    phase: std::sync::RwLock<SessionPhase>,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<RequestId, PendingRequest>>,
    progress_index: Mutex<HashMap<ProgressToken, RequestId>>,
    inbound_requests: Mutex<HashMap<RequestId, CancellationSignal>>,
    request_handlers: std::sync::RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
    notification_handlers: std::sync::RwLock<HashMap<String, Arc<dyn NotificationHandler>>>,
    ids: RequestIdAllocator,
    debouncer: Arc<Debouncer>,
    closed: AtomicBool,
}

/// The protocol engine for one session.
pub struct Endpoint {
    inner: Arc<EndpointInner>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
    io_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Endpoint {
    pub fn new(config: EngineConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let debouncer = Arc::new(Debouncer::new(config.debounce_window, outbound.clone()));
        let inner = Arc::new(EndpointInner {
            config,
            phase: std::sync::RwLock::new(SessionPhase::Created),
            outbound,
            pending: Mutex::new(HashMap::new()),
            progress_index: Mutex::new(HashMap::new()),
            inbound_requests: Mutex::new(HashMap::new()),
            request_handlers: std::sync::RwLock::new(HashMap::new()),
            notification_handlers: std::sync::RwLock::new(HashMap::new()),
            ids: RequestIdAllocator::new(),
            debouncer,
            closed: AtomicBool::new(false),
        });
        Self {
            inner,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            io_task: Mutex::new(None),
        }
    }

    /// Register a request handler. Later registrations replace earlier
    /// ones for the same method.
    pub fn on_request(&self, method: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        if let Ok(mut handlers) = self.inner.request_handlers.write() {
            handlers.insert(method.into(), handler);
        }
    }

    /// Register a notification handler.
    pub fn on_notification(&self, method: impl Into<String>, handler: Arc<dyn NotificationHandler>) {
        if let Ok(mut handlers) = self.inner.notification_handlers.write() {
            handlers.insert(method.into(), handler);
        }
    }

    /// Attach the transport and start the I/O loop.
    pub async fn connect(&self, transport: Box<dyn Transport>) -> CoreResult<()> {
        let receiver = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::invalid_request("endpoint already connected"))?;
        self.inner.set_phase(SessionPhase::Connecting);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(io_loop(inner, transport, receiver));
        *self.io_task.lock().await = Some(task);
        self.inner.set_phase(SessionPhase::Initializing);
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.phase()
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.inner.set_phase(phase);
    }

    /// Handle for talking to the peer from handlers and helpers.
    pub fn peer(&self) -> Peer {
        Peer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Start an outbound request.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> CoreResult<RequestHandle> {
        self.inner.start_request(method, params, options).await
    }

    /// Send a request and wait for its result.
    pub async fn request_and_wait(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> CoreResult<Value> {
        self.request(method, params, options)
            .await?
            .await_result()
            .await
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> CoreResult<()> {
        self.inner.send_notification(method, params)
    }

    /// Schedule a debounced notification: emits of the same method
    /// within the window coalesce to one.
    pub async fn notify_debounced(&self, method: &str, params: Option<Value>) -> CoreResult<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::not_connected());
        }
        self.inner.debouncer.emit(method, params).await;
        Ok(())
    }

    /// Liveness probe.
    pub async fn ping(&self) -> CoreResult<Value> {
        self.request_and_wait(methods::PING, Some(serde_json::json!({})), RequestOptions::default())
            .await
    }

    /// Wait until the session's I/O loop ends (peer closed the
    /// transport or [`Endpoint::close`] was called elsewhere).
    pub async fn wait(&self) {
        let task = self.io_task.lock().await.take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Close the session: fail every outstanding request with
    /// `ConnectionClosed`, flush queued responses, close the
    /// transport. Idempotent; afterwards all calls fail with
    /// `NotConnected`.
    pub async fn close(&self) -> CoreResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("closing session");
        self.inner.set_phase(SessionPhase::Closing);
        self.inner
            .fail_all_pending(Error::connection_closed)
            .await;
        let _ = self.inner.outbound.send(Outbound::Close);
        if let Some(task) = self.io_task.lock().await.take() {
            let _ = task.await;
        }
        Ok(())
    }
}

impl EndpointInner {
    fn phase(&self) -> SessionPhase {
        self.phase
            .read()
            .map(|phase| *phase)
            .unwrap_or(SessionPhase::Closed)
    }

    fn set_phase(&self, phase: SessionPhase) {
        if let Ok(mut current) = self.phase.write() {
            trace!(?phase, "session phase transition");
            *current = phase;
        }
    }

    pub(crate) fn session_phase(&self) -> SessionPhase {
        self.phase()
    }

    pub(crate) fn set_session_phase(&self, phase: SessionPhase) {
        self.set_phase(phase);
    }

    pub(crate) async fn notify_debounced(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::not_connected());
        }
        self.debouncer.emit(method, params).await;
        Ok(())
    }

    pub(crate) fn send_notification(&self, method: &str, params: Option<Value>) -> CoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::not_connected());
        }
        self.outbound
            .send(Outbound::Message(JsonRpcMessage::notification(
                method, params,
            )))
            .map_err(|_| Error::connection_closed())
    }

    pub(crate) async fn start_request(
        self: &Arc<Self>,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> CoreResult<RequestHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::not_connected());
        }
        let phase = self.phase();
        if !phase.allows_request(method) {
            return Err(Error::invalid_request(format!(
                "'{method}' not allowed in phase {phase:?}"
            )));
        }

        let id = self.ids.next();
        let timeout = options
            .timeout
            .unwrap_or(self.config.default_request_timeout);
        let now = Instant::now();
        let hard_deadline = options.max_total_timeout.map(|max| now + max);
        let mut first_deadline = now + timeout;
        if let Some(hard) = hard_deadline {
            first_deadline = first_deadline.min(hard);
        }

        let progress_token = options
            .on_progress
            .is_some()
            .then(|| ProgressToken::String(format!("pt-{id}")));
        let params = match &progress_token {
            Some(token) => attach_progress_token(params, token),
            None => params,
        };

        let (deadline_tx, deadline_rx) = watch::channel(first_deadline);
        let (result_tx, result_rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id.clone(),
                PendingRequest {
                    method: method.to_string(),
                    sender: result_tx,
                    on_progress: options.on_progress.clone(),
                    progress_token: progress_token.clone(),
                    reset_timeout_on_progress: options.reset_timeout_on_progress,
                    timeout,
                    deadline: deadline_tx,
                    hard_deadline,
                },
            );
        }
        if let Some(token) = &progress_token {
            self.progress_index
                .lock()
                .await
                .insert(token.clone(), id.clone());
        }

        // Deadline watcher: re-arms when progress extends the
        // deadline, ends when the pending entry (and its watch
        // sender) is dropped.
        let weak = Arc::downgrade(self);
        let timer_id = id.clone();
        tokio::spawn(async move {
            let mut deadline_rx = deadline_rx;
            loop {
                let deadline = *deadline_rx.borrow();
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        if *deadline_rx.borrow() <= Instant::now() {
                            if let Some(inner) = weak.upgrade() {
                                inner.fail_request_timeout(&timer_id).await;
                            }
                            break;
                        }
                    }
                    changed = deadline_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        trace!(%id, method, "request started");
        if self
            .outbound
            .send(Outbound::Message(JsonRpcMessage::Request(
                JsonRpcRequest::new(id.clone(), method, params),
            )))
            .is_err()
        {
            self.remove_pending(&id).await;
            return Err(Error::connection_closed());
        }

        Ok(RequestHandle {
            id,
            receiver: result_rx,
            inner: Arc::downgrade(self),
        })
    }

    async fn remove_pending(&self, id: &RequestId) -> Option<PendingRequest> {
        let removed = self.pending.lock().await.remove(id);
        if let Some(pending) = &removed {
            if let Some(token) = &pending.progress_token {
                self.progress_index.lock().await.remove(token);
            }
        }
        removed
    }

    async fn fail_request_timeout(&self, id: &RequestId) {
        if let Some(pending) = self.remove_pending(id).await {
            warn!(%id, method = %pending.method, "request timed out");
            let _ = pending.sender.send(Err(Error::request_timeout()));
            self.send_cancelled_notification(id.clone(), Some("request timed out".to_string()));
        }
    }

    pub(crate) async fn cancel_request(&self, id: &RequestId, reason: Option<String>) {
        if let Some(pending) = self.remove_pending(id).await {
            debug!(%id, method = %pending.method, "request cancelled by caller");
            let _ = pending.sender.send(Err(Error::cancelled()));
            self.send_cancelled_notification(id.clone(), reason);
        }
        // Cancelling an unknown or completed request is a no-op.
    }

    fn send_cancelled_notification(&self, request_id: RequestId, reason: Option<String>) {
        let mut notification = CancelledNotification::new(request_id);
        if let Some(reason) = reason {
            notification = notification.with_reason(reason);
        }
        if let Ok(params) = serde_json::to_value(&notification) {
            let _ = self.outbound.send(Outbound::Message(
                JsonRpcMessage::notification(methods::CANCELLED, Some(params)),
            ));
        }
    }

    async fn fail_all_pending(&self, make_error: fn() -> Error) {
        let drained: Vec<(RequestId, PendingRequest)> =
            self.pending.lock().await.drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing outstanding requests");
        }
        self.progress_index.lock().await.clear();
        for (_, pending) in drained {
            let _ = pending.sender.send(Err(make_error()));
        }
        let inbound: Vec<(RequestId, CancellationSignal)> =
            self.inbound_requests.lock().await.drain().collect();
        for (_, signal) in inbound {
            signal.fire(Some("connection closed".to_string()));
        }
    }

    async fn handle_connection_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.set_phase(SessionPhase::Closed);
        self.fail_all_pending(Error::connection_closed).await;
    }

    fn peer_handle(self: &Arc<Self>) -> Peer {
        Peer {
            inner: Arc::downgrade(self),
        }
    }

    async fn dispatch(self: &Arc<Self>, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(response) => self.dispatch_response(response).await,
            JsonRpcMessage::Notification(notification) => {
                self.dispatch_notification(notification).await
            }
            JsonRpcMessage::Request(request) => self.dispatch_request(request).await,
        }
    }

    async fn dispatch_response(&self, response: JsonRpcResponse) {
        let Some(pending) = self.remove_pending(&response.id).await else {
            // Late response for a cancelled or timed-out request.
            debug!(id = %response.id, "dropping uncorrelated response");
            return;
        };
        trace!(id = %response.id, method = %pending.method, "response correlated");
        let outcome = match (response.result, response.error) {
            (_, Some(error)) => Err(Error::from(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::Protocol(
                portico_mcp_core::error::ProtocolError::InvalidResponse(
                    "response carried neither result nor error".to_string(),
                ),
            )),
        };
        let _ = pending.sender.send(outcome);
    }

    async fn dispatch_notification(self: &Arc<Self>, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::CANCELLED => self.handle_cancelled(notification.params).await,
            methods::PROGRESS => self.handle_progress(notification.params).await,
            _ => {
                let handler = self
                    .notification_handlers
                    .read()
                    .ok()
                    .and_then(|handlers| handlers.get(&notification.method).cloned());
                match handler {
                    // Awaited inline: notifications to one handler are
                    // observed in send order.
                    Some(handler) => handler.handle(notification.params).await,
                    None => {
                        debug!(method = %notification.method, "unhandled notification dropped")
                    }
                }
            }
        }
    }

    /// The peer cancelled one of its own requests that we are serving.
    async fn handle_cancelled(&self, params: Option<Value>) {
        let Some(cancelled) = params
            .and_then(|p| serde_json::from_value::<CancelledNotification>(p).ok())
        else {
            warn!("malformed cancelled notification");
            return;
        };
        let signal = self
            .inbound_requests
            .lock()
            .await
            .remove(&cancelled.request_id);
        match signal {
            Some(signal) => {
                debug!(id = %cancelled.request_id, reason = ?cancelled.reason, "inbound request cancelled");
                signal.fire(cancelled.reason);
            }
            None => {
                // Unknown or already completed; cancellation is
                // idempotent and best-effort.
                trace!(id = %cancelled.request_id, "cancellation for unknown request ignored");
            }
        }
    }

    async fn handle_progress(&self, params: Option<Value>) {
        let Some(progress) = params
            .and_then(|p| serde_json::from_value::<ProgressNotification>(p).ok())
        else {
            warn!("malformed progress notification");
            return;
        };
        let request_id = {
            let index = self.progress_index.lock().await;
            index.get(&progress.progress_token).cloned()
        };
        let Some(request_id) = request_id else {
            trace!("progress for unknown token dropped");
            return;
        };

        let callback = {
            let pending = self.pending.lock().await;
            let Some(entry) = pending.get(&request_id) else {
                return;
            };
            // Progress extends the deadline only when the request
            // opted in, and never past the hard ceiling.
            if entry.reset_timeout_on_progress {
                let mut next = Instant::now() + entry.timeout;
                if let Some(hard) = entry.hard_deadline {
                    next = next.min(hard);
                }
                let _ = entry.deadline.send(next);
                trace!(id = %request_id, "deadline reset by progress");
            }
            entry.on_progress.clone()
        };
        if let Some(callback) = callback {
            callback(progress);
        }
    }

    async fn dispatch_request(self: &Arc<Self>, request: JsonRpcRequest) {
        let phase = self.phase();
        if phase.is_closed() {
            debug!(method = %request.method, "request during shutdown dropped");
            return;
        }

        let handler = self
            .request_handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(&request.method).cloned());

        // Built-in liveness probe, available in every phase.
        if request.method == methods::PING && handler.is_none() {
            self.respond(JsonRpcResponse::success(request.id, serde_json::json!({})));
            return;
        }

        if !phase.allows_request(&request.method) {
            self.respond(JsonRpcResponse::error(
                request.id,
                JsonRpcError::from(Error::Protocol(
                    portico_mcp_core::error::ProtocolError::InitializationFailed(format!(
                        "'{}' before initialization completed",
                        request.method
                    )),
                )),
            ));
            return;
        }

        let Some(handler) = handler else {
            self.respond(JsonRpcResponse::error(
                request.id,
                JsonRpcError::method_not_found(&request.method),
            ));
            return;
        };

        // Ids must be unique among in-flight requests.
        let cancellation = {
            let mut inbound = self.inbound_requests.lock().await;
            if inbound.contains_key(&request.id) {
                drop(inbound);
                self.respond(JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_request("duplicate in-flight request id"),
                ));
                return;
            }
            let (signal, token) = cancellation_pair();
            inbound.insert(request.id.clone(), signal);
            token
        };

        let meta = RequestMeta::from_params(request.params.as_ref());
        let context = RequestContext {
            request_id: request.id.clone(),
            cancellation,
            progress: ProgressSender {
                token: meta.progress_token,
                peer: self.peer_handle(),
            },
            peer: self.peer_handle(),
        };

        let inner = Arc::clone(self);
        let id = request.id.clone();
        let method = request.method.clone();
        let params = request.params;
        tokio::spawn(async move {
            let result = handler.handle(params, context).await;
            // If cancellation removed the entry, abandon the result:
            // the canceller expects no response envelope.
            let still_tracked = inner.inbound_requests.lock().await.remove(&id).is_some();
            if !still_tracked {
                debug!(%id, method, "result of cancelled request abandoned");
                return;
            }
            let response = match result {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => {
                    debug!(%method, error = %e, "handler returned error");
                    JsonRpcResponse::error(id, JsonRpcError::from(e))
                }
            };
            inner.respond(response);
        });
    }

    fn respond(&self, response: JsonRpcResponse) {
        let _ = self
            .outbound
            .send(Outbound::Message(JsonRpcMessage::Response(response)));
    }
}

fn attach_progress_token(params: Option<Value>, token: &ProgressToken) -> Option<Value> {
    let mut object = match params {
        Some(Value::Object(map)) => map,
        None => serde_json::Map::new(),
        Some(other) => return Some(other),
    };
    let meta = object
        .entry("_meta")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(meta_map) = meta {
        if let Ok(token_value) = serde_json::to_value(token) {
            meta_map.insert("progressToken".to_string(), token_value);
        }
    }
    Some(Value::Object(object))
}

async fn io_loop(
    inner: Arc<EndpointInner>,
    mut transport: Box<dyn Transport>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    enum Io {
        Out(Option<Outbound>),
        In(portico_mcp_transport::Result<JsonRpcMessage>),
    }

    loop {
        let io = tokio::select! {
            outbound = outbound_rx.recv() => Io::Out(outbound),
            inbound = transport.receive() => Io::In(inbound),
        };
        match io {
            Io::Out(Some(Outbound::Message(message))) => {
                if let Err(e) = transport.send(message).await {
                    error!(error = %e, "send failed");
                    if e.is_fatal() {
                        break;
                    }
                }
            }
            Io::Out(Some(Outbound::Close)) | Io::Out(None) => {
                let _ = transport.close().await;
                break;
            }
            Io::In(Ok(message)) => inner.dispatch(message).await,
            Io::In(Err(e)) if !e.is_fatal() => {
                warn!(error = %e, "discarding unframeable message");
            }
            Io::In(Err(e)) => {
                debug!(error = %e, "transport closed");
                let _ = transport.close().await;
                break;
            }
        }
    }
    inner.handle_connection_closed().await;
}
