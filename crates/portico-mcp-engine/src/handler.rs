//! Handler tables and per-request context.
//!
//! The dispatcher routes inbound messages through explicit tables
//! mapping a method name to a handler record. Handlers receive a
//! [`RequestContext`] carrying the request id, a cooperative
//! cancellation token, a progress emitter bound to the caller's
//! progress token, and a [`Peer`] handle for sending messages back on
//! the same session.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;

use portico_mcp_core::error::Result as CoreResult;
use portico_mcp_core::protocol::RequestId;
use portico_mcp_core::types::notifications::ProgressToken;

/// Handles one inbound request method.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> CoreResult<Value>;
}

/// Handles one inbound notification method.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, params: Option<Value>);
}

type BoxedRequestFuture = Pin<Box<dyn Future<Output = CoreResult<Value>> + Send>>;
type BoxedNotifyFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct FnRequestHandler<F>(F);

#[async_trait]
impl<F> RequestHandler for FnRequestHandler<F>
where
    F: Fn(Option<Value>, RequestContext) -> BoxedRequestFuture + Send + Sync,
{
    async fn handle(&self, params: Option<Value>, ctx: RequestContext) -> CoreResult<Value> {
        (self.0)(params, ctx).await
    }
}

struct FnNotificationHandler<F>(F);

#[async_trait]
impl<F> NotificationHandler for FnNotificationHandler<F>
where
    F: Fn(Option<Value>) -> BoxedNotifyFuture + Send + Sync,
{
    async fn handle(&self, params: Option<Value>) {
        (self.0)(params).await
    }
}

/// Wrap an async closure as a request handler.
pub fn request_handler<F, Fut>(f: F) -> Arc<dyn RequestHandler>
where
    F: Fn(Option<Value>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CoreResult<Value>> + Send + 'static,
{
    Arc::new(FnRequestHandler(move |params, ctx| {
        Box::pin(f(params, ctx)) as BoxedRequestFuture
    }))
}

/// Wrap an async closure as a notification handler.
pub fn notification_handler<F, Fut>(f: F) -> Arc<dyn NotificationHandler>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnNotificationHandler(move |params| {
        Box::pin(f(params)) as BoxedNotifyFuture
    }))
}

/// Cooperative cancellation signal for inbound handlers. The engine
/// fires it when the caller cancels; handlers are expected to check
/// periodically or await [`CancellationToken::cancelled`].
#[derive(Debug, Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<Option<String>>,
}

/// The firing side, held by the engine.
#[derive(Debug)]
pub struct CancellationSignal {
    sender: watch::Sender<Option<String>>,
}

pub fn cancellation_pair() -> (CancellationSignal, CancellationToken) {
    let (sender, receiver) = watch::channel(None);
    (CancellationSignal { sender }, CancellationToken { receiver })
}

impl CancellationSignal {
    pub fn fire(&self, reason: Option<String>) {
        let _ = self
            .sender
            .send(Some(reason.unwrap_or_else(|| "cancelled".to_string())));
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.receiver.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.receiver.borrow().clone()
    }

    /// Resolve when cancellation fires (or the request completes and
    /// the engine drops the signal).
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        while self.receiver.changed().await.is_ok() {
            if self.is_cancelled() {
                return;
            }
        }
        // Signal dropped: request finished normally; never cancel.
        std::future::pending::<()>().await;
    }
}

/// Emits progress notifications bound to the inbound request's
/// progress token. A request without a token gets a no-op emitter.
#[derive(Clone)]
pub struct ProgressSender {
    pub(crate) token: Option<ProgressToken>,
    pub(crate) peer: Peer,
}

impl ProgressSender {
    pub fn is_wired(&self) -> bool {
        self.token.is_some()
    }

    pub async fn send(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let Some(token) = &self.token else { return };
        let params = portico_mcp_core::types::notifications::ProgressNotification {
            progress_token: token.clone(),
            progress,
            total,
            message,
        };
        let value = match serde_json::to_value(&params) {
            Ok(value) => value,
            Err(_) => return,
        };
        let _ = self
            .peer
            .notify(portico_mcp_core::protocol::methods::PROGRESS, Some(value))
            .await;
    }
}

/// Per-request context handed to inbound request handlers.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub cancellation: CancellationToken,
    pub progress: ProgressSender,
    pub peer: Peer,
}

/// Handle for talking back to the peer from handlers and helpers.
/// Holds a weak reference to the engine so sessions do not leak
/// through handler captures.
#[derive(Clone)]
pub struct Peer {
    pub(crate) inner: std::sync::Weak<crate::endpoint::EndpointInner>,
}

impl Peer {
    /// Send a notification to the peer.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> CoreResult<()> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(portico_mcp_core::error::Error::not_connected)?;
        inner.send_notification(method, params)
    }

    /// Send a notification through the debouncer: emits of the same
    /// method within the window coalesce into one.
    pub async fn notify_debounced(&self, method: &str, params: Option<Value>) -> CoreResult<()> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(portico_mcp_core::error::Error::not_connected)?;
        inner.notify_debounced(method, params).await
    }

    /// Current session phase, if the session is still alive.
    pub fn phase(&self) -> Option<portico_mcp_core::protocol::SessionPhase> {
        self.inner.upgrade().map(|inner| inner.session_phase())
    }

    /// Transition the session phase (used by the initialization
    /// handshake handlers).
    pub fn set_session_phase(&self, phase: portico_mcp_core::protocol::SessionPhase) {
        if let Some(inner) = self.inner.upgrade() {
            inner.set_session_phase(phase);
        }
    }

    /// Send a request to the peer and wait for its result.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        options: crate::endpoint::RequestOptions,
    ) -> CoreResult<Value> {
        let inner = self
            .inner
            .upgrade()
            .ok_or_else(portico_mcp_core::error::Error::not_connected)?;
        let handle = inner.start_request(method, params, options).await?;
        handle.await_result().await
    }
}
