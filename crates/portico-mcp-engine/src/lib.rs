//! # Portico MCP Engine
//!
//! The bidirectional JSON-RPC dispatcher at the center of an MCP
//! session: request/response correlation, notification routing,
//! progress streaming, cancellation, timeouts, debounced change
//! notifications, and graceful shutdown. Both the server and client
//! roles are built on [`Endpoint`]; they differ only in which handlers
//! they register and who drives the initialization handshake.

mod debounce;
pub mod endpoint;
pub mod handler;

pub use endpoint::{Endpoint, EngineConfig, ProgressCallback, RequestHandle, RequestOptions};
pub use handler::{
    notification_handler, request_handler, CancellationToken, NotificationHandler, Peer,
    ProgressSender, RequestContext, RequestHandler,
};
