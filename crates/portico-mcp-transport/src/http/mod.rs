//! Streamable HTTP transport: axum server with resumable SSE, and a
//! reqwest client.

pub mod client;
pub mod server;
pub mod session;
pub mod sse;

pub use client::{HttpClientConfig, HttpClientTransport};
pub use server::{
    AuthorizationServerConfig, HttpServerConfig, HttpServerState, HttpTransportServer,
    SessionMessage,
};
pub use session::{ReplayLimits, ReplayOutcome, SessionStore, SseEvent};
