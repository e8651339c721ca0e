//! Initialization handshake types and the per-session state machine.

use crate::protocol::capabilities::{ClientCapabilities, ServerCapabilities};
use crate::types::info::{ClientInfo, ServerInfo};
use serde::{Deserialize, Serialize};

/// Session lifecycle phases.
///
/// Requests other than `initialize` and `ping` are rejected before
/// `Operational`; after `Closing` only responses to already-received
/// requests may flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Connecting,
    Initializing,
    Operational,
    Closing,
    Closed,
}

impl SessionPhase {
    pub fn is_operational(&self) -> bool {
        matches!(self, SessionPhase::Operational)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionPhase::Closing | SessionPhase::Closed)
    }

    /// Whether `method` may be dispatched in this phase.
    pub fn allows_request(&self, method: &str) -> bool {
        use crate::protocol::constants::methods;
        match self {
            SessionPhase::Operational => true,
            SessionPhase::Closing | SessionPhase::Closed => false,
            _ => matches!(method, methods::INITIALIZE | methods::PING),
        }
    }
}

/// `initialize` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    pub client_info: ClientInfo,
}

/// `initialize` response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
