//! Handshake behavior driven by a raw engine endpoint acting as the
//! client, so malformed and out-of-order flows can be exercised.

use std::sync::Arc;

use portico_mcp_core::protocol::SessionPhase;
use portico_mcp_core::types::info::ServerInfo;
use portico_mcp_engine::{Endpoint, EngineConfig, RequestOptions};
use portico_mcp_server::PorticoServer;
use portico_mcp_transport::InMemoryTransport;
use serde_json::json;

async fn raw_client_against(server: &PorticoServer) -> (Arc<Endpoint>, Endpoint) {
    let (client_side, server_side) = InMemoryTransport::pair();
    let server_endpoint = server
        .connect_session(Box::new(server_side), "raw-session")
        .await
        .unwrap();
    let client = Endpoint::new(EngineConfig::default());
    client.connect(Box::new(client_side)).await.unwrap();
    (server_endpoint, client)
}

fn initialize_params(version: &str) -> serde_json::Value {
    json!({
        "protocolVersion": version,
        "capabilities": {},
        "clientInfo": {"name": "raw", "version": "1"}
    })
}

#[tokio::test]
async fn initialize_echoes_supported_version() {
    let server = PorticoServer::new(ServerInfo::new("s", "1"));
    let (_server_endpoint, client) = raw_client_against(&server).await;

    let result = client
        .request_and_wait(
            "initialize",
            Some(initialize_params("2024-11-05")),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "s");
    assert!(result["capabilities"]["tools"]["listChanged"].as_bool().unwrap());
}

#[tokio::test]
async fn unsupported_version_answered_with_latest() {
    let server = PorticoServer::new(ServerInfo::new("s", "1"));
    let (_server_endpoint, client) = raw_client_against(&server).await;

    let result = client
        .request_and_wait(
            "initialize",
            Some(initialize_params("2030-01-01")),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        result["protocolVersion"],
        portico_mcp_core::protocol::ProtocolVersion::latest().to_string()
    );
}

#[tokio::test]
async fn requests_before_initialized_are_rejected() {
    let server = PorticoServer::new(ServerInfo::new("s", "1"));
    let (_server_endpoint, client) = raw_client_against(&server).await;

    client
        .request_and_wait(
            "initialize",
            Some(initialize_params("2025-06-18")),
            RequestOptions::default(),
        )
        .await
        .unwrap();

    // Initialized notification not sent yet: the session is not
    // operational, so listing is refused.
    client.set_phase(SessionPhase::Operational); // lift the local gate only
    let err = client
        .request_and_wait("tools/list", None, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        portico_mcp_core::error::Error::Protocol(
            portico_mcp_core::error::ProtocolError::InitializationFailed(_)
        )
    ));

    // Ping still works pre-initialized.
    client.ping().await.unwrap();
}

#[tokio::test]
async fn duplicate_initialized_notifications_are_ignored() {
    let server = PorticoServer::new(ServerInfo::new("s", "1"));
    let (server_endpoint, client) = raw_client_against(&server).await;

    client
        .request_and_wait(
            "initialize",
            Some(initialize_params("2025-06-18")),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    client.set_phase(SessionPhase::Operational);

    for _ in 0..3 {
        client
            .notify("notifications/initialized", None)
            .await
            .unwrap();
    }
    // Give the notifications time to land, then confirm the session
    // is operational and healthy.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(server_endpoint.phase(), SessionPhase::Operational);

    let result = client
        .request_and_wait("tools/list", None, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(result["tools"], json!([]));
}

#[tokio::test]
async fn second_initialize_is_rejected() {
    let server = PorticoServer::new(ServerInfo::new("s", "1"));
    let (_server_endpoint, client) = raw_client_against(&server).await;

    client
        .request_and_wait(
            "initialize",
            Some(initialize_params("2025-06-18")),
            RequestOptions::default(),
        )
        .await
        .unwrap();
    client.notify("notifications/initialized", None).await.unwrap();
    client.set_phase(SessionPhase::Operational);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let err = client
        .request_and_wait(
            "initialize",
            Some(initialize_params("2025-06-18")),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        portico_mcp_core::error::Error::Protocol(
            portico_mcp_core::error::ProtocolError::InitializationFailed(_)
        )
    ));
}

#[tokio::test]
async fn malformed_initialize_params_are_invalid_params() {
    let server = PorticoServer::new(ServerInfo::new("s", "1"));
    let (_server_endpoint, client) = raw_client_against(&server).await;

    let err = client
        .request_and_wait(
            "initialize",
            Some(json!({"protocolVersion": 42})),
            RequestOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        portico_mcp_core::error::Error::Protocol(
            portico_mcp_core::error::ProtocolError::InvalidParams(_)
        )
    ));
}
