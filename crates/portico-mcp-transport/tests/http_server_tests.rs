//! Streamable HTTP server behavior against a live listener.

use std::sync::Arc;
use std::time::Duration;

use portico_mcp_core::protocol::constants::{LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};
use portico_mcp_core::protocol::{JsonRpcMessage, JsonRpcResponse};
use portico_mcp_transport::http::{
    HttpServerConfig, HttpServerState, HttpTransportServer, SessionMessage,
};

/// Start a server that answers every request with `{"ok":true}` and
/// return its base URL and shared state.
async fn start_echo_server(mut config: HttpServerConfig) -> (String, HttpServerState) {
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    let path = config.path.clone();
    let mut server = HttpTransportServer::new(config);
    let state = server.state();
    let mut incoming = server.take_incoming().unwrap();

    let responder_state = state.clone();
    tokio::spawn(async move {
        while let Some(SessionMessage {
            session_id,
            message,
        }) = incoming.recv().await
        {
            if let JsonRpcMessage::Request(request) = message {
                let response = JsonRpcResponse::success(request.id, serde_json::json!({"ok": true}));
                let _ = responder_state
                    .send(&session_id, JsonRpcMessage::Response(response))
                    .await;
            }
        }
    });

    let listener = server.bind().await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.serve_with(listener).await;
    });
    (format!("http://127.0.0.1:{}{path}", address.port()), state)
}

fn request_body(id: i64) -> serde_json::Value {
    serde_json::json!({"jsonrpc": "2.0", "id": id, "method": "ping"})
}

#[tokio::test]
async fn post_issues_session_and_returns_response() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let http = reqwest::Client::new();

    let response = http.post(&url).json(&request_body(1)).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let session = response
        .headers()
        .get(SESSION_ID_HEADER)
        .expect("first response must issue a session id")
        .to_str()
        .unwrap()
        .to_string();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["result"]["ok"], true);
    assert_eq!(body["id"], 1);

    // The echoed session id is accepted on the next request.
    let response = http
        .post(&url)
        .header(SESSION_ID_HEADER, &session)
        .json(&request_body(2))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn unknown_session_is_404_with_json_body() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let response = reqwest::Client::new()
        .post(&url)
        .header(SESSION_ID_HEADER, "no-such-session")
        .json(&request_body(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn host_mismatch_refused() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let response = reqwest::Client::new()
        .post(&url)
        .header("host", "evil.example.com")
        .json(&request_body(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn origin_mismatch_refused() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let response = reqwest::Client::new()
        .post(&url)
        .header("origin", "http://evil.example.com")
        .json(&request_body(1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn oversized_body_rejected_before_parse() {
    let mut config = HttpServerConfig::default();
    config.max_body_bytes = 1024;
    let (url, _state) = start_echo_server(config).await;

    let huge = "x".repeat(64 * 1024);
    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body(huge)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let response = reqwest::Client::new()
        .post(&url)
        .header("content-type", "application/json")
        .body("this is not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
}

#[tokio::test]
async fn notifications_are_accepted_with_202() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let response = reqwest::Client::new()
        .post(&url)
        .json(&serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert!(response.headers().get(SESSION_ID_HEADER).is_some());
}

async fn open_session(url: &str) -> (reqwest::Client, String) {
    let http = reqwest::Client::new();
    let response = http.post(url).json(&request_body(1)).send().await.unwrap();
    let session = response
        .headers()
        .get(SESSION_ID_HEADER)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    (http, session)
}

/// Collect SSE frames from a GET stream until `count` data frames
/// arrived or the timeout expires.
async fn collect_sse(
    http: &reqwest::Client,
    url: &str,
    session: &str,
    last_event_id: Option<u64>,
    count: usize,
) -> Vec<(Option<String>, Option<String>, String)> {
    use futures::StreamExt;

    let mut request = http
        .get(url)
        .header("accept", "text/event-stream")
        .header(SESSION_ID_HEADER, session);
    if let Some(id) = last_event_id {
        request = request.header(LAST_EVENT_ID_HEADER, id.to_string());
    }
    let response = request.send().await.unwrap();
    assert!(response.status().is_success());

    let mut frames = Vec::new();
    let mut stream = response.bytes_stream();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut buffer = String::new();
    while frames.len() < count {
        let chunk = tokio::select! {
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => chunk,
                _ => break,
            },
            _ = tokio::time::sleep_until(deadline) => break,
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            let mut id = None;
            let mut event = None;
            let mut data = None;
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("id: ") {
                    id = Some(value.to_string());
                } else if let Some(value) = line.strip_prefix("event: ") {
                    event = Some(value.to_string());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data = Some(value.to_string());
                }
            }
            if let Some(data) = data {
                frames.push((id, event, data));
            }
        }
    }
    frames
}

#[tokio::test]
async fn sse_replays_missed_events_in_order() {
    let (url, state) = start_echo_server(HttpServerConfig::default()).await;
    let (http, session) = open_session(&url).await;

    // Publish five events before any stream is open.
    for n in 1..=5 {
        state
            .send(
                &session,
                JsonRpcMessage::notification(
                    "notifications/test",
                    Some(serde_json::json!({ "n": n })),
                ),
            )
            .await
            .unwrap();
    }

    // Resume after event 2: exactly 3, 4, 5 replayed in order.
    let frames = collect_sse(&http, &url, &session, Some(2), 3).await;
    assert_eq!(frames.len(), 3);
    let ids: Vec<&str> = frames.iter().filter_map(|(id, _, _)| id.as_deref()).collect();
    assert_eq!(ids, vec!["3", "4", "5"]);
    for (index, (_, _, data)) in frames.iter().enumerate() {
        let message: serde_json::Value = serde_json::from_str(data).unwrap();
        assert_eq!(message["params"]["n"], (index as u64) + 3);
    }
}

#[tokio::test]
async fn sse_signals_events_gone_past_the_window() {
    let mut config = HttpServerConfig::default();
    config.replay_limits = portico_mcp_transport::http::ReplayLimits {
        max_events: 2,
        max_bytes: usize::MAX,
    };
    let (url, state) = start_echo_server(config).await;
    let (http, session) = open_session(&url).await;

    for n in 1..=6 {
        state
            .send(
                &session,
                JsonRpcMessage::notification(
                    "notifications/test",
                    Some(serde_json::json!({ "n": n })),
                ),
            )
            .await
            .unwrap();
    }

    // Events 1..=4 were evicted; resuming from 1 yields the terminal
    // events-gone frame.
    let frames = collect_sse(&http, &url, &session, Some(1), 1).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].1.as_deref(), Some("events-gone"));
}

#[tokio::test]
async fn delete_terminates_session() {
    let (url, _state) = start_echo_server(HttpServerConfig::default()).await;
    let (http, session) = open_session(&url).await;

    let response = http
        .delete(&url)
        .header(SESSION_ID_HEADER, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // The session is gone afterwards.
    let response = http
        .post(&url)
        .header(SESSION_ID_HEADER, &session)
        .json(&request_body(9))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn well_known_metadata_served_when_configured() {
    use portico_mcp_auth::ProtectedResourceMetadata;
    let mut config = HttpServerConfig::default();
    config.resource_metadata = Some(ProtectedResourceMetadata {
        resource: "https://mcp.example.com".to_string(),
        authorization_servers: vec!["https://auth.example.com".to_string()],
        scopes_supported: Some(vec!["mcp:tools/call".to_string()]),
        bearer_methods_supported: None,
        resource_documentation: None,
        additional_metadata: Default::default(),
    });
    let (url, _state) = start_echo_server(config).await;
    let base = url.trim_end_matches("/mcp");

    let response = reqwest::Client::new()
        .get(format!("{base}/.well-known/oauth-protected-resource"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["resource"], "https://mcp.example.com");
    assert_eq!(body["authorization_servers"][0], "https://auth.example.com");
}

#[tokio::test]
async fn token_endpoint_exchanges_codes_with_pkce() {
    use portico_mcp_auth::{
        generate_pkce_params, issue_auth_code, AuthorizationServerMetadata, InMemoryTokenStore,
        TokenStore,
    };
    use portico_mcp_transport::http::server::AuthorizationServerConfig;

    let store = Arc::new(InMemoryTokenStore::new());
    let pkce = generate_pkce_params();
    let code = issue_auth_code(
        "client-1",
        "https://app.example.com/cb",
        &pkce.code_challenge,
        std::collections::HashSet::from(["mcp:tools/call".to_string()]),
        chrono::Duration::minutes(5),
    );
    let code_value = code.code.clone();
    store.put_auth_code(code).await.unwrap();

    let mut config = HttpServerConfig::default();
    config.authorization_server = Some(AuthorizationServerConfig {
        store: store.clone(),
        token_ttl: chrono::Duration::minutes(30),
        metadata: AuthorizationServerMetadata {
            issuer: "https://auth.example.com".to_string(),
            authorization_endpoint: "https://auth.example.com/authorize".to_string(),
            token_endpoint: "https://auth.example.com/token".to_string(),
            jwks_uri: None,
            registration_endpoint: None,
            revocation_endpoint: None,
            scopes_supported: None,
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: None,
            token_endpoint_auth_methods_supported: None,
            code_challenge_methods_supported: Some(vec!["S256".to_string()]),
            additional_metadata: Default::default(),
        },
    });
    let (url, _state) = start_echo_server(config).await;
    let base = url.trim_end_matches("/mcp").to_string();

    let response = reqwest::Client::new()
        .post(format!("{base}/oauth/token"))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code_value.as_str()),
            ("code_verifier", pkce.code_verifier.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let access_token = body["access_token"].as_str().unwrap();
    assert_eq!(body["token_type"], "Bearer");

    // The minted token resolves in the store with the granted scopes.
    let info = store.get(access_token).await.unwrap().unwrap();
    assert!(info.scopes.contains("mcp:tools/call"));

    // Wrong verifier (new code) fails with an RFC 6749 error object.
    let pkce2 = generate_pkce_params();
    let code2 = issue_auth_code(
        "client-1",
        "https://app.example.com/cb",
        &pkce2.code_challenge,
        Default::default(),
        chrono::Duration::minutes(5),
    );
    let code2_value = code2.code.clone();
    store.put_auth_code(code2).await.unwrap();
    let response = reqwest::Client::new()
        .post(format!("{base}/oauth/token"))
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code2_value.as_str()),
            ("code_verifier", pkce.code_verifier.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn bearer_protected_endpoint() {
    use portico_mcp_auth::{scope_for_method, BearerAuth, InMemoryTokenStore, TokenInfo, TokenStore};

    let store = Arc::new(InMemoryTokenStore::new());
    store
        .put(
            TokenInfo {
                token: "good".to_string(),
                client_id: "c".to_string(),
                subject: None,
                scopes: [scope_for_method("ping")].into_iter().collect(),
                expires_at: chrono::Utc::now(),
            },
            chrono::Duration::minutes(5),
        )
        .await
        .unwrap();

    let mut config = HttpServerConfig::default();
    config.bearer = Some(Arc::new(BearerAuth::with_store(
        store,
        "https://mcp.example.com/.well-known/oauth-protected-resource",
    )));
    let (url, _state) = start_echo_server(config).await;
    let http = reqwest::Client::new();

    // No token: 401 with WWW-Authenticate pointing at the metadata.
    let response = http.post(&url).json(&request_body(1)).send().await.unwrap();
    assert_eq!(response.status(), 401);
    let challenge = response
        .headers()
        .get("www-authenticate")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.contains("oauth-protected-resource"));

    // Valid token with the right scope: accepted.
    let response = http
        .post(&url)
        .header("authorization", "Bearer good")
        .json(&request_body(2))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Valid token, unauthorized method: 403.
    let response = http
        .post(&url)
        .header("authorization", "Bearer good")
        .json(&serde_json::json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}
