//! Engine behavior over an in-memory transport pair.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portico_mcp_core::error::Error;
use portico_mcp_core::protocol::SessionPhase;
use portico_mcp_engine::{request_handler, Endpoint, EngineConfig, RequestOptions};
use portico_mcp_transport::InMemoryTransport;
use serde_json::json;

/// Two connected endpoints, both already operational.
async fn connected_pair() -> (Endpoint, Endpoint) {
    let (left_transport, right_transport) = InMemoryTransport::pair();
    let left = Endpoint::new(EngineConfig::default());
    let right = Endpoint::new(EngineConfig::default());
    left.connect(Box::new(left_transport)).await.unwrap();
    right.connect(Box::new(right_transport)).await.unwrap();
    left.set_phase(SessionPhase::Operational);
    right.set_phase(SessionPhase::Operational);
    (left, right)
}

#[tokio::test]
async fn request_gets_exactly_one_response() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "echo",
        request_handler(|params, _ctx| async move { Ok(params.unwrap_or(json!(null))) }),
    );

    let result = client
        .request_and_wait("echo", Some(json!({"v": 7})), RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!({"v": 7}));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let (client, _server) = connected_pair().await;
    let err = client
        .request_and_wait("no/such/method", None, RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Protocol(portico_mcp_core::error::ProtocolError::MethodNotFound(_)) => {}
        other => panic!("expected MethodNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn builtin_ping_works_before_initialization() {
    let (left_transport, right_transport) = InMemoryTransport::pair();
    let client = Endpoint::new(EngineConfig::default());
    let server = Endpoint::new(EngineConfig::default());
    client.connect(Box::new(left_transport)).await.unwrap();
    server.connect(Box::new(right_transport)).await.unwrap();
    // Both sides are still Initializing; ping must pass anyway.
    let pong = client.ping().await.unwrap();
    assert_eq!(pong, json!({}));
}

#[tokio::test]
async fn non_initialize_requests_rejected_before_operational() {
    let (left_transport, right_transport) = InMemoryTransport::pair();
    let client = Endpoint::new(EngineConfig::default());
    let server = Endpoint::new(EngineConfig::default());
    client.connect(Box::new(left_transport)).await.unwrap();
    server.connect(Box::new(right_transport)).await.unwrap();

    // The engine refuses to even send a gated request pre-handshake.
    let err = client
        .request_and_wait("tools/list", None, RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Protocol(portico_mcp_core::error::ProtocolError::InvalidRequest(_)) => {}
        other => panic!("expected InvalidRequest, got {other:?}"),
    }

    // And the server side rejects one that arrives anyway.
    client.set_phase(SessionPhase::Operational);
    server.on_request(
        "tools/list",
        request_handler(|_p, _c| async { Ok(json!({"tools": []})) }),
    );
    let err = client
        .request_and_wait("tools/list", None, RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Protocol(portico_mcp_core::error::ProtocolError::InitializationFailed(_)) => {}
        other => panic!("expected InitializationFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_resolves_waiter_and_signals_handler() {
    let (client, server) = connected_pair().await;

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (cancelled_tx, cancelled_rx) = tokio::sync::oneshot::channel::<String>();
    let started_tx = std::sync::Mutex::new(Some(started_tx));
    let cancelled_tx = std::sync::Mutex::new(Some(cancelled_tx));

    server.on_request(
        "slow",
        request_handler(move |_params, mut ctx| {
            let started = started_tx.lock().unwrap().take();
            let done = cancelled_tx.lock().unwrap().take();
            async move {
                if let Some(started) = started {
                    let _ = started.send(());
                }
                ctx.cancellation.cancelled().await;
                if let Some(done) = done {
                    let _ = done.send(ctx.cancellation.reason().unwrap_or_default());
                }
                Err(portico_mcp_core::error::Error::cancelled())
            }
        }),
    );

    let handle = client
        .request("slow", Some(json!({})), RequestOptions::default())
        .await
        .unwrap();
    started_rx.await.unwrap();

    handle.cancel(Some("user".to_string())).await.unwrap();

    // Server-side cancellation signal fires with the reason.
    let reason = tokio::time::timeout(Duration::from_secs(2), cancelled_rx)
        .await
        .expect("handler was not signalled")
        .unwrap();
    assert_eq!(reason, "user");
}

#[tokio::test]
async fn cancelled_waiter_resolves_with_cancelled_and_cancel_is_idempotent() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "hang",
        request_handler(|_p, mut ctx| async move {
            ctx.cancellation.cancelled().await;
            Err(portico_mcp_core::error::Error::cancelled())
        }),
    );

    let handle = client
        .request("hang", None, RequestOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    handle.cancel(Some("first".to_string())).await.unwrap();
    // Idempotent: a second cancel is a no-op.
    handle.cancel(Some("second".to_string())).await.unwrap();

    let err = handle.await_result().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(portico_mcp_core::error::ProtocolError::Cancelled)
    ));
}

#[tokio::test]
async fn timeout_without_progress_reset() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "sleepy",
        request_handler(|_p, mut ctx| async move {
            ctx.cancellation.cancelled().await;
            Err(portico_mcp_core::error::Error::cancelled())
        }),
    );

    let err = client
        .request_and_wait(
            "sleepy",
            None,
            RequestOptions::default().with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    match err {
        Error::Protocol(portico_mcp_core::error::ProtocolError::RequestTimeout) => {}
        other => panic!("expected RequestTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn progress_resets_deadline_when_opted_in() {
    let (client, server) = connected_pair().await;
    // The handler emits progress every 40 ms, five times, then
    // completes at ~200 ms. With a 100 ms timeout that only survives
    // if progress resets the deadline.
    server.on_request(
        "working",
        request_handler(|_p, ctx| async move {
            for step in 0..5u64 {
                tokio::time::sleep(Duration::from_millis(40)).await;
                ctx.progress.send(step as f64, Some(5.0), None).await;
            }
            Ok(json!({"done": true}))
        }),
    );

    let progress_count = Arc::new(AtomicUsize::new(0));
    let seen = progress_count.clone();
    let result = client
        .request_and_wait(
            "working",
            Some(json!({})),
            RequestOptions::default()
                .with_timeout(Duration::from_millis(100))
                .reset_timeout_on_progress()
                .with_progress(move |_p| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({"done": true}));
    assert!(progress_count.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn progress_does_not_extend_without_opt_in() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "working",
        request_handler(|_p, ctx| async move {
            for step in 0..10u64 {
                tokio::time::sleep(Duration::from_millis(30)).await;
                ctx.progress.send(step as f64, Some(10.0), None).await;
            }
            Ok(json!({"done": true}))
        }),
    );

    let err = client
        .request_and_wait(
            "working",
            Some(json!({})),
            RequestOptions::default()
                .with_timeout(Duration::from_millis(80))
                .with_progress(|_p| {}),
        )
        .await
        .unwrap_err();
    match err {
        Error::Protocol(portico_mcp_core::error::ProtocolError::RequestTimeout) => {}
        other => panic!("expected RequestTimeout, got {other:?}"),
    }
}

#[tokio::test]
async fn max_total_timeout_caps_progress_extension() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "endless",
        request_handler(|_p, ctx| async move {
            loop {
                tokio::time::sleep(Duration::from_millis(25)).await;
                ctx.progress.send(1.0, None, None).await;
            }
        }),
    );

    let started = std::time::Instant::now();
    let err = client
        .request_and_wait(
            "endless",
            Some(json!({})),
            RequestOptions::default()
                .with_timeout(Duration::from_millis(60))
                .with_max_total_timeout(Duration::from_millis(200))
                .reset_timeout_on_progress()
                .with_progress(|_p| {}),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(portico_mcp_core::error::ProtocolError::RequestTimeout)
    ));
    // Progress kept arriving every 25 ms, yet the ceiling held.
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn close_fails_outstanding_requests_uniformly() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "hang",
        request_handler(|_p, mut ctx| async move {
            ctx.cancellation.cancelled().await;
            Err(portico_mcp_core::error::Error::cancelled())
        }),
    );

    let first = client
        .request("hang", None, RequestOptions::default())
        .await
        .unwrap();
    let second = client
        .request("hang", None, RequestOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    client.close().await.unwrap();

    for handle in [first, second] {
        let err = handle.await_result().await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::Protocol(portico_mcp_core::error::ProtocolError::ConnectionClosed)
            ),
            "expected ConnectionClosed, got {err:?}"
        );
    }

    // After close every API call fails with NotConnected.
    let err = client
        .request("echo", None, RequestOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(portico_mcp_core::error::ProtocolError::NotConnected)
    ));
    let err = client.notify("notifications/x", None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(portico_mcp_core::error::ProtocolError::NotConnected)
    ));
}

#[tokio::test]
async fn peer_disconnect_fails_in_flight_requests() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "hang",
        request_handler(|_p, mut ctx| async move {
            ctx.cancellation.cancelled().await;
            Err(portico_mcp_core::error::Error::cancelled())
        }),
    );
    let handle = client
        .request("hang", None, RequestOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.close().await.unwrap();

    let err = handle.await_result().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(portico_mcp_core::error::ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn notifications_preserve_order() {
    let (client, server) = connected_pair().await;
    let seen: Arc<std::sync::Mutex<Vec<i64>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    server.on_notification(
        "notifications/sequence",
        portico_mcp_engine::notification_handler(move |params| {
            let sink = sink.clone();
            async move {
                if let Some(n) = params.and_then(|p| p.get("n").and_then(|v| v.as_i64())) {
                    sink.lock().unwrap().push(n);
                }
            }
        }),
    );

    for n in 0..50i64 {
        client
            .notify("notifications/sequence", Some(json!({ "n": n })))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    let collected = seen.lock().unwrap().clone();
    assert_eq!(collected, (0..50).collect::<Vec<i64>>());
}

#[tokio::test]
async fn debounced_notifications_coalesce() {
    let (client, server) = connected_pair().await;
    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    client.on_notification(
        "notifications/tools/list_changed",
        portico_mcp_engine::notification_handler(move |_params| {
            let sink = sink.clone();
            async move {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        }),
    );

    for _ in 0..10 {
        server
            .notify_debounced("notifications/tools/list_changed", None)
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn handler_errors_become_error_responses_not_crashes() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "fails",
        request_handler(|_p, _c| async {
            Err(portico_mcp_core::error::Error::invalid_params(
                "missing field `b`",
            ))
        }),
    );

    let err = client
        .request_and_wait("fails", None, RequestOptions::default())
        .await
        .unwrap_err();
    match err {
        Error::Protocol(portico_mcp_core::error::ProtocolError::InvalidParams(message)) => {
            assert!(message.contains('b'));
        }
        other => panic!("expected InvalidParams, got {other:?}"),
    }

    // The session survives handler failures.
    server.on_request(
        "ok",
        request_handler(|_p, _c| async { Ok(json!("fine")) }),
    );
    let value = client
        .request_and_wait("ok", None, RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(value, json!("fine"));
}

#[tokio::test]
async fn responses_correlate_out_of_order() {
    let (client, server) = connected_pair().await;
    server.on_request(
        "delay",
        request_handler(|params, _c| async move {
            let ms = params
                .as_ref()
                .and_then(|p| p.get("ms"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({ "ms": ms }))
        }),
    );

    let slow = client
        .request("delay", Some(json!({"ms": 120})), RequestOptions::default())
        .await
        .unwrap();
    let fast = client
        .request("delay", Some(json!({"ms": 5})), RequestOptions::default())
        .await
        .unwrap();

    let fast_result = fast.await_result().await.unwrap();
    assert_eq!(fast_result, json!({"ms": 5}));
    let slow_result = slow.await_result().await.unwrap();
    assert_eq!(slow_result, json!({"ms": 120}));
}
