//! Debounced notification emission.
//!
//! List-changed notifications are noisy during bulk registration;
//! within the debounce window, repeated emits of the same method
//! coalesce into one notification carrying the latest params.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

use portico_mcp_core::protocol::JsonRpcMessage;

pub(crate) type OutboundSender = tokio::sync::mpsc::UnboundedSender<crate::endpoint::Outbound>;

pub struct Debouncer {
    window: Duration,
    pending: Mutex<HashMap<String, Option<Value>>>,
    outbound: OutboundSender,
}

impl Debouncer {
    pub(crate) fn new(window: Duration, outbound: OutboundSender) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    /// Schedule `method` for emission after the window. A second call
    /// for the same method within the window replaces the params and
    /// does not reschedule.
    pub async fn emit(self: &Arc<Self>, method: &str, params: Option<Value>) {
        let mut pending = self.pending.lock().await;
        if pending.contains_key(method) {
            pending.insert(method.to_string(), params);
            trace!(method, "debounced emit coalesced");
            return;
        }
        pending.insert(method.to_string(), params);
        drop(pending);

        let debouncer = Arc::clone(self);
        let method = method.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(debouncer.window).await;
            let params = debouncer.pending.lock().await.remove(&method).flatten();
            trace!(method = %method, "debounced notification flushed");
            let _ = debouncer
                .outbound
                .send(crate::endpoint::Outbound::Message(
                    JsonRpcMessage::notification(method, params),
                ));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Outbound;

    #[tokio::test]
    async fn coalesces_within_window() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(30), tx));

        for _ in 0..5 {
            debouncer
                .emit("notifications/tools/list_changed", None)
                .await;
        }

        let first = tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match first {
            Outbound::Message(message) => {
                assert_eq!(message.method(), Some("notifications/tools/list_changed"));
            }
            Outbound::Close => panic!("unexpected close"),
        }
        // Nothing else within the window.
        let second = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(second.is_err(), "five emits must coalesce to one");
    }

    #[tokio::test]
    async fn distinct_methods_do_not_coalesce() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(10), tx));

        debouncer
            .emit("notifications/tools/list_changed", None)
            .await;
        debouncer
            .emit("notifications/prompts/list_changed", None)
            .await;

        let mut methods = Vec::new();
        for _ in 0..2 {
            if let Some(Outbound::Message(m)) =
                tokio::time::timeout(Duration::from_millis(200), rx.recv())
                    .await
                    .unwrap()
            {
                methods.push(m.method().unwrap_or_default().to_string());
            }
        }
        methods.sort();
        assert_eq!(
            methods,
            vec![
                "notifications/prompts/list_changed".to_string(),
                "notifications/tools/list_changed".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn emits_again_after_window() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(10), tx));

        debouncer.emit("m", None).await;
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .is_some());

        debouncer.emit("m", None).await;
        assert!(tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .is_some());
    }
}
