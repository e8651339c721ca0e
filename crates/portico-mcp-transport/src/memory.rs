//! In-memory transport: two joined FIFOs.

use async_trait::async_trait;
use tokio::sync::mpsc;

use portico_mcp_core::protocol::JsonRpcMessage;

use crate::{Result, Transport, TransportError};

/// One end of an in-memory transport pair.
pub struct InMemoryTransport {
    sender: Option<mpsc::UnboundedSender<JsonRpcMessage>>,
    receiver: mpsc::UnboundedReceiver<JsonRpcMessage>,
}

impl InMemoryTransport {
    /// Create two connected ends: what one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(tx_a),
                receiver: rx_b,
            },
            Self {
                sender: Some(tx_b),
                receiver: rx_a,
            },
        )
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&mut self, message: JsonRpcMessage) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?;
        sender
            .send(message)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn receive(&mut self) -> Result<JsonRpcMessage> {
        self.receiver
            .recv()
            .await
            .ok_or(TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.sender.take();
        self.receiver.close();
        Ok(())
    }
}
