//! Connection seam between UI surfaces and the background process

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::BusError;
use crate::protocol::{PortId, PortMessage, Request, Response};

/// UI end of a long-lived connection.
#[derive(Debug)]
pub struct Port {
    id: PortId,
    outbound: mpsc::UnboundedSender<PortMessage>,
    inbound: mpsc::UnboundedReceiver<PortMessage>,
}

impl Port {
    pub fn new(
        id: PortId,
        outbound: mpsc::UnboundedSender<PortMessage>,
        inbound: mpsc::UnboundedReceiver<PortMessage>,
    ) -> Self {
        Self {
            id,
            outbound,
            inbound,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn send(&self, message: PortMessage) -> Result<(), BusError> {
        self.outbound
            .send(message)
            .map_err(|_| BusError::Disconnected)
    }

    /// Next message from the background; `None` once the background side
    /// dropped the connection.
    pub async fn recv(&mut self) -> Option<PortMessage> {
        self.inbound.recv().await
    }
}

/// How a UI surface reaches the background.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a long-lived connection.
    async fn connect(&self) -> Result<Port, BusError>;

    /// One-shot request/response call.
    async fn send_message(&self, request: Request) -> Result<Response, BusError>;
}
