use async_trait::async_trait;
use tokio::sync::mpsc;

use super::EventSink;
use crate::error::EmitError;
use crate::event::OutboundEvent;

/// Sends events over a bounded tokio channel.
///
/// Publishing waits for capacity, so a slow consumer slows the poller
/// rather than growing memory.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<OutboundEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<OutboundEvent>) -> Self {
        Self { sender }
    }

    /// A sink and the receiver for its events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutboundEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn publish(&self, event: OutboundEvent) -> Result<(), EmitError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| EmitError::ChannelClosed)
    }
}
