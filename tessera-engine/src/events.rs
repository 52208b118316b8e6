//! Progress events and the sinks that receive them

use async_trait::async_trait;
use tessera_core::SegmentationResult;
use tokio::sync::mpsc;
use tracing::debug;

/// Progress of one unit of work within a request.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentationEvent {
    Start {
        request_id: String,
        algorithm: String,
    },
    Complete {
        request_id: String,
        result: SegmentationResult,
    },
    Error {
        request_id: String,
        algorithm: String,
        error: String,
    },
}

impl SegmentationEvent {
    pub fn request_id(&self) -> &str {
        match self {
            SegmentationEvent::Start { request_id, .. }
            | SegmentationEvent::Complete { request_id, .. }
            | SegmentationEvent::Error { request_id, .. } => request_id,
        }
    }
}

/// Receiver of progress events. Delivery is best-effort: an implementation
/// must not fail or block the unit that emitted the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: SegmentationEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: SegmentationEvent) {}
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SegmentationEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<SegmentationEvent>) -> Self {
        Self { tx }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SegmentationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: SegmentationEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped, discarding progress event");
        }
    }
}
