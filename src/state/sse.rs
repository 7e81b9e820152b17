use thiserror::Error;
use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Failure to hand an event to the fan-out transport.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The payload could not be serialised.
    #[error("failed to encode event payload")]
    Encode(#[from] serde_json::Error),
    /// The transport refused the event.
    #[error("publisher rejected event: {0}")]
    Rejected(String),
}

/// Out-of-band notification of committed session changes.
///
/// Implementations must not block; consumers reconcile duplicates and reordering by session id.
pub trait StatePublisher: Send + Sync {
    /// Hand `event` to subscribers.
    fn publish(&self, event: ServerEvent) -> Result<(), PublishError>;
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }
}

impl StatePublisher for SseHub {
    fn publish(&self, event: ServerEvent) -> Result<(), PublishError> {
        // Having no subscriber is not a failure.
        self.broadcast(event);
        Ok(())
    }
}
