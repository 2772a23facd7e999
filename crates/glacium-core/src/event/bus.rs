//! Broadcast event bus for distributing `JobEvent` to multiple subscribers.
//!
//! Built on `tokio::sync::broadcast`. Events are published by the status
//! checkpoint right after the corresponding write hit the store, so a
//! subscriber never observes a transition that is not yet durable.
//! Publishing with no active subscribers is a no-op.

use glacium_types::event::JobEvent;
use tokio::sync::broadcast;

/// Default channel capacity, enough for a few thousand job transitions
/// between subscriber polls.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Multi-consumer bus for job events. Cloning shares the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a subscriber that receives all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers; dropped silently if there are none.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
