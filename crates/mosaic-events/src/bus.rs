//! Event bus for broadcasting load reports to subscribers.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::event::MosaicEvent;

/// Default channel capacity for the event bus.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast bus carrying [`MosaicEvent`]s to all subscribers.
///
/// Events are delivered asynchronously and in publish order. Cloning
/// the bus shares the underlying channel, so a clone handed to a tile
/// API or the debug bridge publishes into the same stream.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<MosaicEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with an explicit channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Publish an event, returning the number of receivers it reached.
    ///
    /// Publishing with no subscribers is fine; the event is dropped.
    pub fn publish(&self, event: MosaicEvent) -> usize {
        trace!(event_type = %event.event_type(), "Publishing event");
        match self.sender.send(Arc::new(event)) {
            Ok(count) => count,
            Err(_) => {
                // No receivers.
                0
            },
        }
    }

    /// Subscribe to all events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Channel capacity this bus was created with.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            capacity: self.capacity,
        }
    }
}

/// Receiver half of the bus.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Arc<MosaicEvent>>,
}

impl EventReceiver {
    /// Receive the next event.
    ///
    /// Returns `None` when the bus is closed. A lagged receiver skips
    /// the overwritten events and continues from the oldest retained
    /// one.
    pub async fn recv(&mut self) -> Option<Arc<MosaicEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "Event receiver lagged, skipping");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain without waiting: the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<MosaicEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    debug!(missed, "Event receiver lagged, skipping");
                },
                Err(_) => return None,
            }
        }
    }
}
