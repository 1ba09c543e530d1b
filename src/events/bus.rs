//! Event bus - broadcast channel for forwarded telemetry events
//!
//! The coordinator publishes forwarded events here; any number of consumers
//! (IPC subscribers, the session logger, in-process listeners) subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::TelemetryEvent;

/// Default channel capacity (events)
///
/// Forwarding is bounded by the flush period, so this covers many seconds of
/// slow consumers before anyone lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast bus for forwarded telemetry events
pub struct EventBus {
    tx: broadcast::Sender<TelemetryEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Forward an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped, and a full
    /// channel drops the oldest events for lagging receivers.
    pub fn emit(&self, event: TelemetryEvent) {
        debug!(name = %event.name, "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events forwarded after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
