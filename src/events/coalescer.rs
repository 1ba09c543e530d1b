//! Event coalescer - collapses telemetry bursts into a bounded-rate stream
//!
//! Vehicle libraries emit the same event kind far faster than downstream
//! consumers need. The coalescer keeps only the most recent payload per event
//! name within a flush window; the coordinator drains it at a fixed period
//! while the vehicle is connected. Structural connect/disconnect events
//! bypass the buffer entirely.

use std::collections::HashMap;

use tracing::debug;

use super::bus::EventBus;
use super::types::TelemetryEvent;

/// Capacity hint for distinct event names seen within one flush window
pub const DEFAULT_BUFFER_CAPACITY: usize = 200;

/// Insertion-ordered last-write-wins buffer of pending telemetry events
pub struct EventCoalescer {
    /// Pending events in first-seen order
    entries: Vec<TelemetryEvent>,
    /// Event name -> index into `entries`
    index: HashMap<String, usize>,
}

impl EventCoalescer {
    /// Create a coalescer sized for the given number of distinct event names
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Forward a structural event immediately, or buffer anything else
    ///
    /// Buffered events upsert by name: a burst of the same event kind
    /// collapses to its most recent payload, keeping first-seen order.
    /// Returns true when the event was forwarded rather than buffered.
    pub fn buffer_or_forward(&mut self, event: TelemetryEvent, bus: &EventBus) -> bool {
        if event.is_structural() {
            debug!(name = %event.name, "EventCoalescer: forwarding structural event");
            bus.emit(event);
            return true;
        }

        match self.index.get(&event.name) {
            Some(&pos) => self.entries[pos].payload = event.payload,
            None => {
                self.index.insert(event.name.clone(), self.entries.len());
                self.entries.push(event);
            }
        }
        false
    }

    /// Forward every pending event in first-seen order and clear the buffer
    ///
    /// Returns the number of events forwarded.
    pub fn flush(&mut self, bus: &EventBus) -> usize {
        let count = self.entries.len();
        if count > 0 {
            debug!(count, "EventCoalescer::flush");
        }
        for event in self.entries.drain(..) {
            bus.emit(event);
        }
        self.index.clear();
        count
    }

    /// Number of pending (buffered) events
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for EventCoalescer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}
