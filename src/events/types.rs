//! Telemetry event types
//!
//! A telemetry event is a named notification from the vehicle with an
//! optional key-value payload. Two structural events mark the top-level
//! connect/disconnect transitions and are exempt from coalescing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event name emitted when the vehicle connection is established
pub const EVENT_CONNECTED: &str = "connected";

/// Event name emitted when the vehicle connection is lost
pub const EVENT_DISCONNECTED: &str = "disconnected";

/// Whether an event name denotes a structural connect/disconnect transition
///
/// Structural events are forwarded immediately and never buffered.
pub fn is_structural(name: &str) -> bool {
    name == EVENT_CONNECTED || name == EVENT_DISCONNECTED
}

/// A named telemetry event with an optional opaque payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `attitude`, `battery`, `connected`
    pub name: String,

    /// Latest payload for this event, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl TelemetryEvent {
    /// Create a new event
    pub fn new(name: impl Into<String>, payload: Option<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Whether this is a structural connect/disconnect event
    pub fn is_structural(&self) -> bool {
        is_structural(&self.name)
    }
}

/// A timestamped event entry for session log persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp at which the event was forwarded
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: TelemetryEvent,
}

impl LogEntry {
    /// Create a new log entry with the current timestamp
    pub fn new(event: TelemetryEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Connection-state notification delivered to registered observers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiEvent {
    /// The tower/session layer is connected and usable
    Connected,
    /// The tower/session layer is gone
    Disconnected,
}
