//! IPC message types for daemon communication
//!
//! Simple JSON-over-newline protocol. Each message is a single line of JSON
//! followed by `\n`.

use serde::{Deserialize, Serialize};

use crate::coordinator::LinkStatus;
use crate::events::TelemetryEvent;

/// Requests from CLI/clients to the link daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LinkRequest {
    /// Toggle the vehicle connection
    ///
    /// With `establish` absent, the daemon flips the current vehicle state.
    Toggle {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        establish: Option<bool>,
    },

    /// Snapshot the coordinator state
    Status,

    /// Ping to check if the daemon is alive
    Ping,

    /// Stream forwarded telemetry events until the client hangs up
    Subscribe,

    /// Update the shared network availability indicator
    NetworkAvailable { available: bool },

    /// Request the daemon to stop gracefully
    Shutdown,
}

/// Replies from the link daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LinkReply {
    /// Acknowledgment
    Ok,

    /// Pong response to ping
    Pong { version: String },

    /// Coordinator state snapshot
    Status { status: LinkStatus },

    /// One forwarded telemetry event (subscription stream)
    Event { event: TelemetryEvent },

    /// Error response
    Error { message: String },
}
