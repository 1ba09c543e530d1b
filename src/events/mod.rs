//! Telemetry event plumbing
//!
//! Forwarded events flow: coordinator -> [`EventCoalescer`] -> [`EventBus`]
//! -> subscribers (IPC streams, the session logger, in-process consumers).
//! Structural connect/disconnect events skip the coalescer and reach the bus
//! immediately; everything else is delivered at the coalesced rate.

mod bus;
mod coalescer;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use coalescer::{DEFAULT_BUFFER_CAPACITY, EventCoalescer};
pub use logger::{TelemetryLogger, read_session_entries};
pub use types::{ApiEvent, EVENT_CONNECTED, EVENT_DISCONNECTED, LogEntry, TelemetryEvent, is_structural};
