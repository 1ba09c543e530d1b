//! GroundLink - drone ground control station link daemon
//!
//! GroundLink owns the connection between a ground station and its vehicle:
//! a single coordinator task drives the connect/disconnect lifecycle, shares
//! the link among any number of observers, and forwards telemetry to
//! subscribers at a bounded rate.
//!
//! # Core Concepts
//!
//! - **One serialized queue**: every state transition, observer notification
//!   and buffer mutation runs on the coordinator task
//! - **Lazy teardown**: the tower binding survives brief observer churn and
//!   is torn down only after a grace delay with nobody interested
//! - **Coalesced telemetry**: bursts of the same event kind collapse to the
//!   latest payload per flush window; connect/disconnect bypass the buffer
//!
//! # Modules
//!
//! - [`coordinator`] - connection lifecycle state machine and handles
//! - [`events`] - event bus, coalescer and session logger
//! - [`link`] - tower/vehicle traits, connection parameters, simulated link
//! - [`ipc`] - Unix-socket protocol between the CLI and the daemon
//! - [`config`] - YAML configuration and loading
//! - [`daemon`] - PID file and process management

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod events;
pub mod ipc;
pub mod link;
pub mod net;

// Re-export commonly used types
pub use config::{Config, ConnectionConfig, TelemetryConfig, TransportConfig, VehicleConfig};
pub use coordinator::{
    ConnectionCoordinator, CoordRequest, CoordinatorConfig, CoordinatorHandle, Hooks, LinkEvents, LinkStatus,
    ObserverId,
};
pub use events::{
    ApiEvent, EVENT_CONNECTED, EVENT_DISCONNECTED, EventBus, EventCoalescer, LogEntry, TelemetryEvent,
    TelemetryLogger, read_session_entries,
};
pub use link::{CommandOutcome, ConnectionParams, LinkError, LinkState, TowerLink, VehicleLink, params_from_config};
pub use net::NetworkAvailability;
