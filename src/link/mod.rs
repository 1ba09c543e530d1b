//! Vehicle link abstractions
//!
//! The coordinator talks to two external collaborators through narrow traits:
//! the tower/session layer owning the service binding, and the vehicle handle
//! owning the telemetry link itself. Implementations deliver their callbacks
//! back onto the coordinator's serialized queue through [`LinkEvents`].

mod params;
pub mod sim;

pub use params::{ConnectionParams, ParamError, PingTarget, params_from_config};

use thiserror::Error;

use crate::coordinator::LinkEvents;

/// Errors surfaced by link operations
///
/// All of these are benign from the coordinator's point of view: they are
/// logged and the state machine stays where it is.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A connect was requested while one is already in progress
    #[error("connect already in progress")]
    AlreadyConnecting,

    /// The underlying transport rejected the request
    #[error("link transport error: {0}")]
    Transport(String),
}

/// Vehicle connection state as tracked by the coordinator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// No vehicle connection and none in flight
    #[default]
    Disconnected,
    /// A connect request was issued; waiting for the connected event
    Connecting,
    /// The vehicle link is up
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Outcome of an asynchronous vehicle command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command was accepted by the vehicle
    Success,
    /// The vehicle rejected the command with an error code
    Failed(i32),
    /// No response within the command deadline
    TimedOut,
}

/// The tower/session layer managing the underlying service binding
pub trait TowerLink: Send {
    /// Whether the tower binding is currently up
    fn is_connected(&self) -> bool;

    /// Request the tower binding; `events` receives the connected callback
    fn connect(&mut self, events: LinkEvents) -> Result<(), LinkError>;

    /// Tear the tower binding down
    fn disconnect(&mut self);

    /// Register the vehicle with the tower
    fn register_vehicle(&mut self);

    /// Unregister the vehicle from the tower
    fn unregister_vehicle(&mut self);
}

/// The vehicle handle owning the telemetry link
pub trait VehicleLink: Send {
    /// Whether the vehicle link is currently up
    fn is_connected(&self) -> bool;

    /// Parameters of the active connection, if any
    fn active_params(&self) -> Option<&ConnectionParams>;

    /// Open the link; `events` receives telemetry and command outcomes
    fn connect(&mut self, params: &ConnectionParams, events: LinkEvents) -> Result<(), LinkError>;

    /// Close the link
    fn disconnect(&mut self);

    /// Attach the telemetry event listener
    fn attach_listener(&mut self, events: LinkEvents);

    /// Detach the telemetry event listener
    fn detach_listener(&mut self);

    /// Enable or disable the auto-return behavior
    ///
    /// The outcome arrives asynchronously as a command-outcome event.
    fn set_auto_return(&mut self, enabled: bool);
}
