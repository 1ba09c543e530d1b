//! Message types for the connection coordinator

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::events::{ApiEvent, TelemetryEvent};
use crate::link::{CommandOutcome, ConnectionParams, LinkState};

/// Identity of a registered observer, used for removal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Allocate a fresh observer identity
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requests processed by the coordinator task
///
/// Both the public API (via [`CoordinatorHandle`](super::CoordinatorHandle))
/// and link callbacks (via [`LinkEvents`](super::LinkEvents)) arrive here, so
/// every state transition executes on the one coordinator task.
#[derive(Debug)]
pub enum CoordRequest {
    /// Register an observer for connection-state notifications
    AddObserver {
        tx: mpsc::UnboundedSender<ApiEvent>,
        reply: oneshot::Sender<ObserverId>,
    },

    /// Remove an observer by identity
    RemoveObserver {
        id: ObserverId,
        reply: oneshot::Sender<()>,
    },

    /// Connect to the vehicle using the configured parameters
    Connect { reply: oneshot::Sender<()> },

    /// Disconnect from the vehicle if connected
    Disconnect { reply: oneshot::Sender<()> },

    /// Snapshot the coordinator state
    GetStatus { reply: oneshot::Sender<LinkStatus> },

    /// The tower/session layer came up
    TowerConnected,

    /// The tower/session layer went away
    TowerDisconnected,

    /// The transport reported a link failure
    LinkFailed { message: String },

    /// A named telemetry event arrived from the vehicle
    VehicleEvent { event: TelemetryEvent },

    /// Asynchronous outcome of an auto-return command
    CommandOutcome {
        enabled: bool,
        outcome: CommandOutcome,
    },

    /// The vehicle service was interrupted out from under us
    ServiceInterrupted { message: String },

    /// Shut the coordinator down
    Shutdown,
}

/// Snapshot of the coordinator's state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkStatus {
    /// Whether the tower binding is up
    pub tower_connected: bool,

    /// Vehicle connection state
    pub vehicle: LinkState,

    /// Number of registered observers
    pub observers: usize,

    /// Whether the deferred tower teardown is armed
    pub teardown_pending: bool,

    /// Current network availability indicator
    pub network_available: bool,

    /// Parameters of the active vehicle connection, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_params: Option<ConnectionParams>,
}
