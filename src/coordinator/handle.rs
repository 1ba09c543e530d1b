//! Coordinator handles
//!
//! [`CoordinatorHandle`] is the public client interface: observer
//! registration, connect/disconnect, status, shutdown. [`LinkEvents`] is the
//! narrow callback path for link implementations; each method delivers one
//! concern onto the coordinator's serialized queue.

use std::sync::Arc;

use eyre::{Result, eyre};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use crate::events::{ApiEvent, EventBus, TelemetryEvent};
use crate::link::CommandOutcome;

use super::messages::{CoordRequest, LinkStatus, ObserverId};

/// Handle for interacting with a running coordinator
///
/// Cloneable; all operations are async and non-blocking.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordRequest>,
    bus: Arc<EventBus>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, bus: Arc<EventBus>) -> Self {
        Self { tx, bus }
    }

    /// Register an observer for connection-state notifications
    ///
    /// Returns the observer's identity and the notification receiver. If the
    /// tower is already connected the first notification arrives immediately.
    pub async fn add_observer(&self) -> Result<(ObserverId, mpsc::UnboundedReceiver<ApiEvent>)> {
        debug!("CoordinatorHandle::add_observer");
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::AddObserver {
                tx: event_tx,
                reply: reply_tx,
            })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        let id = reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))?;
        Ok((id, event_rx))
    }

    /// Remove an observer by identity
    pub async fn remove_observer(&self, id: ObserverId) -> Result<()> {
        debug!(%id, "CoordinatorHandle::remove_observer");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::RemoveObserver { id, reply: reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Connect to the vehicle using the configured parameters
    pub async fn connect(&self) -> Result<()> {
        debug!("CoordinatorHandle::connect");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::Connect { reply: reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Disconnect from the vehicle if connected
    pub async fn disconnect(&self) -> Result<()> {
        debug!("CoordinatorHandle::disconnect");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::Disconnect { reply: reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Snapshot the coordinator's state
    pub async fn status(&self) -> Result<LinkStatus> {
        debug!("CoordinatorHandle::status");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::GetStatus { reply: reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Shut the coordinator down
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// Subscribe to forwarded telemetry events
    pub fn subscribe_telemetry(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.bus.subscribe()
    }

    /// A link-callback sender feeding this coordinator
    pub fn link_events(&self) -> LinkEvents {
        LinkEvents::new(self.tx.clone())
    }
}

/// Callback sender for link implementations
///
/// Transports deliver their asynchronous callbacks through these methods;
/// each lands on the coordinator's queue and is processed in order.
#[derive(Clone)]
pub struct LinkEvents {
    tx: mpsc::Sender<CoordRequest>,
}

impl LinkEvents {
    /// Wrap a sender to the coordinator task
    pub fn new(tx: mpsc::Sender<CoordRequest>) -> Self {
        Self { tx }
    }

    async fn send(&self, req: CoordRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// The tower/session layer came up
    pub async fn tower_connected(&self) -> Result<()> {
        debug!("LinkEvents::tower_connected");
        self.send(CoordRequest::TowerConnected).await
    }

    /// The tower/session layer went away
    pub async fn tower_disconnected(&self) -> Result<()> {
        debug!("LinkEvents::tower_disconnected");
        self.send(CoordRequest::TowerDisconnected).await
    }

    /// The transport reported a link failure
    pub async fn link_failed(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        debug!(%message, "LinkEvents::link_failed");
        self.send(CoordRequest::LinkFailed { message }).await
    }

    /// A named telemetry event arrived from the vehicle
    pub async fn vehicle_event(&self, event: TelemetryEvent) -> Result<()> {
        debug!(name = %event.name, "LinkEvents::vehicle_event");
        self.send(CoordRequest::VehicleEvent { event }).await
    }

    /// Asynchronous outcome of an auto-return command
    pub async fn command_outcome(&self, enabled: bool, outcome: CommandOutcome) -> Result<()> {
        debug!(enabled, ?outcome, "LinkEvents::command_outcome");
        self.send(CoordRequest::CommandOutcome { enabled, outcome }).await
    }

    /// The vehicle service was interrupted
    pub async fn service_interrupted(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        debug!(%message, "LinkEvents::service_interrupted");
        self.send(CoordRequest::ServiceInterrupted { message }).await
    }
}
