//! Simulated tower and vehicle links
//!
//! A software-in-the-loop stand-in for the external vehicle library: connect
//! requests are acknowledged asynchronously through the same [`LinkEvents`]
//! path a hardware transport would use, so the daemon and the tests exercise
//! the full coordinator state machine without any hardware attached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::coordinator::LinkEvents;
use crate::events::{EVENT_CONNECTED, EVENT_DISCONNECTED, TelemetryEvent};
use crate::link::{CommandOutcome, ConnectionParams, LinkError, TowerLink, VehicleLink};

/// Delay before a simulated vehicle reports connected
const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(25);

/// Simulated tower/session layer
#[derive(Default)]
pub struct SimTower {
    connected: Arc<AtomicBool>,
    requested: bool,
}

impl SimTower {
    /// Create a disconnected simulated tower
    pub fn new() -> Self {
        Self::default()
    }
}

impl TowerLink for SimTower {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn connect(&mut self, events: LinkEvents) -> Result<(), LinkError> {
        if self.requested {
            return Err(LinkError::AlreadyConnecting);
        }
        debug!("SimTower: connect requested");
        self.requested = true;
        let connected = self.connected.clone();
        tokio::spawn(async move {
            connected.store(true, Ordering::Release);
            let _ = events.tower_connected().await;
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        debug!("SimTower: disconnect");
        self.connected.store(false, Ordering::Release);
        self.requested = false;
    }

    fn register_vehicle(&mut self) {
        debug!("SimTower: vehicle registered");
    }

    fn unregister_vehicle(&mut self) {
        debug!("SimTower: vehicle unregistered");
    }
}

/// Simulated vehicle handle
pub struct SimVehicle {
    connected: Arc<AtomicBool>,
    params: Option<ConnectionParams>,
    listener: Option<LinkEvents>,
    connect_delay: Duration,
    heartbeat: Option<Duration>,
}

impl SimVehicle {
    /// Create a disconnected simulated vehicle
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            params: None,
            listener: None,
            connect_delay: DEFAULT_CONNECT_DELAY,
            heartbeat: None,
        }
    }

    /// Emit simulated attitude/battery telemetry at the given period while connected
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat = Some(period);
        self
    }
}

impl Default for SimVehicle {
    fn default() -> Self {
        Self::new()
    }
}

impl VehicleLink for SimVehicle {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn active_params(&self) -> Option<&ConnectionParams> {
        self.params.as_ref()
    }

    fn connect(&mut self, params: &ConnectionParams, events: LinkEvents) -> Result<(), LinkError> {
        debug!(%params, "SimVehicle: connect requested");
        self.params = Some(params.clone());
        self.listener = Some(events.clone());

        let connected = self.connected.clone();
        let delay = self.connect_delay;
        let heartbeat = self.heartbeat;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            connected.store(true, Ordering::Release);
            if events
                .vehicle_event(TelemetryEvent::new(EVENT_CONNECTED, None))
                .await
                .is_err()
            {
                return;
            }

            let Some(period) = heartbeat else { return };
            let mut seq: u64 = 0;
            while connected.load(Ordering::Acquire) {
                tokio::time::sleep(period).await;
                seq += 1;
                let attitude = TelemetryEvent::new(
                    "attitude",
                    Some(serde_json::json!({"seq": seq, "yaw": (seq % 360) as f64})),
                );
                if events.vehicle_event(attitude).await.is_err() {
                    break;
                }
                if seq % 10 == 0 {
                    let battery = TelemetryEvent::new(
                        "battery",
                        Some(serde_json::json!({"remaining": 100 - (seq / 10).min(100)})),
                    );
                    if events.vehicle_event(battery).await.is_err() {
                        break;
                    }
                }
            }
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        if !self.is_connected() {
            return;
        }
        debug!("SimVehicle: disconnect");
        self.connected.store(false, Ordering::Release);
        self.params = None;
        if let Some(events) = self.listener.clone() {
            tokio::spawn(async move {
                let _ = events
                    .vehicle_event(TelemetryEvent::new(EVENT_DISCONNECTED, None))
                    .await;
            });
        }
    }

    fn attach_listener(&mut self, events: LinkEvents) {
        self.listener = Some(events);
    }

    fn detach_listener(&mut self) {
        self.listener = None;
    }

    fn set_auto_return(&mut self, enabled: bool) {
        debug!(enabled, "SimVehicle: auto-return command");
        if let Some(events) = self.listener.clone() {
            tokio::spawn(async move {
                let _ = events.command_outcome(enabled, CommandOutcome::Success).await;
            });
        }
    }
}
