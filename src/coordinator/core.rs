//! Connection coordinator task implementation
//!
//! One actor owns the observer set, the vehicle state machine, the pending
//! teardown timer and the telemetry flush ticker. Commands from handles and
//! callbacks from the link arrive on the same channel, so every transition
//! runs serialized on this task and the state needs no locking.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConnectionConfig};
use crate::events::{ApiEvent, EVENT_CONNECTED, EVENT_DISCONNECTED, EventBus, EventCoalescer, TelemetryEvent};
use crate::link::{CommandOutcome, LinkState, ParamError, TowerLink, VehicleLink, params_from_config};
use crate::net::NetworkAvailability;

use super::config::CoordinatorConfig;
use super::handle::{CoordinatorHandle, LinkEvents};
use super::hooks::Hooks;
use super::messages::{CoordRequest, LinkStatus, ObserverId};

/// The coordinator owning the vehicle connection lifecycle
pub struct ConnectionCoordinator {
    config: CoordinatorConfig,
    connection: ConnectionConfig,
    auto_return: bool,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    tower: Box<dyn TowerLink>,
    vehicle: Box<dyn VehicleLink>,
    bus: Arc<EventBus>,
    hooks: Hooks,
    network: NetworkAvailability,

    /// Registered observers in insertion order
    observers: Vec<(ObserverId, mpsc::UnboundedSender<ApiEvent>)>,
    /// Vehicle connection state machine
    link_state: LinkState,
    /// Pending telemetry, drained by the flush ticker
    coalescer: EventCoalescer,
    /// Deferred tower teardown, armed only while idle
    teardown: Option<Pin<Box<Sleep>>>,
    /// Flush ticker, armed only while the vehicle is connected
    dispatch: Option<Interval>,
}

impl ConnectionCoordinator {
    /// Create a coordinator over the given links
    pub fn new(
        config: &Config,
        tower: Box<dyn TowerLink>,
        vehicle: Box<dyn VehicleLink>,
        bus: Arc<EventBus>,
        hooks: Hooks,
        network: NetworkAvailability,
    ) -> Self {
        let coord_config = config.coordinator.clone();
        let (tx, rx) = mpsc::channel(coord_config.channel_buffer);
        let coalescer = EventCoalescer::with_capacity(coord_config.event_buffer_capacity);
        Self {
            config: coord_config,
            connection: config.connection.clone(),
            auto_return: config.vehicle.auto_return,
            tx,
            rx,
            tower,
            vehicle,
            bus,
            hooks,
            network,
            observers: Vec::new(),
            link_state: LinkState::Disconnected,
            coalescer,
            teardown: None,
            dispatch: None,
        }
    }

    /// Create a handle for interacting with this coordinator
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), self.bus.clone())
    }

    /// Create a link-callback sender feeding this coordinator
    pub fn link_events(&self) -> LinkEvents {
        LinkEvents::new(self.tx.clone())
    }

    /// Run the coordinator task until shutdown
    ///
    /// Consumes the coordinator; spawn it with `tokio::spawn`.
    pub async fn run(mut self) {
        info!("Connection coordinator started");

        loop {
            tokio::select! {
                req = self.rx.recv() => match req {
                    Some(CoordRequest::Shutdown) | None => break,
                    Some(req) => self.handle_request(req),
                },
                () = idle_timer(&mut self.teardown) => self.teardown_tower(),
                () = next_flush(&mut self.dispatch) => {
                    self.coalescer.flush(&self.bus);
                }
            }
        }

        info!("Connection coordinator stopped");
    }

    fn handle_request(&mut self, req: CoordRequest) {
        match req {
            CoordRequest::AddObserver { tx, reply } => {
                let id = self.add_observer(tx);
                let _ = reply.send(id);
            }
            CoordRequest::RemoveObserver { id, reply } => {
                self.remove_observer(id);
                let _ = reply.send(());
            }
            CoordRequest::Connect { reply } => {
                self.connect_vehicle();
                let _ = reply.send(());
            }
            CoordRequest::Disconnect { reply } => {
                self.disconnect_vehicle();
                let _ = reply.send(());
            }
            CoordRequest::GetStatus { reply } => {
                let _ = reply.send(self.status());
            }
            CoordRequest::TowerConnected => self.on_tower_connected(),
            CoordRequest::TowerDisconnected => self.on_tower_disconnected(),
            CoordRequest::LinkFailed { message } => (self.hooks.on_link_failure)(&message),
            CoordRequest::VehicleEvent { event } => self.on_vehicle_event(event),
            CoordRequest::CommandOutcome { enabled, outcome } => {
                self.on_command_outcome(enabled, outcome);
            }
            CoordRequest::ServiceInterrupted { message } => self.on_service_interrupted(&message),
            // Handled in run() before dispatching here
            CoordRequest::Shutdown => {}
        }
    }

    fn add_observer(&mut self, tx: mpsc::UnboundedSender<ApiEvent>) -> ObserverId {
        let id = ObserverId::new();
        debug!(%id, "add_observer");

        self.teardown = None;

        if self.tower.is_connected() {
            let _ = tx.send(ApiEvent::Connected);
        } else if let Err(e) = self.tower.connect(self.link_events()) {
            // Benign race: a request while already connecting is not a failure
            debug!(error = %e, "add_observer: tower connect request ignored");
        }

        self.observers.push((id, tx));
        id
    }

    fn remove_observer(&mut self, id: ObserverId) {
        debug!(%id, "remove_observer");

        if let Some(pos) = self.observers.iter().position(|(oid, _)| *oid == id) {
            let (_, tx) = self.observers.remove(pos);
            // Notify-then-drop: the departing observer still hears the disconnect
            if self.tower.is_connected() {
                let _ = tx.send(ApiEvent::Disconnected);
            }
        }

        self.maybe_arm_teardown();
    }

    /// Arm the deferred tower teardown when nobody needs the binding
    fn maybe_arm_teardown(&mut self) {
        if self.observers.is_empty() && !self.vehicle.is_connected() {
            debug!(delay_ms = self.config.teardown_delay_ms, "arming tower teardown");
            self.teardown = Some(Box::pin(tokio::time::sleep(self.config.teardown_delay())));
        }
    }

    fn teardown_tower(&mut self) {
        debug!("starting tower disconnect");
        self.teardown = None;
        self.tower.unregister_vehicle();
        self.tower.disconnect();
    }

    fn connect_vehicle(&mut self) {
        let params = match params_from_config(&self.connection) {
            Ok(params) => params,
            Err(ParamError::MissingBluetoothAddress) => {
                warn!("connect aborted: no bluetooth device address configured");
                (self.hooks.on_missing_device)();
                return;
            }
        };

        let mut vehicle_connected = self.vehicle.is_connected();
        if vehicle_connected && self.vehicle.active_params() != Some(&params) {
            debug!("vehicle disconnect before reconnect attempt with different parameters");
            self.vehicle.disconnect();
            self.link_state = LinkState::Disconnected;
            vehicle_connected = false;
        }

        if vehicle_connected {
            debug!("connect_vehicle: already connected with matching parameters");
            return;
        }
        if self.link_state == LinkState::Connecting {
            debug!("connect_vehicle: connect already in flight");
            return;
        }

        debug!(%params, "connecting to vehicle");
        match self.vehicle.connect(&params, self.link_events()) {
            Ok(()) => self.link_state = LinkState::Connecting,
            Err(e) => debug!(error = %e, "vehicle connect request rejected"),
        }
    }

    fn disconnect_vehicle(&mut self) {
        if self.vehicle.is_connected() {
            debug!("disconnecting from vehicle");
            self.vehicle.disconnect();
        }
    }

    fn on_tower_connected(&mut self) {
        debug!("tower connected");

        // Re-register atomically so the listener is never attached twice
        self.vehicle.detach_listener();
        self.tower.register_vehicle();
        self.vehicle.attach_listener(self.link_events());

        self.notify_observers(ApiEvent::Connected);
    }

    fn on_tower_disconnected(&mut self) {
        debug!("tower disconnected");
        self.notify_observers(ApiEvent::Disconnected);
    }

    fn notify_observers(&self, event: ApiEvent) {
        for (_, tx) in &self.observers {
            let _ = tx.send(event);
        }
    }

    fn on_vehicle_event(&mut self, event: TelemetryEvent) {
        match event.name.as_str() {
            EVENT_CONNECTED => {
                debug!("vehicle connected");
                self.teardown = None;
                self.link_state = LinkState::Connected;

                (self.hooks.on_session_start)();

                self.vehicle.set_auto_return(self.auto_return);

                self.bus.emit(event);

                let period = self.config.dispatch_period();
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.dispatch = Some(interval);
            }

            EVENT_DISCONNECTED => {
                debug!("vehicle disconnected");
                self.dispatch = None;
                self.link_state = LinkState::Disconnected;

                self.maybe_arm_teardown();

                self.bus.emit(event);
            }

            _ => {
                self.coalescer.buffer_or_forward(event, &self.bus);
            }
        }
    }

    fn on_command_outcome(&self, enabled: bool, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::Success => {
                info!("Auto return {} successfully", if enabled { "started" } else { "stopped" });
            }
            CommandOutcome::Failed(code) => {
                error!(code, "{} auto return failed", if enabled { "Starting" } else { "Stopping" });
            }
            CommandOutcome::TimedOut => {
                warn!("{} auto return timed out", if enabled { "Starting" } else { "Stopping" });
            }
        }
    }

    fn on_service_interrupted(&mut self, message: &str) {
        debug!(%message, "vehicle service interrupted");
        self.tower.unregister_vehicle();

        if !message.is_empty() {
            error!(%message, "vehicle service interrupted");
        }
    }

    fn status(&self) -> LinkStatus {
        LinkStatus {
            tower_connected: self.tower.is_connected(),
            vehicle: self.link_state,
            observers: self.observers.len(),
            teardown_pending: self.teardown.is_some(),
            network_available: self.network.is_available(),
            active_params: self.vehicle.active_params().cloned(),
        }
    }
}

/// Await the armed timer, or pend forever when disarmed
async fn idle_timer(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Await the next flush tick, or pend forever when the ticker is disarmed
async fn next_flush(slot: &mut Option<Interval>) {
    match slot.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    use crate::config::{Config, TransportConfig};
    use crate::link::{ConnectionParams, LinkError};

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        TowerConnect,
        TowerDisconnect,
        RegisterVehicle,
        UnregisterVehicle,
        VehicleConnect(String),
        VehicleDisconnect,
        AttachListener,
        DetachListener,
        SetAutoReturn(bool),
    }

    #[derive(Clone, Default)]
    struct CallLog(Arc<Mutex<Vec<Call>>>);

    impl CallLog {
        fn push(&self, call: Call) {
            self.0.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        fn count(&self, call: &Call) -> usize {
            self.0.lock().unwrap().iter().filter(|c| *c == call).count()
        }
    }

    #[derive(Clone, Default)]
    struct Flag(Arc<AtomicBool>);

    impl Flag {
        fn set(&self, value: bool) {
            self.0.store(value, Ordering::SeqCst);
        }

        fn get(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct ScriptedTower {
        connected: Flag,
        log: CallLog,
        reject_connect: bool,
    }

    impl TowerLink for ScriptedTower {
        fn is_connected(&self) -> bool {
            self.connected.get()
        }

        fn connect(&mut self, _events: LinkEvents) -> Result<(), LinkError> {
            self.log.push(Call::TowerConnect);
            if self.reject_connect {
                Err(LinkError::AlreadyConnecting)
            } else {
                Ok(())
            }
        }

        fn disconnect(&mut self) {
            self.connected.set(false);
            self.log.push(Call::TowerDisconnect);
        }

        fn register_vehicle(&mut self) {
            self.log.push(Call::RegisterVehicle);
        }

        fn unregister_vehicle(&mut self) {
            self.log.push(Call::UnregisterVehicle);
        }
    }

    struct ScriptedVehicle {
        connected: Flag,
        params: Option<ConnectionParams>,
        log: CallLog,
    }

    impl VehicleLink for ScriptedVehicle {
        fn is_connected(&self) -> bool {
            self.connected.get()
        }

        fn active_params(&self) -> Option<&ConnectionParams> {
            self.params.as_ref()
        }

        fn connect(&mut self, params: &ConnectionParams, _events: LinkEvents) -> Result<(), LinkError> {
            self.log.push(Call::VehicleConnect(params.to_string()));
            self.params = Some(params.clone());
            Ok(())
        }

        fn disconnect(&mut self) {
            self.connected.set(false);
            self.log.push(Call::VehicleDisconnect);
        }

        fn attach_listener(&mut self, _events: LinkEvents) {
            self.log.push(Call::AttachListener);
        }

        fn detach_listener(&mut self) {
            self.log.push(Call::DetachListener);
        }

        fn set_auto_return(&mut self, enabled: bool) {
            self.log.push(Call::SetAutoReturn(enabled));
        }
    }

    struct Fixture {
        coordinator: ConnectionCoordinator,
        log: CallLog,
        tower_connected: Flag,
        vehicle_connected: Flag,
        bus: Arc<EventBus>,
    }

    fn fixture_with(config: Config, vehicle_params: Option<ConnectionParams>) -> Fixture {
        let log = CallLog::default();
        let tower_connected = Flag::default();
        let vehicle_connected = Flag::default();
        let bus = Arc::new(EventBus::with_default_capacity());

        let tower = Box::new(ScriptedTower {
            connected: tower_connected.clone(),
            log: log.clone(),
            reject_connect: false,
        });
        let vehicle = Box::new(ScriptedVehicle {
            connected: vehicle_connected.clone(),
            params: vehicle_params,
            log: log.clone(),
        });

        let coordinator = ConnectionCoordinator::new(
            &config,
            tower,
            vehicle,
            bus.clone(),
            Hooks::default(),
            NetworkAvailability::new(),
        );

        Fixture {
            coordinator,
            log,
            tower_connected,
            vehicle_connected,
            bus,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Config::default(), None)
    }

    fn observer() -> (
        mpsc::UnboundedSender<ApiEvent>,
        mpsc::UnboundedReceiver<ApiEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    fn drain_api(rx: &mut mpsc::UnboundedReceiver<ApiEvent>) -> Vec<ApiEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_add_observer_notifies_only_newcomer_when_tower_connected() {
        let mut f = fixture();
        f.tower_connected.set(true);

        let (tx1, mut rx1) = observer();
        f.coordinator.add_observer(tx1);
        let (tx2, mut rx2) = observer();
        f.coordinator.add_observer(tx2);

        // The first observer got exactly one notification at registration
        assert_eq!(drain_api(&mut rx1), vec![ApiEvent::Connected]);
        assert_eq!(drain_api(&mut rx2), vec![ApiEvent::Connected]);
        assert_eq!(f.log.count(&Call::TowerConnect), 0);
    }

    #[tokio::test]
    async fn test_add_observer_requests_tower_connect_when_disconnected() {
        let mut f = fixture();

        let (tx, mut rx) = observer();
        f.coordinator.add_observer(tx);

        assert_eq!(f.log.count(&Call::TowerConnect), 1);
        assert!(drain_api(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_add_observer_ignores_tower_connect_error() {
        let mut f = fixture();
        // Swap in a tower that rejects the request
        f.coordinator.tower = Box::new(ScriptedTower {
            connected: f.tower_connected.clone(),
            log: f.log.clone(),
            reject_connect: true,
        });

        let (tx1, _rx1) = observer();
        f.coordinator.add_observer(tx1);
        let (tx2, _rx2) = observer();
        f.coordinator.add_observer(tx2);

        // Both requests issued, both rejections swallowed
        assert_eq!(f.log.count(&Call::TowerConnect), 2);
        assert_eq!(f.coordinator.observers.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_observer_notifies_departing_when_tower_connected() {
        let mut f = fixture();
        f.tower_connected.set(true);

        let (tx, mut rx) = observer();
        let id = f.coordinator.add_observer(tx);
        drain_api(&mut rx);

        f.coordinator.remove_observer(id);
        assert_eq!(drain_api(&mut rx), vec![ApiEvent::Disconnected]);
        assert!(f.coordinator.observers.is_empty());
    }

    #[tokio::test]
    async fn test_remove_observer_silent_when_tower_disconnected() {
        let mut f = fixture();

        let (tx, mut rx) = observer();
        let id = f.coordinator.add_observer(tx);
        f.coordinator.remove_observer(id);

        assert!(drain_api(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_teardown_armed_only_when_idle() {
        let mut f = fixture();

        let (tx, _rx) = observer();
        let id = f.coordinator.add_observer(tx);
        assert!(f.coordinator.teardown.is_none());

        // Last observer leaves while the vehicle is disconnected
        f.coordinator.remove_observer(id);
        assert!(f.coordinator.teardown.is_some());

        // Re-registering cancels the pending teardown
        let (tx, _rx) = observer();
        f.coordinator.add_observer(tx);
        assert!(f.coordinator.teardown.is_none());
    }

    #[tokio::test]
    async fn test_teardown_not_armed_while_vehicle_connected() {
        let mut f = fixture();
        f.vehicle_connected.set(true);

        let (tx, _rx) = observer();
        let id = f.coordinator.add_observer(tx);
        f.coordinator.remove_observer(id);

        assert!(f.coordinator.teardown.is_none());
    }

    #[tokio::test]
    async fn test_vehicle_disconnect_with_observer_does_not_arm_teardown() {
        let mut f = fixture();

        let (tx, _rx) = observer();
        f.coordinator.add_observer(tx);
        f.coordinator
            .on_vehicle_event(TelemetryEvent::new(EVENT_DISCONNECTED, None));

        assert!(f.coordinator.teardown.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_fires_after_delay() {
        let f = fixture();
        let handle = f.coordinator.handle();
        let events = f.coordinator.link_events();
        let log = f.log.clone();
        tokio::spawn(f.coordinator.run());

        // Vehicle disconnect with no observers arms the teardown
        events
            .vehicle_event(TelemetryEvent::new(EVENT_DISCONNECTED, None))
            .await
            .unwrap();
        let status = handle.status().await.unwrap();
        assert!(status.teardown_pending);

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let status = handle.status().await.unwrap();
        assert!(!status.teardown_pending);
        assert_eq!(log.count(&Call::UnregisterVehicle), 1);
        assert_eq!(log.count(&Call::TowerDisconnect), 1);
    }

    #[tokio::test]
    async fn test_vehicle_connected_event_transitions() {
        let mut config = Config::default();
        config.vehicle.auto_return = true;
        let mut f = fixture_with(config, None);
        let mut telemetry = f.bus.subscribe();

        let sessions = Arc::new(AtomicUsize::new(0));
        let counter = sessions.clone();
        f.coordinator.hooks = Hooks::default().with_session_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        f.coordinator.maybe_arm_teardown();
        assert!(f.coordinator.teardown.is_some());

        f.coordinator
            .on_vehicle_event(TelemetryEvent::new(EVENT_CONNECTED, None));

        assert_eq!(f.coordinator.link_state, LinkState::Connected);
        assert!(f.coordinator.teardown.is_none());
        assert!(f.coordinator.dispatch.is_some());
        assert_eq!(sessions.load(Ordering::SeqCst), 1);
        assert_eq!(f.log.count(&Call::SetAutoReturn(true)), 1);

        // Structural event forwarded immediately, not buffered
        assert_eq!(telemetry.try_recv().unwrap().name, EVENT_CONNECTED);
        assert!(f.coordinator.coalescer.is_empty());
    }

    #[tokio::test]
    async fn test_vehicle_disconnected_event_stops_dispatch() {
        let mut f = fixture();
        let mut telemetry = f.bus.subscribe();

        f.coordinator
            .on_vehicle_event(TelemetryEvent::new(EVENT_CONNECTED, None));
        assert!(f.coordinator.dispatch.is_some());

        f.coordinator
            .on_vehicle_event(TelemetryEvent::new(EVENT_DISCONNECTED, None));

        assert!(f.coordinator.dispatch.is_none());
        assert_eq!(f.coordinator.link_state, LinkState::Disconnected);

        let names: Vec<String> = std::iter::from_fn(|| telemetry.try_recv().ok())
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![EVENT_CONNECTED, EVENT_DISCONNECTED]);
    }

    #[tokio::test]
    async fn test_other_events_are_buffered_not_forwarded() {
        let mut f = fixture();
        let mut telemetry = f.bus.subscribe();

        f.coordinator
            .on_vehicle_event(TelemetryEvent::new("altitude", Some(json!(10))));
        f.coordinator
            .on_vehicle_event(TelemetryEvent::new("altitude", Some(json!(12))));

        assert_eq!(f.coordinator.coalescer.len(), 1);
        assert!(matches!(telemetry.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_actor_coalesces_bursts_at_flush_rate() {
        let f = fixture();
        let events = f.coordinator.link_events();
        let mut telemetry = f.bus.subscribe();
        tokio::spawn(f.coordinator.run());

        events
            .vehicle_event(TelemetryEvent::new(EVENT_CONNECTED, None))
            .await
            .unwrap();
        events
            .vehicle_event(TelemetryEvent::new("altitude", Some(json!(10))))
            .await
            .unwrap();
        events
            .vehicle_event(TelemetryEvent::new("altitude", Some(json!(12))))
            .await
            .unwrap();

        assert_eq!(telemetry.recv().await.unwrap().name, EVENT_CONNECTED);

        // One flush window later, the burst collapsed to the latest payload
        tokio::time::sleep(Duration::from_millis(250)).await;
        let flushed = telemetry.recv().await.unwrap();
        assert_eq!(flushed.name, "altitude");
        assert_eq!(flushed.payload, Some(json!(12)));
        assert!(matches!(telemetry.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_stops_after_vehicle_disconnect() {
        let f = fixture();
        let events = f.coordinator.link_events();
        let mut telemetry = f.bus.subscribe();
        tokio::spawn(f.coordinator.run());

        events
            .vehicle_event(TelemetryEvent::new(EVENT_CONNECTED, None))
            .await
            .unwrap();
        events
            .vehicle_event(TelemetryEvent::new(EVENT_DISCONNECTED, None))
            .await
            .unwrap();
        events
            .vehicle_event(TelemetryEvent::new("battery", Some(json!(50))))
            .await
            .unwrap();

        assert_eq!(telemetry.recv().await.unwrap().name, EVENT_CONNECTED);
        assert_eq!(telemetry.recv().await.unwrap().name, EVENT_DISCONNECTED);

        // No ticker runs while disconnected; the buffered event stays put
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(matches!(telemetry.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_reconnect_with_different_params_disconnects_first() {
        let config = Config::default();
        let mut f = fixture_with(config, Some(ConnectionParams::Usb { baud_rate: 57_600 }));
        f.vehicle_connected.set(true);

        f.coordinator.connect_vehicle();

        let calls = f.log.calls();
        assert_eq!(
            calls,
            vec![
                Call::VehicleDisconnect,
                Call::VehicleConnect("udp:14550".to_string()),
            ]
        );
        assert_eq!(f.coordinator.link_state, LinkState::Connecting);
    }

    #[tokio::test]
    async fn test_connect_noop_with_matching_params() {
        let active = ConnectionParams::Udp {
            server_port: 14_550,
            ping: None,
        };
        let mut f = fixture_with(Config::default(), Some(active));
        f.vehicle_connected.set(true);

        f.coordinator.connect_vehicle();

        assert_eq!(f.log.count(&Call::VehicleDisconnect), 0);
        assert!(f.log.calls().iter().all(|c| !matches!(c, Call::VehicleConnect(_))));
    }

    #[tokio::test]
    async fn test_connect_noop_while_connect_in_flight() {
        let mut f = fixture();

        f.coordinator.connect_vehicle();
        f.coordinator.connect_vehicle();

        let connects = f
            .log
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::VehicleConnect(_)))
            .count();
        assert_eq!(connects, 1);
    }

    #[tokio::test]
    async fn test_connect_bluetooth_without_address_launches_picker() {
        let mut config = Config::default();
        config.connection.transport = TransportConfig::Bluetooth { address: None };
        let mut f = fixture_with(config, None);

        let picks = Arc::new(AtomicUsize::new(0));
        let counter = picks.clone();
        f.coordinator.hooks = Hooks::default().with_missing_device(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        f.coordinator.connect_vehicle();

        assert_eq!(picks.load(Ordering::SeqCst), 1);
        assert!(f.log.calls().is_empty());
        assert_eq!(f.coordinator.link_state, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_noop_when_not_connected() {
        let mut f = fixture();
        f.coordinator.disconnect_vehicle();
        assert_eq!(f.log.count(&Call::VehicleDisconnect), 0);

        f.vehicle_connected.set(true);
        f.coordinator.disconnect_vehicle();
        assert_eq!(f.log.count(&Call::VehicleDisconnect), 1);
    }

    #[tokio::test]
    async fn test_tower_connected_reregisters_listener_and_notifies() {
        let mut f = fixture();
        f.tower_connected.set(true);

        let (tx_a, mut rx_a) = observer();
        f.coordinator.add_observer(tx_a);
        let (tx_b, mut rx_b) = observer();
        f.coordinator.add_observer(tx_b);
        drain_api(&mut rx_a);
        drain_api(&mut rx_b);
        let before = f.log.calls().len();

        f.coordinator.on_tower_connected();

        let calls = f.log.calls()[before..].to_vec();
        assert_eq!(
            calls,
            vec![Call::DetachListener, Call::RegisterVehicle, Call::AttachListener]
        );
        assert_eq!(drain_api(&mut rx_a), vec![ApiEvent::Connected]);
        assert_eq!(drain_api(&mut rx_b), vec![ApiEvent::Connected]);
    }

    #[tokio::test]
    async fn test_tower_disconnected_notifies_all() {
        let mut f = fixture();

        let (tx, mut rx) = observer();
        f.coordinator.add_observer(tx);
        f.coordinator.on_tower_disconnected();

        assert_eq!(drain_api(&mut rx), vec![ApiEvent::Disconnected]);
    }

    #[tokio::test]
    async fn test_link_failure_invokes_hook_only() {
        let mut f = fixture();

        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        f.coordinator.hooks = Hooks::default().with_link_failure(move |message| {
            sink.lock().unwrap().push(message.to_string());
        });

        f.coordinator
            .handle_request(CoordRequest::LinkFailed {
                message: "connection refused".to_string(),
            });

        assert_eq!(*messages.lock().unwrap(), vec!["connection refused".to_string()]);
        assert_eq!(f.coordinator.link_state, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_service_interrupted_unregisters_vehicle() {
        let mut f = fixture();
        f.coordinator.on_service_interrupted("binder died");
        assert_eq!(f.log.count(&Call::UnregisterVehicle), 1);
    }

    #[tokio::test]
    async fn test_command_outcomes_are_log_only() {
        let f = fixture();
        f.coordinator.on_command_outcome(true, CommandOutcome::Success);
        f.coordinator.on_command_outcome(false, CommandOutcome::Failed(3));
        f.coordinator.on_command_outcome(true, CommandOutcome::TimedOut);
        // Nothing escalated, nothing retried
        assert!(f.log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let mut f = fixture();
        f.tower_connected.set(true);

        let (tx, _rx) = observer();
        f.coordinator.add_observer(tx);

        let status = f.coordinator.status();
        assert!(status.tower_connected);
        assert_eq!(status.vehicle, LinkState::Disconnected);
        assert_eq!(status.observers, 1);
        assert!(!status.teardown_pending);
        assert!(!status.network_available);
    }

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Add,
        Remove,
        VehicleConnected,
        VehicleDisconnected,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Add),
            Just(Op::Remove),
            Just(Op::VehicleConnected),
            Just(Op::VehicleDisconnected),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // The teardown timer is armed iff the observer set is empty and the
        // vehicle is disconnected, after every operation in any order.
        #[test]
        fn prop_teardown_armed_iff_idle(ops in proptest::collection::vec(op_strategy(), 0..24)) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let result = rt.block_on(async {
                let mut f = fixture();
                let mut held = Vec::new();
                let mut receivers = Vec::new();

                for op in &ops {
                    match op {
                        Op::Add => {
                            let (tx, rx) = observer();
                            held.push(f.coordinator.add_observer(tx));
                            receivers.push(rx);
                        }
                        Op::Remove => {
                            if let Some(id) = held.pop() {
                                f.coordinator.remove_observer(id);
                            }
                        }
                        Op::VehicleConnected => {
                            f.vehicle_connected.set(true);
                            f.coordinator
                                .on_vehicle_event(TelemetryEvent::new(EVENT_CONNECTED, None));
                        }
                        Op::VehicleDisconnected => {
                            f.vehicle_connected.set(false);
                            f.coordinator
                                .on_vehicle_event(TelemetryEvent::new(EVENT_DISCONNECTED, None));
                        }
                    }

                    let idle = f.coordinator.observers.is_empty() && !f.vehicle_connected.get();
                    prop_assert_eq!(f.coordinator.teardown.is_some(), idle);
                }
                Ok(())
            });
            result?;
        }
    }
}
