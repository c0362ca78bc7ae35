//! Ring driver facade and event loop.
//!
//! [`RingDriver`] is the public entry point: a handle over a spawned
//! event loop that owns the transport, the [`SessionMachine`], and the
//! [`Correlator`]. Facade methods enqueue intents; the loop serializes
//! everything (intents, transport events, deadlines) onto one task, so
//! snapshot mutations never race. Observers read the snapshot or
//! subscribe to [`DriverEvent`]s.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use colmi_types::{ConnectionState, DeviceSnapshot, PeripheralHandle};

use crate::config::DriverConfig;
use crate::correlator::{Correlator, Resolution};
use crate::error::{Error, Result};
use crate::events::{DriverEvent, EventDispatcher, EventReceiver};
use crate::frame::{CommandFrame, decode_response};
use crate::session::{SessionAction, SessionMachine};
use crate::transport::{Transport, TransportEvent, TransportEvents};

/// Capacity of the facade-to-loop intent channel.
const INTENT_CHANNEL_CAPACITY: usize = 16;

/// A facade operation forwarded to the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Search,
    StopSearch,
    Disconnect,
    FetchBattery,
    FetchDay(u8),
    FetchWeek,
}

/// Handle to a running ring driver.
///
/// Cloneable-free by design: the handle owns the loop task, and dropping
/// it (or calling [`shutdown`](Self::shutdown)) stops the loop.
///
/// # Example
///
/// ```no_run
/// use colmi_core::{DriverConfig, RingDriver};
/// use colmi_core::mock::MockTransport;
///
/// # async fn run() -> colmi_core::Result<()> {
/// let (transport, events) = MockTransport::new();
/// let driver = RingDriver::new(transport, events, DriverConfig::new("R02_5C07"))?;
/// driver.search().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RingDriver {
    intents: mpsc::Sender<Intent>,
    snapshot: Arc<RwLock<DeviceSnapshot>>,
    state: Arc<RwLock<ConnectionState>>,
    discovered: Arc<RwLock<Vec<PeripheralHandle>>>,
    events: EventDispatcher,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl RingDriver {
    /// Spawn a driver event loop over a transport and its event stream.
    ///
    /// The transport must be the same instance whose construction produced
    /// `transport_events`.
    pub fn new<T: Transport>(
        transport: T,
        transport_events: TransportEvents,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (intents_tx, intents_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);
        let snapshot = Arc::new(RwLock::new(DeviceSnapshot {
            status: "Idle".to_string(),
            ..DeviceSnapshot::default()
        }));
        let state = Arc::new(RwLock::new(ConnectionState::Idle));
        let discovered = Arc::new(RwLock::new(Vec::new()));
        let events = EventDispatcher::new(config.event_capacity);
        let cancel = CancellationToken::new();

        let event_loop = DriverLoop {
            transport,
            transport_events,
            intents: intents_rx,
            session: SessionMachine::new(config.target_name.clone()),
            correlator: Correlator::new(config.request_timeout),
            config,
            snapshot: Arc::clone(&snapshot),
            state: Arc::clone(&state),
            discovered: Arc::clone(&discovered),
            events: events.clone(),
            cancel: cancel.clone(),
            scan_deadline: None,
        };
        let task = tokio::spawn(event_loop.run());

        Ok(Self {
            intents: intents_tx,
            snapshot,
            state,
            discovered,
            events,
            cancel,
            task: Some(task),
        })
    }

    /// Begin searching for the configured ring.
    pub async fn search(&self) -> Result<()> {
        self.send(Intent::Search).await
    }

    /// Stop an in-progress search without failing the session.
    pub async fn stop_search(&self) -> Result<()> {
        self.send(Intent::StopSearch).await
    }

    /// Disconnect from the ring.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Intent::Disconnect).await
    }

    /// Request the current battery level.
    pub async fn fetch_battery(&self) -> Result<()> {
        self.send(Intent::FetchBattery).await
    }

    /// Request today's activity metrics.
    pub async fn fetch_today(&self) -> Result<()> {
        self.send(Intent::FetchDay(0)).await
    }

    /// Request activity metrics for a single day (0 = today, 1 = yesterday).
    pub async fn fetch_day(&self, day_offset: u8) -> Result<()> {
        self.send(Intent::FetchDay(day_offset)).await
    }

    /// Fetch the last seven days of activity, clearing the history first.
    pub async fn fetch_last_7_days(&self) -> Result<()> {
        self.send(Intent::FetchWeek).await
    }

    /// A copy of the current device snapshot.
    pub async fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.read().await.clone()
    }

    /// The current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Peripherals discovered during the current search.
    pub async fn discovered_peripherals(&self) -> Vec<PeripheralHandle> {
        self.discovered.read().await.clone()
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Stop the event loop and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn send(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| Error::DriverStopped)
    }
}

impl Drop for RingDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sleep until `at`, or forever when there is no deadline armed.
async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => pending().await,
    }
}

struct DriverLoop<T: Transport> {
    transport: T,
    transport_events: TransportEvents,
    intents: mpsc::Receiver<Intent>,
    session: SessionMachine,
    correlator: Correlator,
    config: DriverConfig,
    snapshot: Arc<RwLock<DeviceSnapshot>>,
    state: Arc<RwLock<ConnectionState>>,
    discovered: Arc<RwLock<Vec<PeripheralHandle>>>,
    events: EventDispatcher,
    cancel: CancellationToken,
    scan_deadline: Option<(u64, Instant)>,
}

impl<T: Transport> DriverLoop<T> {
    async fn run(mut self) {
        debug!(target_name = %self.config.target_name, "driver loop started");
        loop {
            let scan_at = self.scan_deadline.map(|(_, at)| at);
            let request_at = self.correlator.next_deadline();
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                intent = self.intents.recv() => match intent {
                    Some(intent) => self.handle_intent(intent).await,
                    None => break,
                },
                event = self.transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => {
                        warn!("transport event stream closed");
                        break;
                    }
                },
                _ = sleep_until_opt(scan_at) => self.handle_scan_deadline().await,
                _ = sleep_until_opt(request_at) => self.handle_request_deadline().await,
            }
        }
        debug!("driver loop stopped");
    }

    async fn handle_intent(&mut self, intent: Intent) {
        debug!(?intent, "intent");
        match intent {
            Intent::Search => {
                let generation = self.session.begin_search();
                self.scan_deadline = Some((generation, Instant::now() + self.config.scan_timeout));
                self.discovered.write().await.clear();
                self.set_status("Searching for device...").await;
                if let Err(err) = self.transport.start_scan().await {
                    self.scan_deadline = None;
                    self.session.force_fail(err.to_string());
                    self.report_error(err.to_string()).await;
                }
                self.sync_state().await;
            }
            Intent::StopSearch => {
                self.session.stop_search();
                self.scan_deadline = None;
                if let Err(err) = self.transport.stop_scan().await {
                    warn!(%err, "stop_scan failed");
                }
                self.sync_state().await;
            }
            Intent::Disconnect => {
                self.correlator.clear_pending();
                self.session.disconnect_requested();
                if let Err(err) = self.transport.disconnect().await {
                    warn!(%err, "disconnect failed");
                }
                {
                    let mut snapshot = self.snapshot.write().await;
                    snapshot.connected = false;
                    snapshot.status = "Disconnected".to_string();
                }
                self.sync_state().await;
            }
            Intent::FetchBattery => {
                if !self.require_ready().await {
                    return;
                }
                let frame = self.correlator.issue_battery();
                self.write_frame(frame).await;
            }
            Intent::FetchDay(day_offset) => {
                if !self.require_ready().await {
                    return;
                }
                if let Some(frame) = self.correlator.issue_day(day_offset) {
                    self.write_frame(frame).await;
                }
            }
            Intent::FetchWeek => {
                if !self.require_ready().await {
                    return;
                }
                let first = self.correlator.begin_week();
                self.snapshot.write().await.history.clear();
                self.events.send(DriverEvent::HistoryCleared);
                if let Some(frame) = first {
                    self.write_frame(frame).await;
                }
            }
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        if let TransportEvent::ValueUpdated {
            characteristic,
            value,
        } = &event
        {
            if Some(*characteristic) == self.session.notify_char() {
                self.handle_notification(value).await;
            } else {
                debug!(%characteristic, "notification on unexpected characteristic");
            }
            return;
        }

        let actions = self.session.handle_event(&event);
        for action in actions {
            self.execute(action).await;
        }
        self.sync_state().await;
    }

    async fn handle_notification(&mut self, value: &[u8]) {
        let response = match decode_response(value) {
            Ok(response) => response,
            Err(err) => {
                // Malformed frames never mutate the snapshot.
                debug!(%err, len = value.len(), "dropping malformed frame");
                return;
            }
        };

        let (resolution, next) = self.correlator.resolve(response);
        match resolution {
            Some(Resolution::Battery { percent }) => {
                info!(percent, "battery level resolved");
                {
                    let mut snapshot = self.snapshot.write().await;
                    snapshot.battery = percent;
                    snapshot.status = format!("Battery Level: {percent}%");
                }
                self.events.send(DriverEvent::BatteryUpdated { percent });
            }
            Some(Resolution::Day { sample }) => {
                info!(
                    day_offset = sample.day_offset,
                    steps = sample.steps,
                    "day resolved"
                );
                {
                    let mut snapshot = self.snapshot.write().await;
                    snapshot.history = self.correlator.history().to_vec();
                    if sample.day_offset == 0 {
                        snapshot.today = Some(sample);
                    }
                }
                self.events.send(DriverEvent::DayResolved { sample });
            }
            None => {}
        }

        if let Some(frame) = next {
            self.write_frame(frame).await;
        }
    }

    async fn execute(&mut self, action: SessionAction) {
        match action {
            SessionAction::Discovered(handle) => {
                self.discovered.write().await.push(handle.clone());
                self.events.send(DriverEvent::PeripheralDiscovered { handle });
            }
            SessionAction::Matched(handle) => {
                info!(peripheral = %handle, "target found");
                self.scan_deadline = None;
                self.set_status(format!("Found {}", handle.display_name()))
                    .await;
            }
            SessionAction::StopScan => {
                if let Err(err) = self.transport.stop_scan().await {
                    warn!(%err, "stop_scan failed");
                }
            }
            SessionAction::Connect(id) => {
                if let Err(err) = self.transport.connect(&id).await {
                    self.session.force_fail(err.to_string());
                    self.report_error(err.to_string()).await;
                }
            }
            SessionAction::DiscoverServices => {
                if let Err(err) = self.transport.discover_services().await {
                    self.session.force_fail(err.to_string());
                    self.report_error(err.to_string()).await;
                }
            }
            SessionAction::DiscoverCharacteristics(service) => {
                if let Err(err) = self.transport.discover_characteristics(service).await {
                    self.session.force_fail(err.to_string());
                    self.report_error(err.to_string()).await;
                }
            }
            SessionAction::Subscribe(characteristic) => {
                match self.transport.subscribe(characteristic).await {
                    Ok(()) => {
                        self.session.mark_ready();
                        {
                            let mut snapshot = self.snapshot.write().await;
                            snapshot.connected = true;
                            snapshot.status = "Connected".to_string();
                        }
                        self.fetch_initial_state().await;
                    }
                    Err(err) => {
                        self.session.force_fail(err.to_string());
                        self.report_error(err.to_string()).await;
                    }
                }
            }
            SessionAction::Failed(reason) => {
                self.correlator.clear_pending();
                self.scan_deadline = None;
                self.snapshot.write().await.connected = false;
                self.report_error(reason).await;
            }
            SessionAction::Disconnected => {
                self.correlator.clear_pending();
                let mut snapshot = self.snapshot.write().await;
                snapshot.connected = false;
                snapshot.status = "Disconnected".to_string();
            }
        }
    }

    /// Battery and today's steps are read as soon as the link is ready.
    async fn fetch_initial_state(&mut self) {
        let battery = self.correlator.issue_battery();
        self.write_frame(battery).await;
        if let Some(frame) = self.correlator.issue_day(0) {
            self.write_frame(frame).await;
        }
    }

    async fn handle_scan_deadline(&mut self) {
        let Some((generation, _)) = self.scan_deadline.take() else {
            return;
        };
        if !self.session.scan_timed_out(generation) {
            return;
        }
        info!(timeout = ?self.config.scan_timeout, "scan timed out");
        if let Err(err) = self.transport.stop_scan().await {
            warn!(%err, "stop_scan failed");
        }
        self.session.fail_scan("no device found");
        self.set_status("Search timed out. No device found.").await;
        self.events.send(DriverEvent::Error {
            message: Error::ScanTimeout {
                duration: self.config.scan_timeout,
            }
            .to_string(),
        });
        self.sync_state().await;
    }

    async fn handle_request_deadline(&mut self) {
        let (expired, next) = self.correlator.expire(Instant::now());
        for expiry in expired {
            warn!(kind = %expiry.kind, day_offset = ?expiry.day_offset, "request timed out");
            let status = match expiry.day_offset {
                Some(day) => format!("Steps request timed out for day {day}."),
                None => "Battery request timed out.".to_string(),
            };
            self.set_status(status).await;
            self.events.send(DriverEvent::RequestTimedOut {
                kind: expiry.kind,
                day_offset: expiry.day_offset,
            });
        }
        if let Some(frame) = next {
            self.write_frame(frame).await;
        }
    }

    async fn write_frame(&mut self, frame: CommandFrame) {
        let Some(characteristic) = self.session.write_char() else {
            self.report_error(Error::NotConnected.to_string()).await;
            return;
        };
        debug!(opcode = frame.opcode(), "writing command frame");
        if let Err(err) = self.transport.write(characteristic, frame.as_bytes()).await {
            warn!(%err, "characteristic write failed");
            self.report_error(err.to_string()).await;
        }
    }

    async fn require_ready(&mut self) -> bool {
        if self.session.state().is_ready() {
            return true;
        }
        warn!(state = %self.session.state(), "fetch requested without a ready link");
        self.report_error(Error::NotConnected.to_string()).await;
        false
    }

    async fn report_error(&mut self, message: String) {
        self.snapshot.write().await.status = message.clone();
        self.events.send(DriverEvent::Error { message });
        self.sync_state().await;
    }

    async fn set_status(&mut self, status: impl Into<String>) {
        self.snapshot.write().await.status = status.into();
    }

    async fn sync_state(&mut self) {
        let current = self.session.state().clone();
        let mut shared = self.state.write().await;
        if *shared != current {
            debug!(state = %current, "state changed");
            *shared = current.clone();
            self.events.send(DriverEvent::StateChanged { state: current });
        }
    }
}
