//! Connection session state machine.
//!
//! [`SessionMachine`] is pure bookkeeping: it consumes
//! [`TransportEvent`]s and intent calls, updates the
//! [`ConnectionState`], and returns [`SessionAction`]s for the driver
//! loop to execute against the transport. Keeping it free of I/O and
//! timers makes every transition unit-testable without a radio.

use colmi_types::{ConnectionState, PeripheralHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::transport::{CharacteristicInfo, TransportEvent};
use crate::uuids;

/// A side effect the driver loop must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// A peripheral (any peripheral) was seen; record it for listing.
    Discovered(PeripheralHandle),
    /// The target peripheral was matched by name.
    Matched(PeripheralHandle),
    /// Stop the radio scan.
    StopScan,
    /// Connect to the peripheral with this backend id.
    Connect(String),
    /// Run service discovery on the connected peripheral.
    DiscoverServices,
    /// Run characteristic discovery on this service.
    DiscoverCharacteristics(Uuid),
    /// Subscribe to notifications on this characteristic.
    Subscribe(Uuid),
    /// The session failed with this reason.
    Failed(String),
    /// The peripheral disconnected.
    Disconnected,
}

/// Drives the state flow from scan start to a ready UART link.
///
/// Target matching is by advertised-name equality. Each search carries a
/// generation counter so a timeout armed for an old scan cannot fail a
/// newer one.
#[derive(Debug)]
pub struct SessionMachine {
    state: ConnectionState,
    target_name: String,
    discovered: Vec<PeripheralHandle>,
    matched: Option<PeripheralHandle>,
    scan_generation: u64,
    write_char: Option<Uuid>,
    notify_char: Option<Uuid>,
}

impl SessionMachine {
    /// Create a machine targeting a peripheral by advertised name.
    #[must_use]
    pub fn new(target_name: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Idle,
            target_name: target_name.into(),
            discovered: Vec::new(),
            matched: None,
            scan_generation: 0,
            write_char: None,
            notify_char: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Peripherals seen during the current search, in discovery order.
    #[must_use]
    pub fn discovered(&self) -> &[PeripheralHandle] {
        &self.discovered
    }

    /// The matched target peripheral, once found.
    #[must_use]
    pub fn matched(&self) -> Option<&PeripheralHandle> {
        self.matched.as_ref()
    }

    /// The write characteristic of the established UART link.
    #[must_use]
    pub fn write_char(&self) -> Option<Uuid> {
        self.write_char
    }

    /// The notify characteristic of the established UART link.
    #[must_use]
    pub fn notify_char(&self) -> Option<Uuid> {
        self.notify_char
    }

    /// Begin a new search, returning its generation token.
    ///
    /// Clears the previous search's discoveries and match so stale
    /// results never leak into the new one.
    pub fn begin_search(&mut self) -> u64 {
        self.discovered.clear();
        self.matched = None;
        self.write_char = None;
        self.notify_char = None;
        self.scan_generation += 1;
        self.state = ConnectionState::Scanning;
        debug!(generation = self.scan_generation, target = %self.target_name, "search started");
        self.scan_generation
    }

    /// Stop the current search without failing the session.
    pub fn stop_search(&mut self) {
        if self.state.is_scanning() {
            self.state = ConnectionState::Idle;
        }
    }

    /// Whether a timeout armed for `generation` should still fire.
    #[must_use]
    pub fn scan_timed_out(&self, generation: u64) -> bool {
        generation == self.scan_generation && self.state.is_scanning()
    }

    /// Record that the scan deadline elapsed with no match.
    pub fn fail_scan(&mut self, reason: impl Into<String>) {
        self.state = ConnectionState::Failed(reason.into());
    }

    /// Record a ready UART link after the notify subscription succeeded.
    pub fn mark_ready(&mut self) {
        self.state = ConnectionState::Ready;
    }

    /// Record a user-initiated disconnect.
    pub fn disconnect_requested(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.write_char = None;
        self.notify_char = None;
    }

    /// Fail the session outright, recording the reason.
    pub fn force_fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "session failed");
        self.state = ConnectionState::Failed(reason.clone());
        self.write_char = None;
        self.notify_char = None;
    }

    /// Apply a transport event, returning the actions it triggers.
    pub fn handle_event(&mut self, event: &TransportEvent) -> Vec<SessionAction> {
        match event {
            TransportEvent::PeripheralDiscovered(handle) => self.on_discovered(handle),
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::ConnectFailed { reason } => {
                self.force_fail(format!("connection failed: {reason}"));
                vec![SessionAction::Failed(reason.clone())]
            }
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::ServicesDiscovered(services) => self.on_services(services),
            TransportEvent::CharacteristicsDiscovered(chars) => self.on_characteristics(chars),
            // Payload routing belongs to the correlator, not the session.
            TransportEvent::ValueUpdated { .. } => Vec::new(),
        }
    }

    fn on_discovered(&mut self, handle: &PeripheralHandle) -> Vec<SessionAction> {
        if !self.state.is_scanning() {
            return Vec::new();
        }
        let mut actions = Vec::new();
        if !self.discovered.iter().any(|p| p.id == handle.id) {
            self.discovered.push(handle.clone());
            actions.push(SessionAction::Discovered(handle.clone()));
        }
        if self.matched.is_none() && handle.name.as_deref() == Some(self.target_name.as_str()) {
            debug!(id = %handle.id, name = %self.target_name, "target matched");
            self.matched = Some(handle.clone());
            self.state = ConnectionState::PeripheralFound;
            actions.push(SessionAction::Matched(handle.clone()));
            actions.push(SessionAction::StopScan);
            self.state = ConnectionState::Connecting;
            actions.push(SessionAction::Connect(handle.id.clone()));
        }
        actions
    }

    fn on_connected(&mut self) -> Vec<SessionAction> {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "ignoring connect completion outside Connecting");
            return Vec::new();
        }
        self.state = ConnectionState::DiscoveringServices;
        vec![SessionAction::DiscoverServices]
    }

    fn on_disconnected(&mut self) -> Vec<SessionAction> {
        self.state = ConnectionState::Disconnected;
        self.write_char = None;
        self.notify_char = None;
        vec![SessionAction::Disconnected]
    }

    fn on_services(&mut self, services: &[Uuid]) -> Vec<SessionAction> {
        if self.state != ConnectionState::DiscoveringServices {
            return Vec::new();
        }
        if services.contains(&uuids::UART_SERVICE) {
            self.state = ConnectionState::DiscoveringCharacteristics;
            vec![SessionAction::DiscoverCharacteristics(uuids::UART_SERVICE)]
        } else {
            self.force_fail("peripheral does not expose the UART service");
            vec![SessionAction::Failed(
                "peripheral does not expose the UART service".to_string(),
            )]
        }
    }

    fn on_characteristics(&mut self, chars: &[CharacteristicInfo]) -> Vec<SessionAction> {
        if self.state != ConnectionState::DiscoveringCharacteristics {
            return Vec::new();
        }
        let write = chars
            .iter()
            .find(|c| c.uuid == uuids::UART_RX && c.can_write);
        let notify = chars
            .iter()
            .find(|c| c.uuid == uuids::UART_TX && c.can_notify);
        match (write, notify) {
            (Some(w), Some(n)) => {
                self.write_char = Some(w.uuid);
                self.notify_char = Some(n.uuid);
                vec![SessionAction::Subscribe(n.uuid)]
            }
            _ => {
                self.force_fail("UART characteristics missing or lack required properties");
                vec![SessionAction::Failed(
                    "UART characteristics missing or lack required properties".to_string(),
                )]
            }
        }
    }
}
