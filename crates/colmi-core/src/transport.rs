//! Transport abstraction over the radio backend.
//!
//! The driver talks to a generic "connectable, service-discoverable,
//! characteristic-based" peripheral link through the [`Transport`] trait.
//! Commands flow through the trait's async methods; everything the radio
//! initiates (discovery, connection changes, notification payloads)
//! arrives as [`TransportEvent`]s on an mpsc channel handed out at
//! transport construction. Any conforming backend is interchangeable:
//! the btleplug stack ([`crate::btle::BtleTransport`]) or the in-memory
//! test double ([`crate::mock::MockTransport`]).

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use colmi_types::PeripheralHandle;

use crate::error::Result;

/// Buffer size for transport event channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A characteristic discovered on the connected peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Whether the characteristic accepts writes.
    pub can_write: bool,
    /// Whether the characteristic supports notifications.
    pub can_notify: bool,
}

impl CharacteristicInfo {
    /// Create a new characteristic descriptor.
    #[must_use]
    pub fn new(uuid: Uuid, can_write: bool, can_notify: bool) -> Self {
        Self {
            uuid,
            can_write,
            can_notify,
        }
    }
}

/// Asynchronous events emitted by a transport backend.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A peripheral was seen while scanning.
    PeripheralDiscovered(PeripheralHandle),
    /// The connection attempt completed.
    Connected,
    /// The connection attempt was rejected or dropped.
    ConnectFailed {
        /// Backend-specific failure description.
        reason: String,
    },
    /// The peripheral disconnected (either side).
    Disconnected,
    /// Service discovery completed with these service UUIDs.
    ServicesDiscovered(Vec<Uuid>),
    /// Characteristic discovery completed for the requested service.
    CharacteristicsDiscovered(Vec<CharacteristicInfo>),
    /// A subscribed characteristic delivered a notification payload.
    ValueUpdated {
        /// The characteristic that produced the value.
        characteristic: Uuid,
        /// Raw payload bytes as received.
        value: Vec<u8>,
    },
}

/// Receiver half of a transport's event channel.
pub type TransportEvents = mpsc::Receiver<TransportEvent>;

/// Sender half of a transport's event channel.
pub type TransportEventSender = mpsc::Sender<TransportEvent>;

/// Create a transport event channel with the default capacity.
pub fn event_channel() -> (TransportEventSender, TransportEvents) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Capability set a radio backend must provide to the state machine.
///
/// All methods initiate an operation; completion and anything the
/// peripheral does on its own are reported through [`TransportEvent`]s.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Begin scanning for peripherals.
    async fn start_scan(&self) -> Result<()>;

    /// Stop an in-progress scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Initiate a connection to a previously discovered peripheral.
    ///
    /// Completion arrives as [`TransportEvent::Connected`] or
    /// [`TransportEvent::ConnectFailed`].
    async fn connect(&self, peripheral_id: &str) -> Result<()>;

    /// Tear down the current connection.
    async fn disconnect(&self) -> Result<()>;

    /// Discover services on the connected peripheral.
    async fn discover_services(&self) -> Result<()>;

    /// Discover characteristics of a service.
    async fn discover_characteristics(&self, service: Uuid) -> Result<()>;

    /// Subscribe to notifications on a characteristic.
    async fn subscribe(&self, characteristic: Uuid) -> Result<()>;

    /// Write bytes to a characteristic.
    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()>;
}
