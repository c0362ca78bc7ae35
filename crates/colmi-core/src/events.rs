//! Driver event system for observable state changes.
//!
//! The driver core never depends on a UI framework; collaborators observe
//! it by subscribing to a broadcast channel of [`DriverEvent`]s, emitted
//! on each confirmed mutation of the device snapshot or connection state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use colmi_types::{ActivitySample, ConnectionState, PeripheralHandle};

use crate::correlator::RequestKind;

/// Events emitted by the driver as its observable state changes.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DriverEvent {
    /// The connection state machine moved to a new state.
    StateChanged {
        /// The new state.
        state: ConnectionState,
    },
    /// A peripheral was discovered during scanning.
    PeripheralDiscovered {
        /// The discovered peripheral.
        handle: PeripheralHandle,
    },
    /// A checksum-valid battery response was applied to the snapshot.
    BatteryUpdated {
        /// Battery percentage as reported.
        percent: u8,
    },
    /// A per-day activity request resolved.
    DayResolved {
        /// The resolved sample, attributed to its requested day offset.
        sample: ActivitySample,
    },
    /// The rolling history was cleared at the start of a multi-day fetch.
    HistoryCleared,
    /// A pending request hit its deadline without a resolving response.
    RequestTimedOut {
        /// The request class that expired.
        kind: RequestKind,
        /// The day offset, for step-class requests.
        day_offset: Option<u8>,
    },
    /// A recoverable error was surfaced as a status message.
    Error {
        /// User-facing description.
        message: String,
    },
}

/// Sender for driver events.
pub type EventSender = broadcast::Sender<DriverEvent>;

/// Receiver for driver events.
pub type EventReceiver = broadcast::Receiver<DriverEvent>;

/// Event dispatcher fanning driver events out to all subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DriverEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(64)
    }
}
