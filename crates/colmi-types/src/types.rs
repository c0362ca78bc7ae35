//! Core types for ring activity data and driver state.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of per-day samples retained in the rolling history.
pub const HISTORY_CAPACITY: usize = 7;

/// A discovered BLE peripheral, as presented to collaborators.
///
/// The `id` is an opaque, platform-specific identifier (peripheral UUID on
/// macOS, MAC address elsewhere) and is unique within a scan. Handles are
/// listed in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralHandle {
    /// Opaque identifier used to address the peripheral.
    pub id: String,
    /// Advertised name, if the peripheral provided one.
    pub name: Option<String>,
}

impl PeripheralHandle {
    /// Create a new handle.
    pub fn new(id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            id: id.into(),
            name,
        }
    }

    /// Display name for UI listing, falling back to the identifier.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Connection lifecycle state of a driver session.
///
/// Exactly one state is active per session; it is owned exclusively by the
/// connection state machine and exposed read-only to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConnectionState {
    /// No session activity.
    #[default]
    Idle,
    /// Actively scanning for the target peripheral.
    Scanning,
    /// Target peripheral discovered, scan stopped.
    PeripheralFound,
    /// Connection attempt in flight.
    Connecting,
    /// Connected, waiting for service discovery.
    DiscoveringServices,
    /// Service found, waiting for characteristic discovery.
    DiscoveringCharacteristics,
    /// Notify/write pair resolved and subscribed; requests may be issued.
    Ready,
    /// Connection ended (by either side); a new search may begin.
    Disconnected,
    /// Terminal failure with a user-facing reason.
    Failed(String),
}

impl ConnectionState {
    /// Whether requests can be issued in this state.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Whether a scan is currently in progress.
    #[must_use]
    pub fn is_scanning(&self) -> bool {
        matches!(self, ConnectionState::Scanning)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::PeripheralFound => write!(f, "peripheral found"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::DiscoveringServices => write!(f, "discovering services"),
            ConnectionState::DiscoveringCharacteristics => {
                write!(f, "discovering characteristics")
            }
            ConnectionState::Ready => write!(f, "ready"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// One day's activity metrics as reported by the ring.
///
/// `day_offset` counts days into the past: 0 is today, 1 is yesterday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivitySample {
    /// Days into the past this sample covers (0 = today).
    pub day_offset: u8,
    /// Step count for the day.
    pub steps: u16,
    /// Calories burned (kcal).
    pub calories: u16,
    /// Distance covered in meters.
    pub distance_meters: u16,
}

impl ActivitySample {
    /// Create a new sample.
    #[must_use]
    pub fn new(day_offset: u8, steps: u16, calories: u16, distance_meters: u16) -> Self {
        Self {
            day_offset,
            steps,
            calories,
            distance_meters,
        }
    }
}

impl fmt::Display for ActivitySample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day -{}: {} steps, {} kcal, {} m",
            self.day_offset, self.steps, self.calories, self.distance_meters
        )
    }
}

/// Current observable driver state exposed to collaborators.
///
/// Mutated only by the driver's event loop on confirmed, checksum-valid
/// responses; collaborators receive read-only clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceSnapshot {
    /// User-facing status message.
    pub status: String,
    /// Last reported battery percentage (0-100).
    pub battery: u8,
    /// Whether a peripheral connection is established.
    pub connected: bool,
    /// Today's activity metrics, once fetched.
    pub today: Option<ActivitySample>,
    /// Rolling per-day history, newest fetch order first, at most
    /// [`HISTORY_CAPACITY`] entries.
    pub history: Vec<ActivitySample>,
}
