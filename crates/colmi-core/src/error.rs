//! Error types for colmi-core.
//!
//! Failures in this driver are local and recoverable: every variant maps
//! to re-invoking the corresponding facade operation. None are fatal to
//! the process. Malformed frames are intentionally not surfaced to callers
//! at all; they are dropped by the correlator (a later write may succeed),
//! and [`Error::MalformedFrame`] exists for logging and for codec users.

use std::time::Duration;

use thiserror::Error;

use colmi_types::FrameError;

use crate::correlator::RequestKind;

/// Errors that can occur when communicating with the ring.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error
/// variants in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable Bluetooth adapter (powered off, unauthorized, or absent).
    #[error("Bluetooth radio unavailable")]
    RadioUnavailable,

    /// No matching peripheral was discovered before the scan deadline.
    #[error("scan timed out after {duration:?}: no device found")]
    ScanTimeout {
        /// The scan timeout that elapsed.
        duration: Duration,
    },

    /// The peripheral rejected or dropped the connection attempt.
    #[error("connection failed: {reason}")]
    ConnectFailed {
        /// Human-readable reason from the radio stack.
        reason: String,
    },

    /// Operation attempted without an established connection.
    #[error("not connected to ring")]
    NotConnected,

    /// A received frame failed length, checksum, or opcode validation.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    /// No resolving response arrived before the per-request deadline.
    #[error("{kind} request timed out after {duration:?}")]
    RequestTimeout {
        /// The request class that timed out.
        kind: RequestKind,
        /// The deadline that elapsed.
        duration: Duration,
    },

    /// The required service or characteristic was not found on the peripheral.
    #[error("characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// The driver event loop has shut down.
    #[error("driver stopped")]
    DriverStopped,

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a connection failure with a string reason.
    pub fn connect_failed(reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            reason: reason.into(),
        }
    }

    /// Create a characteristic-not-found error.
    pub fn characteristic_not_found(uuid: impl Into<String>) -> Self {
        Self::CharacteristicNotFound { uuid: uuid.into() }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using colmi-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
