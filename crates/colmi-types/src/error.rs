//! Error types for wire-frame parsing in colmi-types.

use thiserror::Error;

/// Errors that can occur when parsing a 16-byte ring protocol frame.
///
/// This error type is platform-agnostic and does not include BLE-specific
/// errors (those belong in colmi-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameError {
    /// The frame is not exactly 16 bytes long.
    #[error("invalid frame length: expected 16 bytes, got {actual}")]
    WrongLength {
        /// Actual number of bytes received.
        actual: usize,
    },

    /// The trailing checksum byte does not match the computed sum.
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch {
        /// Checksum computed over bytes 0..15.
        expected: u8,
        /// Checksum byte carried at offset 15.
        actual: u8,
    },

    /// The response opcode (byte 0) is not one the driver understands.
    #[error("unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),
}

/// Result type alias using colmi-types' FrameError type.
pub type FrameResult<T> = std::result::Result<T, FrameError>;
