//! Platform-agnostic types for Colmi smart rings.
//!
//! This crate provides shared types used by the BLE driver in `colmi-core`
//! and by any presentation layer consuming its output.
//!
//! # Features
//!
//! - Activity and snapshot data types
//! - UUID constants for the ring's BLE service and characteristics
//! - Error types for wire-frame parsing
//!
//! # Example
//!
//! ```
//! use colmi_types::{ActivitySample, ConnectionState};
//!
//! let today = ActivitySample::new(0, 4500, 120, 3200);
//! assert_eq!(today.day_offset, 0);
//! assert!(matches!(ConnectionState::default(), ConnectionState::Idle));
//! ```

pub mod error;
pub mod types;
pub mod uuid;

pub use error::{FrameError, FrameResult};
pub use types::{ActivitySample, ConnectionState, DeviceSnapshot, PeripheralHandle, HISTORY_CAPACITY};
pub use uuid as uuids;
