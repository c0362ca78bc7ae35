//! Async driver for Colmi R02-family smart rings over Bluetooth LE.
//!
//! The ring speaks a fixed 16-byte framed protocol over a Nordic-style
//! UART service: commands are written to one characteristic, responses
//! arrive as notifications on another. This crate provides the full
//! stack for talking to it:
//!
//! - [`frame`]: the 16-byte command/response codec with checksum
//!   validation
//! - [`transport`]: the radio abstraction, with a btleplug backend
//!   ([`btle`]) and a scriptable in-memory one ([`mock`])
//! - [`session`]: the connection state machine from scan to ready link
//! - [`correlator`]: request/response matching and strict step-request
//!   serialization
//! - [`driver`]: the [`RingDriver`] facade over a single event loop
//!
//! # Quick Start
//!
//! ```no_run
//! use colmi_core::{BtleTransport, DriverConfig, DriverEvent, RingDriver};
//!
//! #[tokio::main]
//! async fn main() -> colmi_core::Result<()> {
//!     let (transport, events) = BtleTransport::new().await?;
//!     let driver = RingDriver::new(transport, events, DriverConfig::new("R02_5C07"))?;
//!
//!     let mut driver_events = driver.subscribe();
//!     driver.search().await?;
//!
//!     while let Ok(event) = driver_events.recv().await {
//!         if let DriverEvent::BatteryUpdated { percent } = event {
//!             println!("Battery Level: {percent}%");
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod commands;
pub mod config;
pub mod correlator;
pub mod driver;
pub mod error;
pub mod events;
pub mod frame;
pub mod history;
pub mod mock;
pub mod session;
pub mod transport;

pub use btle::BtleTransport;
pub use config::DriverConfig;
pub use correlator::{Correlator, RequestKind, Resolution};
pub use driver::RingDriver;
pub use error::{Error, Result};
pub use events::{DriverEvent, EventDispatcher, EventReceiver};
pub use frame::{CommandFrame, FRAME_LEN, Response, decode_response};
pub use history::ActivityHistory;
pub use session::{SessionAction, SessionMachine};
pub use transport::{CharacteristicInfo, Transport, TransportEvent, TransportEvents};

pub use colmi_types::{
    ActivitySample, ConnectionState, DeviceSnapshot, FrameError, HISTORY_CAPACITY,
    PeripheralHandle, uuids,
};
