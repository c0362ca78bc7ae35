//! Bluetooth UUIDs for Colmi smart rings.
//!
//! The R02-family rings expose a Nordic-UART-style service with one
//! writable characteristic (commands in) and one notifying characteristic
//! (responses out). All request/response traffic flows over that pair.

use uuid::{Uuid, uuid};

/// UART-style command service exposed by the ring.
pub const UART_SERVICE: Uuid = uuid!("6e40fff0-b5a3-f393-e0a9-e50e24dcca9e");

/// Write characteristic (central -> ring). Command frames are written here.
pub const UART_RX: Uuid = uuid!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");

/// Notify characteristic (ring -> central). Response frames arrive here.
pub const UART_TX: Uuid = uuid!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// Service UUID some R02 units carry in their advertisement payload.
///
/// Matching is done by advertised name, not by this UUID; it is kept for
/// diagnostics when inspecting scan results.
pub const ADVERTISED_SERVICE: Uuid = uuid!("38291df5-cc76-cd02-b835-52316bd80c45");
