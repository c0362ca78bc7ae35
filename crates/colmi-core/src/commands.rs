//! BLE command constants for the ring protocol.
//!
//! This module contains the command bytes used in the ring's 16-byte
//! framed protocol. The same opcode appears at byte 0 of both the request
//! and its response.

/// Battery level query command.
/// Format: `[CMD_BATTERY, 0 x 14, checksum]`
/// Response: `[CMD_BATTERY, percent, ...]`
pub const CMD_BATTERY: u8 = 0x03;

/// Step/activity query command.
/// Format: `[CMD_ACTIVITY, day_offset, 0x0F, 0x00, 0x5F, 0x01, 0 x 9, checksum]`
/// Response carries calories/steps/distance as LE16 at bytes 7-8 / 9-10 / 11-12.
pub const CMD_ACTIVITY: u8 = 0x43;

/// Constant parameter bytes carried at offsets 2..=5 of an activity request.
pub const ACTIVITY_PARAMS: [u8; 4] = [0x0F, 0x00, 0x5F, 0x01];
