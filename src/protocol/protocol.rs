//! # HitecD Protocol Constants and Types
//!
//! Core frame definitions for the register protocol.
//!
//! ```text
//! write request   96 00 addr 02 low high checksum
//! read request    96 00 addr 00 checksum
//! read response   69 mystery addr 02 low high checksum
//! ```

/// First byte of every frame sent by the host
pub const HD_REQUEST_MARKER: u8 = 0x96;

/// First byte of every frame sent by the servo
pub const HD_RESPONSE_MARKER: u8 = 0x69;

/// Length byte of a read request (no payload)
pub const HD_LENGTH_READ: u8 = 0x00;

/// Length byte of a frame carrying one 16-bit value
pub const HD_LENGTH_VALUE: u8 = 0x02;

/// Read request size: marker + zero + addr + length + checksum
pub const HD_READ_REQUEST_SIZE: usize = 5;

/// Write request size: marker + zero + addr + length + low + high + checksum
pub const HD_WRITE_REQUEST_SIZE: usize = 7;

/// Read response size: marker + mystery + addr + length + low + high + checksum
pub const HD_READ_RESPONSE_SIZE: usize = 7;

/// Largest angle potentiometer value (2^14 - 1)
pub const APV_MAX: u16 = 16383;

/// Pulse widths the servo maps to the left, center and right range points
pub const PULSE_LEFT_US: i32 = 850;
pub const PULSE_CENTER_US: i32 = 1500;
pub const PULSE_RIGHT_US: i32 = 2150;

/// Offset between quarter-microseconds and the TARGET register encoding
pub const TARGET_QUARTER_MICROS_OFFSET: i32 = 3000;

/// A register value with both bytes in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBytes {
    pub low: u8,
    pub high: u8,
}

impl RegisterBytes {
    pub fn from_value(value: u16) -> Self {
        let [low, high] = value.to_le_bytes();
        Self { low, high }
    }

    pub fn value(self) -> u16 {
        u16::from_le_bytes([self.low, self.high])
    }
}

/// Decoded read response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResponse {
    /// Register address echoed by the servo
    pub addr: u8,

    /// Second byte of the response; usually 0x00, 0xFF or 0xFE. Its meaning is
    /// unknown, so it is carried through but never checked.
    pub mystery: u8,

    /// Register value
    pub value: u16,
}
