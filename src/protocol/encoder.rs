//! # HitecD Frame Encoder
//!
//! Encodes register read and write requests.

use super::checksum::checksum;
use super::protocol::*;

/// Encode a register write request
///
/// # Arguments
///
/// * `addr` - Register address (should be even)
/// * `value` - 16-bit value to write
///
/// # Returns
///
/// * `[u8; 7]` - marker, zero, address, length, low byte, high byte, checksum
///
/// # Examples
///
/// ```
/// use hitecd_servo::protocol::encoder::encode_write_request;
///
/// let frame = encode_write_request(0x46, 0x0001); // REBOOT
/// assert_eq!(frame, [0x96, 0x00, 0x46, 0x02, 0x01, 0x00, 0x49]);
/// ```
pub fn encode_write_request(addr: u8, value: u16) -> [u8; HD_WRITE_REQUEST_SIZE] {
    let bytes = RegisterBytes::from_value(value);
    let mut frame = [
        HD_REQUEST_MARKER,
        0x00,
        addr,
        HD_LENGTH_VALUE,
        bytes.low,
        bytes.high,
        0x00,
    ];
    frame[6] = checksum(&frame[1..6]);
    frame
}

/// Encode a register read request
///
/// # Arguments
///
/// * `addr` - Register address (should be even)
///
/// # Returns
///
/// * `[u8; 5]` - marker, zero, address, zero length, checksum
pub fn encode_read_request(addr: u8) -> [u8; HD_READ_REQUEST_SIZE] {
    let mut frame = [HD_REQUEST_MARKER, 0x00, addr, HD_LENGTH_READ, 0x00];
    frame[4] = checksum(&frame[1..4]);
    frame
}

/// Encode a read response the way the servo does
///
/// Only the simulated servo and capture tests need this; the host never
/// sends responses.
pub fn encode_read_response(addr: u8, mystery: u8, value: u16) -> [u8; HD_READ_RESPONSE_SIZE] {
    let bytes = RegisterBytes::from_value(value);
    let mut frame = [
        HD_RESPONSE_MARKER,
        mystery,
        addr,
        HD_LENGTH_VALUE,
        bytes.low,
        bytes.high,
        0x00,
    ];
    frame[6] = checksum(&frame[1..6]);
    frame
}
