//! # Frame Checksum
//!
//! Every frame ends with the low byte of the sum of all bytes after the
//! second one (address, length and payload, plus the mystery byte for
//! responses, which sits in the second slot).
//!
//! Request frames always carry 0x00 in the second slot, so summing from the
//! second byte onward gives the same result for every frame type.

/// Sum bytes modulo 256
///
/// # Examples
///
/// ```
/// use hitecd_servo::protocol::checksum::checksum;
///
/// // Read request for register 0x32: the checksum is the address itself
/// assert_eq!(checksum(&[0x00, 0x32, 0x00]), 0x32);
/// ```
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc.wrapping_add(byte))
}

/// Checksum of a complete frame (everything but the marker and the trailer)
///
/// Returns `None` if the frame is too short to carry a checksum.
pub fn frame_checksum(frame: &[u8]) -> Option<u8> {
    if frame.len() < 3 {
        return None;
    }
    Some(checksum(&frame[1..frame.len() - 1]))
}

/// Whether the trailer byte of `frame` matches its contents
pub fn verify_frame(frame: &[u8]) -> bool {
    match (frame_checksum(frame), frame.last()) {
        (Some(expected), Some(&actual)) => expected == actual,
        _ => false,
    }
}
