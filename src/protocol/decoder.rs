//! # HitecD Response Decoder
//!
//! Validates read responses received from the servo.

use thiserror::Error;

use super::checksum::frame_checksum;
use super::protocol::*;
use crate::error::ServoError;

/// Reason a read response was rejected
///
/// All of these surface to callers as [`ServoError::Corrupt`]; the detail is
/// only for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResponseFault {
    #[error("invalid response marker 0x{0:02X}")]
    BadMarker(u8),

    #[error("response for register 0x{actual:02X}, expected 0x{expected:02X}")]
    AddressMismatch { expected: u8, actual: u8 },

    #[error("invalid length byte 0x{0:02X}")]
    BadLength(u8),

    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

impl From<ResponseFault> for ServoError {
    fn from(_: ResponseFault) -> Self {
        ServoError::Corrupt
    }
}

/// Decode a read response
///
/// # Arguments
///
/// * `frame` - The seven bytes received after a read request
/// * `expected_addr` - Register that was requested
///
/// # Errors
///
/// Returns error if:
/// - The marker byte is not 0x69
/// - The echoed address differs from the requested one
/// - The length byte is not 0x02
/// - The checksum does not match
///
/// The mystery byte is accepted as-is.
pub fn decode_read_response(
    frame: &[u8; HD_READ_RESPONSE_SIZE],
    expected_addr: u8,
) -> std::result::Result<ReadResponse, ResponseFault> {
    let [marker, mystery, addr, length, low, high, received] = *frame;

    if marker != HD_RESPONSE_MARKER {
        return Err(ResponseFault::BadMarker(marker));
    }

    if addr != expected_addr {
        return Err(ResponseFault::AddressMismatch {
            expected: expected_addr,
            actual: addr,
        });
    }

    if length != HD_LENGTH_VALUE {
        return Err(ResponseFault::BadLength(length));
    }

    // A 7-byte frame always has a checksum
    let calculated = frame_checksum(frame).unwrap_or_default();
    if calculated != received {
        return Err(ResponseFault::ChecksumMismatch {
            expected: calculated,
            actual: received,
        });
    }

    Ok(ReadResponse {
        addr,
        mystery,
        value: RegisterBytes { low, high }.value(),
    })
}
