//! # Bit-Level Transport
//!
//! Bit-banged UART bytes on a single line: 115200 baud, inverted polarity,
//! 8 data bits LSB-first, 1 start bit, 1 stop bit, no parity.
//!
//! ```text
//!        start  b0   b1   b2   b3   b4   b5   b6   b7  stop
//! HIGH  ┌────┐
//!       │    │ data bits: 1 = LOW, 0 = HIGH
//! LOW ──┘    └ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ───── idle
//! ```
//!
//! Every cell boundary is scheduled against an absolute deadline measured from
//! the start edge. Time spent toggling the pin or computing the next bit is
//! absorbed into the wait, so each cell lasts exactly one bit period no matter
//! how fast the host is.
//!
//! Callers are responsible for running whole frames inside
//! [`LineIo::without_preemption`].

use crate::config::TimingConfig;
use crate::error::{Result, ServoError};
use crate::line::{Level, LineIo};

/// Number of cells per byte: start + 8 data + stop
const CELLS_PER_BYTE: u64 = 10;

/// Bit timing derived from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTiming {
    pub bit_period_ns: u64,
    pub start_bit_timeout_ns: u64,
}

impl From<&TimingConfig> for BitTiming {
    fn from(config: &TimingConfig) -> Self {
        Self {
            bit_period_ns: config.bit_period_ns as u64,
            start_bit_timeout_ns: config.start_bit_timeout_ms as u64 * 1_000_000,
        }
    }
}

impl Default for BitTiming {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl BitTiming {
    /// Offset of the centre of data bit `bit` from the start edge
    fn data_bit_center(&self, bit: u64) -> u64 {
        // Start bit occupies cell 0, data bit n occupies cell n + 1
        (2 * bit + 3) * self.bit_period_ns / 2
    }

    /// Offset of the centre of the stop bit from the start edge
    fn stop_bit_center(&self) -> u64 {
        (2 * (CELLS_PER_BYTE - 1) + 1) * self.bit_period_ns / 2
    }
}

/// Sleep until the line clock reaches `deadline`
fn wait_until<L: LineIo>(line: &mut L, deadline: u64) {
    let now = line.now_ns();
    if deadline > now {
        let remaining = (deadline - now).min(u32::MAX as u64) as u32;
        line.delay_ns(remaining);
    }
}

/// Transmit one byte
///
/// Drives exactly ten bit cells and returns with the line driven LOW (the
/// stop bit level) once the stop cell has elapsed.
pub fn write_byte<L: LineIo>(line: &mut L, timing: &BitTiming, value: u8) {
    let start = line.now_ns();

    // Start bit; polarity is inverted, so it is HIGH
    line.drive_high();
    wait_until(line, start + timing.bit_period_ns);

    for bit in 0..8u64 {
        if value & (1 << bit) != 0 {
            line.drive_low();
        } else {
            line.drive_high();
        }
        wait_until(line, start + (bit + 2) * timing.bit_period_ns);
    }

    // Stop bit
    line.drive_low();
    wait_until(line, start + CELLS_PER_BYTE * timing.bit_period_ns);
}

/// Receive one byte
///
/// # Errors
///
/// - `NoServo` if no start bit arrives within the start-bit timeout
/// - `Corrupt` if the stop bit is not LOW
pub fn read_byte<L: LineIo>(line: &mut L, timing: &BitTiming) -> Result<u8> {
    let deadline = line.now_ns() + timing.start_bit_timeout_ns;

    // Wait for the start bit (HIGH)
    let edge = loop {
        let sampled_at = line.now_ns();
        if line.read_level().is_high() {
            break sampled_at;
        }
        if sampled_at >= deadline {
            return Err(ServoError::NoServo);
        }
    };

    let mut value = 0u8;
    for bit in 0..8u64 {
        wait_until(line, edge + timing.data_bit_center(bit));
        if line.read_level() == Level::Low {
            value |= 1 << bit;
        }
    }

    wait_until(line, edge + timing.stop_bit_center());
    if line.read_level().is_high() {
        return Err(ServoError::Corrupt);
    }

    Ok(value)
}
