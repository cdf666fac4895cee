//! # Register Link
//!
//! Register reads and writes framed on top of the bit-level transport,
//! including the line choreography around a read: settle, release, presence
//! check, response, and the post-response pull-up check.

use tracing::{debug, warn};

use super::decoder::decode_read_response;
use super::encoder::{encode_read_request, encode_write_request};
use super::protocol::HD_READ_RESPONSE_SIZE;
use super::registers;
use super::transport::{self, BitTiming};
use crate::config::TimingConfig;
use crate::error::{Result, ServoError};
use crate::line::LineIo;

/// Register-level access to a servo
///
/// This is the seam between the settings logic and the wire, so the codec
/// can be exercised against an in-memory register store.
#[cfg_attr(test, mockall::automock)]
pub trait RegisterAccess {
    /// Read one 16-bit register
    fn read_register(&mut self, addr: u8) -> Result<u16>;

    /// Write one 16-bit register. Writes are never acknowledged.
    fn write_register(&mut self, addr: u8, value: u16);
}

/// Register protocol over an owned line
pub struct RegisterLink<L: LineIo> {
    line: L,
    timing: TimingConfig,
    bit_timing: BitTiming,
}

impl<L: LineIo> RegisterLink<L> {
    pub fn new(line: L, timing: TimingConfig) -> Self {
        Self {
            line,
            bit_timing: BitTiming::from(&timing),
            timing,
        }
    }

    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }

    /// Give the line back, left driven LOW
    pub fn into_line(self) -> L {
        self.line
    }

    /// Read a register
    ///
    /// The line is left driven LOW whatever the outcome.
    ///
    /// # Errors
    ///
    /// - `NoServo` if the line floats HIGH after the request
    /// - `BootingOrNoPullup` if the line stays LOW after the response window
    /// - `Corrupt` on a framing, marker, address, length or checksum fault
    pub fn read_raw_register(&mut self, addr: u8) -> Result<u16> {
        let request = encode_read_request(addr);
        let bit_timing = self.bit_timing;

        self.line.without_preemption(|line| {
            for &byte in &request {
                transport::write_byte(line, &bit_timing, byte);
            }
            line.drive_low();
        });

        self.line.delay_ms(self.timing.response_settle_ms);
        self.line.release();

        // A present servo holds the line LOW until it responds
        if self.line.read_level().is_high() {
            self.line.delay_ms(2);
            self.line.drive_low();
            debug!("No servo on line reading {}", registers::display_name(addr));
            return Err(ServoError::NoServo);
        }

        let mut frame = [0u8; HD_READ_RESPONSE_SIZE];
        let received = self.line.without_preemption(|line| -> Result<()> {
            for slot in frame.iter_mut() {
                *slot = transport::read_byte(line, &bit_timing)?;
            }
            Ok(())
        });

        // The servo releases the line after responding; only the pull-up
        // brings it back HIGH
        self.line.delay_ms(1);
        if self.line.read_level().is_low() {
            self.line.drive_low();
            warn!(
                "Line still LOW after reading {}: servo booting or pull-up missing",
                registers::display_name(addr)
            );
            return Err(ServoError::BootingOrNoPullup);
        }

        self.line.drive_low();
        self.line.delay_ms(1);

        if let Err(e) = received {
            warn!(
                "Bad byte in response to {}: {} (got {:02X?})",
                registers::display_name(addr),
                e,
                frame
            );
            return Err(ServoError::Corrupt);
        }

        let response = decode_read_response(&frame, addr).map_err(|fault| {
            warn!(
                "Rejected response to {}: {} ({:02X?})",
                registers::display_name(addr),
                fault,
                frame
            );
            ServoError::from(fault)
        })?;

        debug!(
            "Read {} = {} (0x{:04X}), mystery 0x{:02X}",
            registers::display_name(addr),
            response.value,
            response.value,
            response.mystery
        );

        Ok(response.value)
    }

    /// Write a register
    ///
    /// Fire and forget: the servo never acknowledges writes, so the only way
    /// to confirm one is to read the register back.
    pub fn write_raw_register(&mut self, addr: u8, value: u16) {
        let request = encode_write_request(addr, value);
        let bit_timing = self.bit_timing;

        self.line.without_preemption(|line| {
            for &byte in &request {
                transport::write_byte(line, &bit_timing, byte);
            }
        });

        self.line.drive_low();
        self.line.delay_ms(self.timing.write_settle_ms);

        debug!(
            "Wrote {} = {} (0x{:04X})",
            registers::display_name(addr),
            value,
            value
        );
    }

    /// Sleep through the servo's boot period after a REBOOT write
    pub fn wait_for_boot(&mut self) {
        self.line.delay_ms(self.timing.boot_ms);
    }
}

impl<L: LineIo> RegisterAccess for RegisterLink<L> {
    fn read_register(&mut self, addr: u8) -> Result<u16> {
        self.read_raw_register(addr)
    }

    fn write_register(&mut self, addr: u8, value: u16) {
        self.write_raw_register(addr, value)
    }
}
