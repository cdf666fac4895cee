//! # Gentle Movement
//!
//! Moving the servo to arbitrary APVs, including ones outside its configured
//! range, without letting it hurt itself against the physical stops.
//!
//! While active, the range registers are pushed beyond anything the servo can
//! reach and speed and power are cut to the minimum. The previous values are
//! restored by [`GentleMovement::finish`].

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::line::LineIo;
use crate::protocol::protocol::APV_MAX;
use crate::protocol::registers::*;

use super::session::{map_range, DeviceSession, QUARTER_MICROS_LEFT, QUARTER_MICROS_RIGHT};
use super::settings::{DeviceSettings, RangeApv};

/// Range used while moving gently; wider than any servo can travel
pub const GENTLE_RANGE: RangeApv = RangeApv::new(50, 8192, 16333);

/// Slowest speed (5%)
const GENTLE_SPEED: u16 = 0x0005;

/// 20% power
const GENTLE_POWER_LIMIT: u16 = 0x0190;

/// Registers overwritten while moving gently
const SAVED_REGISTERS: [u8; 5] = [
    RANGE_LEFT_APV,
    RANGE_CENTER_APV,
    RANGE_RIGHT_APV,
    SPEED,
    POWER_LIMIT,
];

const SETTLE_POLL_MS: u32 = 100;
const SETTLE_MAX_POLLS: usize = 50;

/// Readings this close together mean the servo has stopped
const SETTLE_TOLERANCE_APV: u16 = 3;

/// Temporary low-power, full-range settings on an attached servo
pub struct GentleMovement<'a, L: LineIo> {
    session: &'a mut DeviceSession<L>,
    saved: [(u8, u16); SAVED_REGISTERS.len()],
}

impl<'a, L: LineIo> GentleMovement<'a, L> {
    /// Save the current range, speed and power, then apply gentle settings
    ///
    /// Saves to EEPROM and reboots, so this takes over a second. If it fails
    /// partway the servo may be left with gentle settings saved.
    pub fn begin(session: &'a mut DeviceSession<L>) -> Result<Self> {
        info!("Temporarily switching servo to widest range and low power");

        let mut saved = [(0u8, 0u16); SAVED_REGISTERS.len()];
        for (slot, &addr) in saved.iter_mut().zip(SAVED_REGISTERS.iter()) {
            *slot = (addr, session.read_raw_register(addr)?);
        }
        debug!("Saved registers before gentle movement: {:?}", saved);

        session.write_raw_register(RANGE_LEFT_APV, GENTLE_RANGE.left)?;
        session.write_raw_register(RANGE_CENTER_APV, GENTLE_RANGE.center)?;
        session.write_raw_register(RANGE_RIGHT_APV, GENTLE_RANGE.right)?;
        session.write_raw_register(SPEED, GENTLE_SPEED)?;
        session.write_raw_register(POWER_LIMIT, GENTLE_POWER_LIMIT)?;
        save_and_reboot(session)?;

        Ok(Self { session, saved })
    }

    /// Move to `target_apv` and wait for the servo to stop
    ///
    /// Returns the position the servo settled at, which is short of the
    /// target if it ran into a physical stop.
    pub fn move_to_apv(&mut self, target_apv: u16) -> Result<u16> {
        let quarter_micros = map_range(
            target_apv as i32,
            GENTLE_RANGE.left as i32,
            GENTLE_RANGE.right as i32,
            QUARTER_MICROS_LEFT,
            QUARTER_MICROS_RIGHT,
        );
        self.session.write_target_quarter_micros(quarter_micros);

        let mut last = self.session.read_current_apv()?;
        let mut current = last;
        for _ in 0..SETTLE_MAX_POLLS {
            self.session.wait_ms(SETTLE_POLL_MS);
            current = self.session.read_current_apv()?;
            if current.abs_diff(last) <= SETTLE_TOLERANCE_APV {
                break;
            }
            last = current;
        }

        debug!("Moved gently toward APV {}, settled at {}", target_apv, current);
        Ok(current)
    }

    /// Restore the saved registers and return the settings now in effect
    pub fn finish(self) -> Result<DeviceSettings> {
        info!("Restoring servo settings after gentle movement");

        let Self { session, saved } = self;
        for &(addr, value) in &saved {
            session.write_raw_register(addr, value)?;
        }
        save_and_reboot(session)?;

        session.read_settings()
    }
}

fn save_and_reboot<L: LineIo>(session: &mut DeviceSession<L>) -> Result<()> {
    session.write_raw_register(SAVE, SAVE_CONST)?;
    session.write_raw_register(REBOOT, REBOOT_CONST)?;
    session.wait_for_reboot();
    Ok(())
}

/// Find the physical range of motion by driving into both stops
///
/// The result always follows the clockwise convention, so it is inverted
/// when the servo is set to counterclockwise. The servo's settings are
/// restored afterwards, including when a move fails.
pub fn measure_widest_range<L: LineIo>(session: &mut DeviceSession<L>) -> Result<RangeApv> {
    let counterclockwise = session.read_settings()?.counterclockwise;

    let mut gentle = GentleMovement::begin(session)?;
    let moves = gentle
        .move_to_apv(GENTLE_RANGE.left)
        .and_then(|left| Ok((left, gentle.move_to_apv(GENTLE_RANGE.right)?)));

    let (left, right) = match moves {
        Ok(extremes) => extremes,
        Err(e) => {
            warn!("Range measurement failed: {}", e);
            if let Err(restore) = gentle.finish() {
                warn!("Could not restore settings: {}", restore);
            }
            return Err(e);
        }
    };
    gentle.finish()?;

    let center = ((left as u32 + right as u32) / 2) as u16;
    let measured = RangeApv { left, center, right };
    info!("Measured physical range {:?}", measured);

    Ok(if counterclockwise {
        RangeApv {
            left: APV_MAX - right,
            center: APV_MAX - center,
            right: APV_MAX - left,
        }
    } else {
        measured
    })
}
