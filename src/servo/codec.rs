//! # Settings Codec
//!
//! Translates [`DeviceSettings`] to and from register values.
//!
//! Writing follows the DPC-11 programmer's sequence: factory reset, then only
//! the settings that differ from factory, then save and reboot. Several
//! writes of unexplained constants (MYSTERY_DB, MYSTERY_OP1/2) are part of
//! that sequence and are replayed exactly.

use tracing::{debug, warn};

use crate::error::{Result, ServoError};
use crate::protocol::registers::*;
use crate::protocol::RegisterAccess;

use super::models::ModelSpec;
use super::settings::{
    soft_start_percent, soft_start_register, DeviceSettings, FailSafe, RangeApv,
    FAIL_SAFE_PULSE_MAX_US, FAIL_SAFE_PULSE_MIN_US,
};

/// Factory deadband register triple
const DEADBAND_FACTORY: (u16, u16, u16) = (1, 5, 11);

/// Register triple for a deadband setting
pub fn deadband_registers(deadband: u8) -> (u16, u16, u16) {
    if deadband <= 1 {
        return DEADBAND_FACTORY;
    }
    let base = 4 * deadband as u16;
    (base - 4, base, base + 6)
}

/// Deadband setting for a register triple
pub fn deadband_from_registers(db1: u16, db2: u16, db3: u16) -> Option<u8> {
    if (db1, db2, db3) == DEADBAND_FACTORY {
        return Some(1);
    }
    if (4..=36).contains(&db1) && db1 % 4 == 0 && db2 == db1 + 4 && db3 == db1 + 10 {
        return Some((db1 / 4 + 1) as u8);
    }
    None
}

/// Log and build a `Confused` error
fn confused(register: u8, detail: String) -> ServoError {
    warn!("Unexpected value in {}: {}", display_name(register), detail);
    ServoError::Confused
}

/// Read every setting from the servo
///
/// Registers are read in a fixed order and the first failure aborts the
/// read. Range registers are always reported explicitly, and each one is
/// copied into `range` as soon as it is read, so `range` follows the servo
/// even when a later register fails.
///
/// # Errors
///
/// - Any read error from the link
/// - `Confused` if a register holds a value no setting encodes to
pub fn read_settings<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    range: &mut RangeApv,
) -> Result<DeviceSettings> {
    let raw = regs.read_register(ID)?;
    if raw > 255 {
        return Err(confused(ID, format!("{}", raw)));
    }
    let id = raw as u8;

    let counterclockwise = match regs.read_register(DIRECTION)? {
        DIRECTION_CLOCKWISE => false,
        DIRECTION_COUNTERCLOCKWISE => true,
        raw => return Err(confused(DIRECTION, format!("{}", raw))),
    };

    let speed = match regs.read_register(SPEED)? {
        SPEED_MAX => 100,
        raw if raw < 20 => (raw * 5) as u8,
        raw => return Err(confused(SPEED, format!("{}", raw))),
    };

    let db1 = regs.read_register(DEADBAND_1)?;
    let db2 = regs.read_register(DEADBAND_2)?;
    let db3 = regs.read_register(DEADBAND_3)?;
    let deadband = deadband_from_registers(db1, db2, db3)
        .ok_or_else(|| confused(DEADBAND_1, format!("triple ({}, {}, {})", db1, db2, db3)))?;

    let raw = regs.read_register(SOFT_START)?;
    let soft_start = soft_start_percent(raw).ok_or_else(|| confused(SOFT_START, format!("{}", raw)))?;

    let range_left_apv = regs.read_register(RANGE_LEFT_APV)?;
    range.left = range_left_apv;
    let range_right_apv = regs.read_register(RANGE_RIGHT_APV)?;
    range.right = range_right_apv;
    let range_center_apv = regs.read_register(RANGE_CENTER_APV)?;
    range.center = range_center_apv;

    let fail_safe = match regs.read_register(FAIL_SAFE)? {
        us if (FAIL_SAFE_PULSE_MIN_US..=FAIL_SAFE_PULSE_MAX_US).contains(&us) => FailSafe::Pulse(us),
        FAIL_SAFE_LIMP => FailSafe::Limp,
        FAIL_SAFE_OFF => FailSafe::HoldPosition,
        raw => return Err(confused(FAIL_SAFE, format!("{}", raw))),
    };

    // Values above 2000 other than the max marker decode past 100 and are
    // passed through as-is
    let power_limit = match regs.read_register(POWER_LIMIT)? {
        POWER_LIMIT_MAX => 100,
        raw => (raw + 19) / 20,
    };

    let overload_protection = regs.read_register(OVERLOAD_PROTECTION)?;

    let ss1 = regs.read_register(SMART_SENSE_1)?;
    let ss2 = regs.read_register(SMART_SENSE_2)?;
    let enable_1 = regs.read_register(SS_ENABLE_1)?;
    let enable_2 = regs.read_register(SS_ENABLE_2)?;
    let disable_1 = regs.read_register(SS_DISABLE_1)?;
    let disable_2 = regs.read_register(SS_DISABLE_2)?;
    let smart_sense = if (ss1, ss2) == (enable_1, enable_2) {
        true
    } else if (ss1, ss2) == (disable_1, disable_2) {
        false
    } else {
        return Err(confused(
            SMART_SENSE_1,
            format!(
                "({}, {}) matches neither enable ({}, {}) nor disable ({}, {})",
                ss1, ss2, enable_1, enable_2, disable_1, disable_2
            ),
        ));
    };

    let sensitivity_ratio = regs.read_register(SENSITIVITY_RATIO)?;
    if !(SENSITIVITY_RATIO_MIN..=SENSITIVITY_RATIO_MAX).contains(&sensitivity_ratio) {
        return Err(confused(SENSITIVITY_RATIO, format!("{}", sensitivity_ratio)));
    }

    Ok(DeviceSettings {
        id,
        counterclockwise,
        speed,
        deadband,
        soft_start,
        range_left_apv: Some(range_left_apv),
        range_right_apv: Some(range_right_apv),
        range_center_apv: Some(range_center_apv),
        fail_safe,
        power_limit,
        overload_protection,
        smart_sense,
        sensitivity_ratio,
    })
}

/// Write a range register if it differs from the model default, otherwise
/// read back what the servo has
fn write_or_read_range<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    addr: u8,
    requested: Option<u16>,
    default: Option<u16>,
) -> Result<u16> {
    match requested {
        Some(apv) if Some(apv) != default => {
            regs.write_register(addr, apv);
            Ok(apv)
        }
        _ => regs.read_register(addr),
    }
}

/// Write settings to the servo, tracking the range now in effect
///
/// Expects settings that already passed [`DeviceSettings::validate`]. Ends
/// with SAVE and REBOOT; the servo ignores everything for the boot period
/// afterwards, so the caller must wait before talking to it again.
///
/// Each field of `range` is updated as soon as its register is written or
/// read back.
///
/// # Errors
///
/// Any read error from a range or smart sense read-back. Writes applied
/// before the failure stay applied, and so do their `range` updates.
pub fn write_settings<R: RegisterAccess + ?Sized>(
    regs: &mut R,
    settings: &DeviceSettings,
    model: Option<&ModelSpec>,
    range: &mut RangeApv,
) -> Result<()> {
    regs.write_register(FACTORY_RESET, FACTORY_RESET_CONST);
    regs.write_register(MYSTERY_OP1, MYSTERY_OP1_CONST);
    regs.write_register(MYSTERY_OP2, MYSTERY_OP2_CONST);

    if settings.id != 0 {
        regs.write_register(ID, settings.id as u16);
    }

    if settings.counterclockwise {
        regs.write_register(DIRECTION, DIRECTION_COUNTERCLOCKWISE);
    }

    if settings.speed != 100 {
        regs.write_register(SPEED, (settings.speed / 5) as u16);
    }

    if settings.deadband != 1 {
        let (db1, db2, db3) = deadband_registers(settings.deadband);
        regs.write_register(MYSTERY_DB, MYSTERY_DB_CONST);
        regs.write_register(DEADBAND_1, db1);
        regs.write_register(DEADBAND_2, db2);
        regs.write_register(DEADBAND_3, db3);
    }

    if settings.soft_start != 20 {
        if let Some(raw) = soft_start_register(settings.soft_start) {
            regs.write_register(SOFT_START, raw);
        }
    }

    let defaults = model.map(|m| m.default_range);
    range.left = write_or_read_range(
        regs,
        RANGE_LEFT_APV,
        settings.range_left_apv,
        defaults.map(|d| d.left),
    )?;
    range.right = write_or_read_range(
        regs,
        RANGE_RIGHT_APV,
        settings.range_right_apv,
        defaults.map(|d| d.right),
    )?;
    range.center = write_or_read_range(
        regs,
        RANGE_CENTER_APV,
        settings.range_center_apv,
        defaults.map(|d| d.center),
    )?;

    match settings.fail_safe {
        FailSafe::Pulse(us) => regs.write_register(FAIL_SAFE, us),
        FailSafe::Limp => regs.write_register(FAIL_SAFE, FAIL_SAFE_LIMP),
        FailSafe::HoldPosition => {}
    }

    if settings.power_limit != 100 {
        regs.write_register(POWER_LIMIT, settings.power_limit * 20);
    }

    if settings.overload_protection != 100 {
        regs.write_register(OVERLOAD_PROTECTION, settings.overload_protection);
    }

    if !settings.smart_sense {
        regs.write_register(MYSTERY_DB, MYSTERY_DB_CONST);
        let disable_1 = regs.read_register(SS_DISABLE_1)?;
        regs.write_register(SMART_SENSE_1, disable_1);
        let disable_2 = regs.read_register(SS_DISABLE_2)?;
        regs.write_register(SMART_SENSE_2, disable_2);
    }

    if settings.sensitivity_ratio != SENSITIVITY_RATIO_MAX {
        regs.write_register(SENSITIVITY_RATIO, settings.sensitivity_ratio);
    }

    regs.write_register(SAVE, SAVE_CONST);
    regs.write_register(REBOOT, REBOOT_CONST);

    debug!("Settings written, range now {:?}", range);
    Ok(())
}
