//! # Register Map
//!
//! Register addresses and magic values, reverse-engineered from traffic
//! between a Hitec DPC-11 programmer and a D485HW. The names are descriptive
//! only; Hitec publishes none.
//!
//! All valid registers have even addresses. Reading an odd address returns the
//! high byte of the register below it combined with the low byte of the
//! register above it.

/// Servo model number, e.g. 485 for a D485HW
pub const MODEL_NUMBER: u8 = 0x00;

/// Measured position in APV units
pub const CURRENT_APV: u8 = 0x0C;

/// Move command: `3000 + 4 * (pulse_us - 1500)`. Reads back in APV units.
pub const TARGET: u8 = 0x1E;

/// User identifier, 0-254
pub const ID: u8 = 0x32;

pub const SMART_SENSE_1: u8 = 0x44;

/// Writing `REBOOT_CONST` restarts the servo; it ignores commands for 1000ms
pub const REBOOT: u8 = 0x46;
pub const REBOOT_CONST: u16 = 0x0001;

pub const FAIL_SAFE: u8 = 0x4C;
pub const FAIL_SAFE_LIMP: u16 = 0;
pub const FAIL_SAFE_OFF: u16 = 1;

pub const DEADBAND_1: u8 = 0x4E;

/// 0x0FFF is max speed; otherwise units of 5%
pub const SPEED: u8 = 0x54;
pub const SPEED_MAX: u16 = 0x0FFF;

/// 0 to 2000; the DPC-11 writes 0x0FFF for max power
pub const POWER_LIMIT: u8 = 0x56;
pub const POWER_LIMIT_MAX: u16 = 0x0FFF;

pub const DIRECTION: u8 = 0x5E;
pub const DIRECTION_CLOCKWISE: u16 = 0;
pub const DIRECTION_COUNTERCLOCKWISE: u16 = 1;

pub const SOFT_START: u8 = 0x60;
pub const SOFT_START_20: u16 = 1;
pub const SOFT_START_40: u16 = 3;
pub const SOFT_START_60: u16 = 6;
pub const SOFT_START_80: u16 = 8;
pub const SOFT_START_100: u16 = 100;

pub const SENSITIVITY_RATIO: u8 = 0x64;
pub const SENSITIVITY_RATIO_MIN: u16 = 0x0333;
pub const SENSITIVITY_RATIO_MAX: u16 = 0x0FFF;

pub const DEADBAND_2: u8 = 0x66;
pub const DEADBAND_3: u8 = 0x68;

pub const SMART_SENSE_2: u8 = 0x6C;

/// Writing `FACTORY_RESET_CONST` restores factory settings in RAM
pub const FACTORY_RESET: u8 = 0x6E;
pub const FACTORY_RESET_CONST: u16 = 0x0F0F;

/// Writing `SAVE_CONST` flushes settings to EEPROM
pub const SAVE: u8 = 0x70;
pub const SAVE_CONST: u16 = 0xFFFF;

/// The DPC-11 writes this whenever it changes deadband or smart sense.
/// Always reads back as 0.
pub const MYSTERY_DB: u8 = 0x72;
pub const MYSTERY_DB_CONST: u16 = 0x4E54;

/// Read-only; the values SMART_SENSE_1/2 hold when smart sense is off
pub const SS_DISABLE_2: u8 = 0x8A;
pub const SS_DISABLE_1: u8 = 0x8C;

/// The DPC-11 writes these after a factory reset and whenever it changes
/// overload protection
pub const MYSTERY_OP1: u8 = 0x98;
pub const MYSTERY_OP1_CONST: u16 = 200;
pub const MYSTERY_OP2: u8 = 0x9A;
pub const MYSTERY_OP2_CONST: u16 = 3;

/// Percentage of power kept when overloaded; 100 disables protection
pub const OVERLOAD_PROTECTION: u8 = 0x9C;

pub const RANGE_RIGHT_APV: u8 = 0xB0;
pub const RANGE_LEFT_APV: u8 = 0xB2;
pub const RANGE_CENTER_APV: u8 = 0xC2;

/// Read-only; the values SMART_SENSE_1/2 hold when smart sense is on
pub const SS_ENABLE_2: u8 = 0xD4;
pub const SS_ENABLE_1: u8 = 0xD6;

/// Registers worth reporting when investigating an unsupported model
pub const DIAGNOSTIC_REGISTERS: &[u8] = &[
    // Model number
    MODEL_NUMBER,
    // Settings, to compare factory defaults across models
    ID, SMART_SENSE_1, FAIL_SAFE, DEADBAND_1, SPEED, DIRECTION, SOFT_START,
    SENSITIVITY_RATIO, DEADBAND_2, DEADBAND_3, SMART_SENSE_2,
    OVERLOAD_PROTECTION, RANGE_RIGHT_APV, RANGE_LEFT_APV, RANGE_CENTER_APV,
    // Registers that read a constant on the D485HW
    0x04, 0x06, SS_DISABLE_2, SS_DISABLE_1, 0xC4, SS_ENABLE_2, SS_ENABLE_1,
    // Registers the DPC-11 writes with constants on the D485HW
    0x50, 0x52, POWER_LIMIT, MYSTERY_DB, MYSTERY_OP1, MYSTERY_OP2,
];

/// Symbolic name of a register, for logs and capture output
pub fn name(addr: u8) -> Option<&'static str> {
    let name = match addr {
        MODEL_NUMBER => "MODEL_NUMBER",
        CURRENT_APV => "CURRENT_APV",
        TARGET => "TARGET",
        ID => "ID",
        SMART_SENSE_1 => "SMART_SENSE_1",
        REBOOT => "REBOOT",
        FAIL_SAFE => "FAIL_SAFE",
        DEADBAND_1 => "DEADBAND_1",
        SPEED => "SPEED",
        POWER_LIMIT => "POWER_LIMIT",
        DIRECTION => "DIRECTION",
        SOFT_START => "SOFT_START",
        SENSITIVITY_RATIO => "SENSITIVITY_RATIO",
        DEADBAND_2 => "DEADBAND_2",
        DEADBAND_3 => "DEADBAND_3",
        SMART_SENSE_2 => "SMART_SENSE_2",
        FACTORY_RESET => "FACTORY_RESET",
        SAVE => "SAVE",
        MYSTERY_DB => "MYSTERY_DB",
        SS_DISABLE_2 => "SS_DISABLE_2",
        SS_DISABLE_1 => "SS_DISABLE_1",
        MYSTERY_OP1 => "MYSTERY_OP1",
        MYSTERY_OP2 => "MYSTERY_OP2",
        OVERLOAD_PROTECTION => "OVERLOAD_PROTECTION",
        RANGE_RIGHT_APV => "RANGE_RIGHT_APV",
        RANGE_LEFT_APV => "RANGE_LEFT_APV",
        RANGE_CENTER_APV => "RANGE_CENTER_APV",
        SS_ENABLE_2 => "SS_ENABLE_2",
        SS_ENABLE_1 => "SS_ENABLE_1",
        _ => return None,
    };
    Some(name)
}

/// Register name, or `REG[0xNN]` for unnamed registers
pub fn display_name(addr: u8) -> String {
    match name(addr) {
        Some(name) => name.to_string(),
        None => format!("REG[0x{:02X}]", addr),
    }
}
