//! # Device Settings
//!
//! The user-facing view of a servo's EEPROM settings, as shown by the Hitec
//! DPC-11 programmer.
//!
//! ## Range
//!
//! The servo maps pulse widths onto angle potentiometer values (APV, 0 to
//! 16383) through three points:
//!
//! | Pulse | Register |
//! |-------|----------|
//! | 850us | RANGE_LEFT_APV |
//! | 1500us | RANGE_CENTER_APV |
//! | 2150us | RANGE_RIGHT_APV |
//!
//! Range values are interpreted in the servo's current direction: flipping
//! the direction mirrors the APV scale, so the range has to be mirrored too
//! (see [`DeviceSettings::flip_direction`]).
//!
//! ## Usage
//!
//! ```
//! use hitecd_servo::servo::settings::{DeviceSettings, FailSafe};
//!
//! let mut settings = DeviceSettings::default();
//! settings.speed = 50;
//! settings.fail_safe = FailSafe::Pulse(1500);
//! assert!(settings.validate(None).is_ok());
//! ```

use crate::error::{Result, ServoError};
use crate::protocol::protocol::APV_MAX;
use crate::protocol::registers;

use super::models::ModelSpec;

/// Legal soft start percentages and the register values that encode them
pub const SOFT_START_TABLE: [(u8, u16); 5] = [
    (20, registers::SOFT_START_20),
    (40, registers::SOFT_START_40),
    (60, registers::SOFT_START_60),
    (80, registers::SOFT_START_80),
    (100, registers::SOFT_START_100),
];

/// Overload protection values the DPC-11 offers, in percent
pub const OVERLOAD_PROTECTION_VALUES: [u16; 6] = [10, 20, 30, 40, 50, 100];

/// Shortest and longest fail-safe pulse
pub const FAIL_SAFE_PULSE_MIN_US: u16 = 850;
pub const FAIL_SAFE_PULSE_MAX_US: u16 = 2150;

/// Three-point range in APV units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeApv {
    pub left: u16,
    pub center: u16,
    pub right: u16,
}

impl RangeApv {
    #[must_use]
    pub const fn new(left: u16, center: u16, right: u16) -> Self {
        Self { left, center, right }
    }

    /// The same physical range expressed in the opposite direction
    ///
    /// # Examples
    ///
    /// ```
    /// use hitecd_servo::servo::settings::RangeApv;
    ///
    /// let range = RangeApv::new(3381, 8192, 13002);
    /// assert_eq!(range.flipped(), RangeApv::new(3381, 8191, 13002));
    /// assert_eq!(range.flipped().flipped(), range);
    /// ```
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            left: APV_MAX - self.right,
            center: APV_MAX - self.center,
            right: APV_MAX - self.left,
        }
    }
}

/// What the servo does when the PWM signal disappears
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailSafe {
    /// Keep holding the last position
    #[default]
    HoldPosition,
    /// Stop driving the motor
    Limp,
    /// Move to this pulse width, 850 to 2150 microseconds
    Pulse(u16),
}

/// Servo settings
///
/// `Default` is the factory configuration of a D485HW.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    /// User identifier, 0 to 254
    pub id: u8,

    pub counterclockwise: bool,

    /// Percent of full speed, 10 to 100 in steps of 10
    ///
    /// The servo stores speed in steps of 5, so a read may report an odd
    /// multiple of 5 that was written by other tools; such values are not
    /// accepted for writing.
    pub speed: u8,

    /// 1 to 10; higher values ignore larger position errors
    pub deadband: u8,

    /// Percent: 20, 40, 60, 80 or 100
    pub soft_start: u8,

    /// `None` leaves the model default in place
    pub range_left_apv: Option<u16>,
    pub range_right_apv: Option<u16>,
    pub range_center_apv: Option<u16>,

    pub fail_safe: FailSafe,

    /// Percent of full power
    pub power_limit: u16,

    /// Percent of power kept when overloaded; 100 disables protection
    pub overload_protection: u16,

    pub smart_sense: bool,

    /// 819 to 4095
    pub sensitivity_ratio: u16,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            id: 0,
            counterclockwise: false,
            speed: 100,
            deadband: 1,
            soft_start: 20,
            range_left_apv: None,
            range_right_apv: None,
            range_center_apv: None,
            fail_safe: FailSafe::HoldPosition,
            power_limit: 100,
            overload_protection: 100,
            smart_sense: true,
            sensitivity_ratio: registers::SENSITIVITY_RATIO_MAX,
        }
    }
}

impl DeviceSettings {
    /// The explicit range, with `None` fields filled in from `defaults`
    ///
    /// Returns `None` if any field is unset and there are no defaults.
    #[must_use]
    pub fn resolved_range(&self, defaults: Option<RangeApv>) -> Option<RangeApv> {
        Some(RangeApv {
            left: self.range_left_apv.or(defaults.map(|d| d.left))?,
            center: self.range_center_apv.or(defaults.map(|d| d.center))?,
            right: self.range_right_apv.or(defaults.map(|d| d.right))?,
        })
    }

    /// Reverse the direction while keeping the same physical range
    ///
    /// Unset range fields are resolved against the model defaults first; with
    /// no model they are left unset.
    pub fn flip_direction(&mut self, model: Option<&ModelSpec>) {
        self.counterclockwise = !self.counterclockwise;

        let defaults = model.map(|m| m.default_range);
        if let Some(range) = self.resolved_range(defaults) {
            let flipped = range.flipped();
            self.range_left_apv = Some(flipped.left);
            self.range_center_apv = Some(flipped.center);
            self.range_right_apv = Some(flipped.right);
        }
    }

    /// Check every field against the values the servo accepts
    ///
    /// # Errors
    ///
    /// Returns `InvalidSettings` naming the first offending field.
    pub fn validate(&self, model: Option<&ModelSpec>) -> Result<()> {
        if self.id > 254 {
            return Err(invalid(format!("id must be 0-254, got {}", self.id)));
        }

        if !(10..=100).contains(&self.speed) || self.speed % 10 != 0 {
            return Err(invalid(format!(
                "speed must be a multiple of 10 between 10 and 100, got {}",
                self.speed
            )));
        }

        if !(1..=10).contains(&self.deadband) {
            return Err(invalid(format!("deadband must be 1-10, got {}", self.deadband)));
        }

        if soft_start_register(self.soft_start).is_none() {
            return Err(invalid(format!(
                "soft_start must be 20, 40, 60, 80 or 100, got {}",
                self.soft_start
            )));
        }

        for (name, apv) in [
            ("range_left_apv", self.range_left_apv),
            ("range_center_apv", self.range_center_apv),
            ("range_right_apv", self.range_right_apv),
        ] {
            if let Some(apv) = apv {
                if apv > APV_MAX {
                    return Err(invalid(format!("{} must be 0-{}, got {}", name, APV_MAX, apv)));
                }
            }
        }

        if let Some(range) = self.resolved_range(model.map(|m| m.default_range)) {
            if !(range.left < range.center && range.center < range.right) {
                return Err(invalid(format!(
                    "range must satisfy left < center < right, got {} / {} / {}",
                    range.left, range.center, range.right
                )));
            }
        }

        if let FailSafe::Pulse(us) = self.fail_safe {
            if !(FAIL_SAFE_PULSE_MIN_US..=FAIL_SAFE_PULSE_MAX_US).contains(&us) {
                return Err(invalid(format!(
                    "fail-safe pulse must be {}-{}us, got {}",
                    FAIL_SAFE_PULSE_MIN_US, FAIL_SAFE_PULSE_MAX_US, us
                )));
            }
        }

        if self.power_limit > 100 {
            return Err(invalid(format!(
                "power_limit must be 0-100, got {}",
                self.power_limit
            )));
        }

        if !OVERLOAD_PROTECTION_VALUES.contains(&self.overload_protection) {
            return Err(invalid(format!(
                "overload_protection must be one of {:?}, got {}",
                OVERLOAD_PROTECTION_VALUES, self.overload_protection
            )));
        }

        if !(registers::SENSITIVITY_RATIO_MIN..=registers::SENSITIVITY_RATIO_MAX)
            .contains(&self.sensitivity_ratio)
        {
            return Err(invalid(format!(
                "sensitivity_ratio must be {}-{}, got {}",
                registers::SENSITIVITY_RATIO_MIN,
                registers::SENSITIVITY_RATIO_MAX,
                self.sensitivity_ratio
            )));
        }

        Ok(())
    }
}

/// Register value for a soft start percentage
pub fn soft_start_register(percent: u8) -> Option<u16> {
    SOFT_START_TABLE
        .iter()
        .find(|&&(p, _)| p == percent)
        .map(|&(_, raw)| raw)
}

/// Soft start percentage for a register value
pub fn soft_start_percent(raw: u16) -> Option<u8> {
    SOFT_START_TABLE
        .iter()
        .find(|&&(_, r)| r == raw)
        .map(|&(percent, _)| percent)
}

fn invalid(msg: String) -> ServoError {
    ServoError::InvalidSettings(msg)
}
