//! # Device Session
//!
//! Owns the line to one servo and tracks whether it has been identified.
//!
//! ## Usage
//!
//! ```ignore
//! let mut session = DeviceSession::new(TimingConfig::default());
//! session.attach(line)?;
//!
//! let mut settings = session.read_settings()?;
//! settings.speed = 50;
//! session.write_settings(&settings, false)?;
//! session.wait_for_reboot();
//!
//! session.write_target_microseconds(1500);
//! ```

use tracing::{info, warn};

use crate::config::TimingConfig;
use crate::error::{Result, ServoError};
use crate::line::LineIo;
use crate::protocol::protocol::*;
use crate::protocol::registers::{self, *};
use crate::protocol::RegisterLink;

use super::codec;
use super::models::ModelSpec;
use super::settings::{DeviceSettings, RangeApv};

/// Quarter-microsecond pulse positions of the three range points
pub const QUARTER_MICROS_LEFT: i32 = 4 * PULSE_LEFT_US;
pub const QUARTER_MICROS_CENTER: i32 = 4 * PULSE_CENTER_US;
pub const QUARTER_MICROS_RIGHT: i32 = 4 * PULSE_RIGHT_US;

/// Integer linear map with truncation toward zero
///
/// A zero-width input range maps everything to `out_min`.
pub fn map_range(x: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_max == in_min {
        return out_min;
    }
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Convert an APV to the pulse width that would command it
///
/// # Examples
///
/// ```
/// use hitecd_servo::servo::session::apv_to_quarter_micros;
/// use hitecd_servo::servo::settings::RangeApv;
///
/// let range = RangeApv::new(3381, 8192, 13002);
/// assert_eq!(apv_to_quarter_micros(3381, &range), 3400);
/// assert_eq!(apv_to_quarter_micros(8192, &range), 6000);
/// assert_eq!(apv_to_quarter_micros(13002, &range), 8600);
/// ```
pub fn apv_to_quarter_micros(apv: u16, range: &RangeApv) -> i32 {
    let apv = apv as i32;
    let (left, center, right) = (range.left as i32, range.center as i32, range.right as i32);

    if apv < center {
        map_range(apv, left, center, QUARTER_MICROS_LEFT, QUARTER_MICROS_CENTER)
    } else {
        map_range(apv, center, right, QUARTER_MICROS_CENTER, QUARTER_MICROS_RIGHT)
    }
}

/// State held while a servo is attached
struct Attached<L: LineIo> {
    link: RegisterLink<L>,
    model_number: u16,
    range: RangeApv,
}

/// Session with one servo
///
/// Starts detached. `attach()` takes ownership of the line and identifies
/// the servo; `detach_and_reset()` reboots it and gives the line back.
pub struct DeviceSession<L: LineIo> {
    timing: TimingConfig,
    attached: Option<Attached<L>>,
}

impl<L: LineIo> DeviceSession<L> {
    pub fn new(timing: TimingConfig) -> Self {
        Self {
            timing,
            attached: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Identify the servo on `line` and cache its model and range
    ///
    /// An existing attachment is reset first and its line dropped. On failure
    /// the servo is sent a best-effort REBOOT and the line is dropped.
    ///
    /// # Errors
    ///
    /// Any read error from MODEL_NUMBER or the range registers.
    pub fn attach(&mut self, line: L) -> Result<()> {
        if self.attached.is_some() {
            self.detach_and_reset();
        }

        let mut link = RegisterLink::new(line, self.timing);
        let identity = read_identity(&mut link);

        match identity {
            Ok((model_number, range)) => {
                let name = ModelSpec::lookup(model_number).map(|m| m.name).unwrap_or("unknown");
                info!(
                    "Attached to servo model {} ({}), range {}/{}/{}",
                    model_number, name, range.left, range.center, range.right
                );
                self.attached = Some(Attached {
                    link,
                    model_number,
                    range,
                });
                Ok(())
            }
            Err(e) => {
                warn!("Attach failed: {}", e);
                link.write_raw_register(REBOOT, REBOOT_CONST);
                Err(e)
            }
        }
    }

    /// Reboot the servo and return the line
    ///
    /// The reboot returns the servo to PWM mode. Returns `None` if nothing
    /// was attached.
    pub fn detach_and_reset(&mut self) -> Option<L> {
        let mut attached = self.attached.take()?;
        attached.link.write_raw_register(REBOOT, REBOOT_CONST);
        info!("Detached from servo model {}", attached.model_number);
        Some(attached.link.into_line())
    }

    fn attached_mut(&mut self) -> Result<&mut Attached<L>> {
        self.attached.as_mut().ok_or(ServoError::NotAttached)
    }

    /// Command a position as a pulse width in quarter-microseconds
    ///
    /// Clamped to 850-2150us. Does nothing when detached.
    pub fn write_target_quarter_micros(&mut self, quarter_micros: i32) {
        let attached = match self.attached.as_mut() {
            Some(attached) => attached,
            None => {
                warn!("Ignoring target {} while detached", quarter_micros);
                return;
            }
        };

        let clamped = quarter_micros.clamp(QUARTER_MICROS_LEFT, QUARTER_MICROS_RIGHT);
        let raw = (clamped - TARGET_QUARTER_MICROS_OFFSET) as u16;
        attached.link.write_raw_register(TARGET, raw);
    }

    /// Command a position as a pulse width in microseconds
    pub fn write_target_microseconds(&mut self, micros: i32) {
        self.write_target_quarter_micros(micros.saturating_mul(4));
    }

    /// Measured position in APV units
    pub fn read_current_apv(&mut self) -> Result<u16> {
        self.attached_mut()?.link.read_raw_register(CURRENT_APV)
    }

    /// Measured position as the pulse width that would command it
    pub fn read_current_quarter_micros(&mut self) -> Result<i32> {
        let attached = self.attached_mut()?;
        let apv = attached.link.read_raw_register(CURRENT_APV)?;
        Ok(apv_to_quarter_micros(apv, &attached.range))
    }

    pub fn read_current_microseconds(&mut self) -> Result<i32> {
        Ok(self.read_current_quarter_micros()? / 4)
    }

    /// Model number read at attach time
    pub fn read_model_number(&self) -> Result<u16> {
        self.attached
            .as_ref()
            .map(|a| a.model_number)
            .ok_or(ServoError::NotAttached)
    }

    /// Characterized model of the attached servo
    pub fn model(&self) -> Option<&'static ModelSpec> {
        self.attached
            .as_ref()
            .and_then(|a| ModelSpec::lookup(a.model_number))
    }

    /// Whether settings writes are known to work on the attached servo
    pub fn is_model_supported(&self) -> bool {
        self.model().is_some()
    }

    /// Range currently cached for position conversions
    pub fn range(&self) -> Option<RangeApv> {
        self.attached.as_ref().map(|a| a.range)
    }

    /// Read all settings
    ///
    /// The cached range is refreshed register by register, so range reads
    /// that succeed before a failure are still kept.
    pub fn read_settings(&mut self) -> Result<DeviceSettings> {
        let attached = self.attached_mut()?;
        codec::read_settings(&mut attached.link, &mut attached.range)
    }

    /// Validate and write settings, then save and reboot the servo
    ///
    /// Nothing is written unless the session is attached, the model is
    /// supported (or `allow_unsupported_model` is set) and the settings are
    /// valid. The servo is unresponsive for the boot period afterwards; use
    /// [`Self::wait_for_reboot`].
    pub fn write_settings(
        &mut self,
        settings: &DeviceSettings,
        allow_unsupported_model: bool,
    ) -> Result<()> {
        let attached = self.attached_mut()?;
        let model = ModelSpec::lookup(attached.model_number);

        if model.is_none() && !allow_unsupported_model {
            return Err(ServoError::UnsupportedModel(attached.model_number));
        }

        settings.validate(model)?;

        info!("Writing settings to servo model {}", attached.model_number);
        codec::write_settings(&mut attached.link, settings, model, &mut attached.range)
    }

    /// Read any register, for diagnostics
    pub fn read_raw_register(&mut self, addr: u8) -> Result<u16> {
        self.attached_mut()?.link.read_raw_register(addr)
    }

    /// Write any register, for diagnostics
    pub fn write_raw_register(&mut self, addr: u8, value: u16) -> Result<()> {
        self.attached_mut()?.link.write_raw_register(addr, value);
        Ok(())
    }

    /// Sleep through the servo's boot period
    pub fn wait_for_reboot(&mut self) {
        if let Some(attached) = self.attached.as_mut() {
            attached.link.wait_for_boot();
        }
    }

    /// Sleep on the line's clock
    pub fn wait_ms(&mut self, ms: u32) {
        if let Some(attached) = self.attached.as_mut() {
            attached.link.line_mut().delay_ms(ms);
        }
    }

    /// Read every diagnostic register, keeping going past failures
    pub fn dump_registers(&mut self) -> Result<Vec<(u8, Result<u16>)>> {
        let attached = self.attached_mut()?;
        let dump = registers::DIAGNOSTIC_REGISTERS
            .iter()
            .map(|&addr| (addr, attached.link.read_raw_register(addr)))
            .collect();
        Ok(dump)
    }
}

/// Read the model number and range registers
fn read_identity<L: LineIo>(link: &mut RegisterLink<L>) -> Result<(u16, RangeApv)> {
    let model_number = link.read_raw_register(MODEL_NUMBER)?;
    let left = link.read_raw_register(RANGE_LEFT_APV)?;
    let right = link.read_raw_register(RANGE_RIGHT_APV)?;
    let center = link.read_raw_register(RANGE_CENTER_APV)?;
    Ok((model_number, RangeApv { left, center, right }))
}
