//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field is optional; missing values take the
//! defaults measured on a D485HW talking to a DPC-11 programmer.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, ServoError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Line timing configuration
///
/// The defaults match the servo's own timing and should only be changed to
/// compensate for a slow or inaccurate host clock.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Width of one bit cell (8680ns is 115200 baud)
    #[serde(default = "default_bit_period_ns")]
    pub bit_period_ns: u32,

    /// How long to wait for the start bit of each response byte
    #[serde(default = "default_start_bit_timeout_ms")]
    pub start_bit_timeout_ms: u32,

    /// Delay between the end of a read request and releasing the line
    #[serde(default = "default_response_settle_ms")]
    pub response_settle_ms: u32,

    /// Idle time after each register write
    #[serde(default = "default_write_settle_ms")]
    pub write_settle_ms: u32,

    /// How long the servo ignores commands after a reboot
    #[serde(default = "default_boot_ms")]
    pub boot_ms: u32,
}

/// Capture (traffic sniffing) configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Binary file holding UART-decoded bytes exported from a logic analyzer
    #[serde(default)]
    pub input: String,

    /// Serial device to sniff live; takes precedence over `input` when set
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,
}

// Default value functions
fn default_bit_period_ns() -> u32 { 8680 }
fn default_start_bit_timeout_ms() -> u32 { 50 }
fn default_response_settle_ms() -> u32 { 14 }
fn default_write_settle_ms() -> u32 { 1 }
fn default_boot_ms() -> u32 { 1000 }

fn default_baud_rate() -> u32 { 115200 }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bit_period_ns: default_bit_period_ns(),
            start_bit_timeout_ms: default_start_bit_timeout_ms(),
            response_settle_ms: default_response_settle_ms(),
            write_settle_ms: default_write_settle_ms(),
            boot_ms: default_boot_ms(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            port: String::new(),
            baud_rate: default_baud_rate(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hitecd_servo::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;

        if self.capture.max_records_per_file == 0 {
            return Err(config_error("max_records_per_file must be greater than 0"));
        }

        if self.capture.log_dir.is_empty() {
            return Err(config_error("capture log_dir cannot be empty"));
        }

        if ![9600, 57600, 115200, 230400].contains(&self.capture.baud_rate) {
            return Err(config_error(
                "baud_rate must be one of: 9600, 57600, 115200, 230400",
            ));
        }

        Ok(())
    }
}

impl TimingConfig {
    /// Validate timing values
    ///
    /// The response settle delay must stay below the servo's 15.2ms response
    /// latency, or the start of the response is missed.
    pub fn validate(&self) -> Result<()> {
        if self.bit_period_ns < 1000 || self.bit_period_ns > 20000 {
            return Err(config_error("bit_period_ns must be between 1000 and 20000"));
        }

        if self.start_bit_timeout_ms == 0 || self.start_bit_timeout_ms > 1000 {
            return Err(config_error("start_bit_timeout_ms must be between 1 and 1000"));
        }

        if self.response_settle_ms == 0 || self.response_settle_ms > 15 {
            return Err(config_error("response_settle_ms must be between 1 and 15"));
        }

        if self.write_settle_ms > 100 {
            return Err(config_error("write_settle_ms must be between 0 and 100"));
        }

        if self.boot_ms == 0 || self.boot_ms > 10000 {
            return Err(config_error("boot_ms must be between 1 and 10000"));
        }

        Ok(())
    }
}

fn config_error(msg: &str) -> ServoError {
    ServoError::Config(toml::de::Error::custom(msg))
}
