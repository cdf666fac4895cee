//! # Error Types
//!
//! Custom error types for the HitecD servo driver using `thiserror`.
//!
//! The first six variants are the driver's stable error kinds; callers match on
//! them to decide what to tell the user. Each one is distinguishable, and none
//! is retried automatically.

use thiserror::Error;

/// Main error type for the HitecD servo driver
#[derive(Debug, Error)]
pub enum ServoError {
    /// The operation needs a prior successful `attach()`
    #[error("attach() was not called, or the call to attach() failed")]
    NotAttached,

    /// Nothing answered on the line
    #[error("No servo detected")]
    NoServo,

    /// The servo did not release the line after responding.
    ///
    /// A booting servo and a missing pull-up resistor look identical on the
    /// wire, so the two causes are reported together.
    #[error(
        "Either the servo is still booting, which takes 1000ms; or the pullup resistor is \
         missing. With a 5V microcontroller, use a 2k pullup resistor to +5V. With a 3.3V \
         microcontroller, use a 1k pullup resistor to +3.3V"
    )]
    BootingOrNoPullup,

    /// Framing or checksum violation from a servo that is present
    #[error("Corrupt response from servo")]
    Corrupt,

    /// Registers read back a combination that matches no known pattern
    #[error("Confusing response from servo")]
    Confused,

    /// Settings write refused for a model whose encoding is not characterized
    #[error("Unsupported model of servo (model number {0})")]
    UnsupportedModel(u16),

    /// Settings rejected before anything was written to the servo
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Capture source errors
    #[error("Capture error: {0}")]
    Capture(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the HitecD servo driver
pub type Result<T> = std::result::Result<T, ServoError>;
