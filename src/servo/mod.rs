//! # Servo Module
//!
//! Device-level operations on one Hitec D-series servo.
//!
//! This module handles:
//! - Attaching to a servo and identifying its model
//! - Position commands and readback
//! - Reading and writing the settings a DPC-11 programmer exposes
//! - Moving gently to arbitrary positions and measuring the physical range

pub mod models;
pub mod settings;
pub mod codec;
pub mod session;
pub mod gentle;

pub use models::ModelSpec;
pub use session::DeviceSession;
pub use settings::{DeviceSettings, FailSafe, RangeApv};
