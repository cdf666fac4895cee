//! # HitecD Protocol Module
//!
//! Implementation of the proprietary serial protocol spoken by Hitec D-series
//! servos on their signal wire.
//!
//! This module handles:
//! - Bit-banged UART bytes at 115200 baud with inverted polarity
//! - Register read/write frame encoding and response decoding
//! - Additive checksums
//! - Servo presence and pull-up detection
//! - The register map

pub mod protocol;
pub mod checksum;
pub mod encoder;
pub mod decoder;
pub mod registers;
pub mod transport;
pub mod link;

pub use link::{RegisterAccess, RegisterLink};
