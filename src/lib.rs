//! # HitecD Servo Library
//!
//! Program Hitec D-series servos over their single-wire serial protocol.
//!
//! The servo's signal wire doubles as a half-duplex serial line. This library
//! bit-bangs that protocol over a [`line::LineIo`] implementation to read and
//! write the same settings as Hitec's DPC-11 programmer, and decodes sniffed
//! traffic for reverse engineering.

pub mod config;
pub mod error;
pub mod protocol;
pub mod servo;
pub mod line;
pub mod capture;
