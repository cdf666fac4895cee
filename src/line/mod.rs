//! # Line Module
//!
//! Trait abstraction for the single GPIO line shared by PWM and the serial
//! protocol, so the protocol can run against real pins or a simulated servo.
//!
//! The line has three electrical states from the host's point of view:
//! - driven HIGH
//! - driven LOW (also the idle state between transactions)
//! - released, with the weak internal pull-up enabled, so the servo can pull
//!   it LOW against the external pull-up resistor

#[cfg(test)]
pub mod mocks;

/// Logic level observed on the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

/// Line-level operations needed to talk to the servo
///
/// Implementations must provide a monotonic clock with sub-microsecond
/// resolution and a sleep that can be trusted to a fraction of a bit cell
/// (8.68us at 115200 baud). Busy-waiting is expected.
pub trait LineIo {
    /// Switch the pin to output and drive it HIGH
    fn drive_high(&mut self);

    /// Switch the pin to output and drive it LOW
    fn drive_low(&mut self);

    /// Switch the pin to input with the weak pull-up enabled
    fn release(&mut self);

    /// Sample the current level of the line
    fn read_level(&mut self) -> Level;

    /// Monotonic timestamp in nanoseconds
    fn now_ns(&mut self) -> u64;

    /// Sleep for `ns` nanoseconds
    fn delay_ns(&mut self, ns: u32);

    /// Sleep for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_ns(1_000_000);
        }
    }

    /// Run `f` without being preempted.
    ///
    /// A byte on the wire tolerates only a couple of microseconds of jitter
    /// per bit, so whole frames run inside this block. The default defers to
    /// the platform's `critical_section` implementation; override it where the
    /// line driver has a cheaper way to mask interrupts.
    fn without_preemption<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R
    where
        Self: Sized,
    {
        critical_section::with(|_cs| f(self))
    }
}
