//! # Servo Models
//!
//! Per-model factory defaults. Only models whose register encoding has been
//! verified against the DPC-11 are listed; settings writes to anything else
//! are refused unless explicitly allowed.

use crate::protocol::protocol::APV_MAX;

use super::settings::RangeApv;

/// Factory characteristics of one servo model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub model_number: u16,
    pub name: &'static str,

    /// Range registers as shipped
    pub default_range: RangeApv,

    /// Smallest left APV reachable without hitting the physical stop
    pub widest_left_apv: u16,
}

/// Characterized models
pub const MODELS: &[ModelSpec] = &[ModelSpec {
    model_number: 485,
    name: "D485HW",
    default_range: RangeApv::new(3381, 8192, 13002),
    // The physical stop is at 731; keep a margin of 50
    widest_left_apv: 731 + 50,
}];

impl ModelSpec {
    /// Find a model by the number in its MODEL_NUMBER register
    #[must_use]
    pub fn lookup(model_number: u16) -> Option<&'static ModelSpec> {
        MODELS.iter().find(|m| m.model_number == model_number)
    }

    /// Widest range that stays clear of the physical stops
    #[must_use]
    pub fn widest_range(&self) -> RangeApv {
        RangeApv::new(
            self.widest_left_apv,
            (APV_MAX + 1) / 2,
            APV_MAX - self.widest_left_apv,
        )
    }
}
