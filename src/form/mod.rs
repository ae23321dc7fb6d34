//! The parameterized compute form.
//!
//! - `params`: controls, presets, and the cross-field `clamp` rule
//! - `compute`: submit → engine → current result, plus export gating

pub mod compute;
pub mod params;

pub use compute::*;
pub use params::*;
