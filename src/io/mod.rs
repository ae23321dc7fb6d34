//! Input/output.
//!
//! - dataset decode/encode through the format table (`dataset`)
//! - result exports into the results directory (`export`)

pub mod dataset;
pub mod export;

pub use dataset::*;
pub use export::*;
