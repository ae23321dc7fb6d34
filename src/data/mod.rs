//! Bundled data: the synthetic sample generator.

pub mod sample;

pub use sample::*;
