//! Session storage.
//!
//! - directory configuration (`config`)
//! - directory lifecycle: create on first use, clear staging on exit (`storage`)

pub mod config;
pub mod storage;

pub use config::*;
pub use storage::*;
