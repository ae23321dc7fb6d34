//! Terminal reports: catalogs, dataset previews, fit summaries, upload results.

pub mod format;

pub use format::*;
