//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - dataset representations (`NumericArray`, `DataTable`, `Payload`, `DatasetHandle`)
//! - format tags and export formats (`FormatTag`, `ExportFormat`)
//! - user-facing selections (`CatalogKind`, `FitMethod`)

pub mod types;

pub use types::*;
