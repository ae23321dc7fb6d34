//! Data source selection: sample/personal catalogs, uploads, and
//! dataset-changed notifications.

pub mod selector;

pub use selector::*;
