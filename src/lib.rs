//! `alps-fit` library crate.
//!
//! The binary (`alps`) is a thin wrapper around this library so that:
//!
//! - the session pipeline is testable without spawning processes
//! - the CLI and the TUI share one set of components
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod form;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
pub mod session;
pub mod source;
pub mod tui;
