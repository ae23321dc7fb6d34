//! Plotting.
//!
//! - `figure`: the renderable result model produced by fitting engines
//! - `render`: image export through Plotters (PNG/SVG)
//! - `font`: the embedded font both backends draw text with
//!
//! The TUI chart lives in `tui::plotters_chart` and reuses the same `Figure`.

pub mod figure;
pub mod font;
pub mod render;

pub use figure::*;
pub use render::*;
