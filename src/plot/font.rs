//! Embedded chart font.
//!
//! Plotters is built with `ab_glyph`, which never looks at system fonts: every
//! family a chart asks for must be registered from bytes before drawing. All
//! charts here use the default `sans-serif` family, backed by DejaVu Sans.

use std::sync::OnceLock;

use plotters::style::{FontStyle, register_font};
use tracing::warn;

/// Family name every chart draws its text with.
pub const FONT_FAMILY: &str = "sans-serif";

static DEJAVU_SANS: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

static REGISTERED: OnceLock<bool> = OnceLock::new();

/// Register the embedded font once per process.
///
/// Returns `false` if the font was rejected, in which case charts must be
/// drawn without text.
pub fn ensure_fonts() -> bool {
    *REGISTERED.get_or_init(|| match register_font(FONT_FAMILY, FontStyle::Normal, DEJAVU_SANS) {
        Ok(()) => true,
        Err(_) => {
            warn!("embedded chart font rejected; drawing charts without text");
            false
        }
    })
}
