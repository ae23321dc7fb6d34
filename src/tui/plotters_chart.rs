//! Plotters-powered figure panel widget for Ratatui.
//!
//! Why Plotters instead of Ratatui's built-in `Chart` widget?
//! - nicer axis + mesh rendering
//! - less manual work for ticks/labels
//! - the same `Panel` drives the PNG/SVG exports, so the terminal view and the
//!   exported image show the same series
//!
//! We render Plotters output into the Ratatui buffer using `plotters-ratatui-backend`.

use plotters::prelude::*;
use plotters_ratatui_backend::widget_fn;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::Widget,
};

use crate::plot::Panel;
use crate::plot::font::{FONT_FAMILY, ensure_fonts};

/// Curve colors, cycled in series order. High contrast for terminals.
const PALETTE: [RGBColor; 4] = [
    RGBColor(0, 255, 255),
    RGBColor(255, 255, 0),
    RGBColor(255, 0, 255),
    RGBColor(0, 255, 0),
];

/// Renders one figure panel.
///
/// All bounds come from `Panel::bounds`; the render call only draws.
pub struct PanelChart<'a> {
    pub panel: &'a Panel,
}

impl<'a> Widget for PanelChart<'a> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        // When the available area is too small, Plotters may fail to build a chart.
        // In that case, we render a small hint rather than panicking.
        if area.width < 20 || area.height < 8 {
            buf.set_string(
                area.x,
                area.y,
                "Chart area too small (resize terminal).",
                Style::default().fg(Color::Yellow),
            );
            return;
        }

        let Some(([x0, x1], [y0, y1])) = self.panel.bounds() else {
            buf.set_string(area.x, area.y, "No data to draw.", Style::default().fg(Color::Yellow));
            return;
        };
        let panel = self.panel;
        ensure_fonts();

        let widget = widget_fn(move |root| {
            let mut chart = ChartBuilder::on(&root)
                .margin(1)
                // Terminal cells are low-res, so keep label areas compact.
                .set_label_area_size(LabelAreaPosition::Left, 6)
                .set_label_area_size(LabelAreaPosition::Bottom, 3)
                .build_cartesian_2d(x0..x1, y0..y1)?;

            chart
                .configure_mesh()
                .disable_x_mesh()
                .disable_y_mesh()
                .x_desc(panel.x_label.as_str())
                .y_desc(panel.y_label.as_str())
                .x_labels(5)
                .y_labels(5)
                .x_label_formatter(&|v| format!("{v:.1}"))
                .y_label_formatter(&|v| format!("{v:.2}"))
                .label_style((FONT_FAMILY, 10).into_font().color(&WHITE))
                .axis_style(&WHITE)
                .bold_line_style(&WHITE)
                .draw()?;

            // Interval edges as dim lines; filled areas swamp a terminal cell grid.
            let band_color = RGBColor(110, 110, 110);
            for band in &panel.bands {
                let lower = band.x.iter().copied().zip(band.lower.iter().copied());
                let upper = band.x.iter().copied().zip(band.upper.iter().copied());
                chart.draw_series(LineSeries::new(lower, &band_color))?;
                chart.draw_series(LineSeries::new(upper, &band_color))?;
            }

            for (i, curve) in panel.curves.iter().enumerate() {
                let color = PALETTE[i % PALETTE.len()];
                chart.draw_series(LineSeries::new(curve.points.iter().copied(), &color))?;
            }

            // `Pixel` rather than `Circle`: the ratatui backend maps circle radii
            // in normalized canvas units, producing huge markers.
            for (i, scatter) in panel.scatter.iter().enumerate() {
                let color = if i == 0 { WHITE } else { RGBColor(255, 0, 0) };
                chart.draw_series(scatter.points.iter().map(|&(x, y)| Pixel::new((x, y), color)))?;
            }

            Ok(())
        });

        widget.render(area, buf);
    }
}
