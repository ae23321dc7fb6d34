//! Figure rendering to image files with Plotters.
//!
//! PNG goes through `BitMapBackend`, SVG through `SVGBackend`; both share the
//! same drawing routine and carry the same caption, axis labels and legend.
//! Text is rasterized with the embedded font from `plot::font`.

use std::error::Error;
use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;
use tracing::debug;

use crate::domain::ImageFormat;
use crate::error::PipelineError;
use crate::plot::figure::{Figure, Panel};
use crate::plot::font::{FONT_FAMILY, ensure_fonts};

/// Something that can turn a `Figure` into an image file.
pub trait Renderer {
    fn render(&self, figure: &Figure, path: &Path, format: ImageFormat) -> Result<(), PipelineError>;
}

/// Default renderer: one Plotters chart per panel, laid out horizontally.
#[derive(Debug, Clone, Copy)]
pub struct PlottersRenderer {
    /// Size of a single panel in pixels.
    pub panel_size: (u32, u32),
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        Self {
            panel_size: (1200, 700),
        }
    }
}

impl Renderer for PlottersRenderer {
    fn render(&self, figure: &Figure, path: &Path, format: ImageFormat) -> Result<(), PipelineError> {
        let n = figure.panels.len().max(1) as u32;
        let size = (self.panel_size.0 * n, self.panel_size.1);
        let with_text = ensure_fonts();

        let result = match format {
            ImageFormat::Png => draw_figure(BitMapBackend::new(path, size).into_drawing_area(), figure, with_text),
            ImageFormat::Svg => draw_figure(SVGBackend::new(path, size).into_drawing_area(), figure, with_text),
        };

        result.map_err(|e| {
            PipelineError::io(
                format!("Failed to render figure to '{}'", path.display()),
                std::io::Error::other(e.to_string()),
            )
        })?;
        debug!(path = %path.display(), ?format, "figure rendered");
        Ok(())
    }
}

fn draw_figure<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    figure: &Figure,
    with_text: bool,
) -> Result<(), Box<dyn Error>>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let areas = root.split_evenly((1, figure.panels.len().max(1)));
    for (panel, area) in figure.panels.iter().zip(areas.iter()) {
        draw_panel(area, panel, with_text)?;
    }
    root.present()?;
    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    with_text: bool,
) -> Result<(), Box<dyn Error>>
where
    DB::ErrorType: 'static,
{
    let Some(([x0, x1], [y0, y1])) = panel.bounds() else {
        return Ok(());
    };

    // Without label areas the mesh skips tick labels entirely.
    let mut builder = ChartBuilder::on(area);
    builder.margin(16);
    if with_text {
        builder
            .caption(&panel.title, (FONT_FAMILY, 28))
            .x_label_area_size(48)
            .y_label_area_size(72);
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1)?;

    let mut mesh = chart.configure_mesh();
    if with_text {
        mesh.x_desc(panel.x_label.as_str())
            .y_desc(panel.y_label.as_str())
            .label_style((FONT_FAMILY, 18));
    }
    mesh.draw()?;

    for band in &panel.bands {
        let mut outline: Vec<(f64, f64)> = band.x.iter().copied().zip(band.upper.iter().copied()).collect();
        outline.extend(band.x.iter().copied().zip(band.lower.iter().copied()).rev());
        chart
            .draw_series(std::iter::once(Polygon::new(outline, BLACK.mix(0.2).filled())))?
            .label(band.label.as_str())
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 16, y + 5)], BLACK.mix(0.2).filled()));
    }

    for (idx, curve) in panel.curves.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(LineSeries::new(curve.points.iter().copied(), color.stroke_width(4)))?
            .label(curve.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(4)));
    }

    for (idx, scatter) in panel.scatter.iter().enumerate() {
        // Offset the palette so scatter colors don't collide with curves.
        let color = Palette99::pick(idx + panel.curves.len()).to_rgba();
        chart
            .draw_series(scatter.points.iter().map(|&p| Circle::new(p, 4, color.filled())))?
            .label(scatter.label.as_str())
            .legend(move |(x, y)| Circle::new((x + 8, y), 4, color.filled()));
    }

    if with_text {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    Ok(())
}
