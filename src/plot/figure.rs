//! Render-only figure description.
//!
//! The fitting engine produces a `Figure`; renderers (image export, TUI chart)
//! consume it. Nothing in the session pipeline looks inside.

/// Scatter series (observations).
#[derive(Debug, Clone, PartialEq)]
pub struct Scatter {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Line series (predictions, signals).
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

/// Shaded area between two curves sharing the same x values.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub label: String,
    pub x: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// One set of axes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub scatter: Vec<Scatter>,
    pub curves: Vec<Curve>,
    pub bands: Vec<Band>,
}

impl Panel {
    pub fn new(title: impl Into<String>, x_label: impl Into<String>, y_label: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            ..Self::default()
        }
    }

    pub fn with_scatter(mut self, label: impl Into<String>, points: Vec<(f64, f64)>) -> Self {
        self.scatter.push(Scatter {
            label: label.into(),
            points,
        });
        self
    }

    pub fn with_curve(mut self, label: impl Into<String>, x: &[f64], y: &[f64]) -> Self {
        self.curves.push(Curve {
            label: label.into(),
            points: x.iter().copied().zip(y.iter().copied()).collect(),
        });
        self
    }

    pub fn with_band(mut self, label: impl Into<String>, x: &[f64], lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.bands.push(Band {
            label: label.into(),
            x: x.to_vec(),
            lower,
            upper,
        });
        self
    }

    /// Data bounds over every series, padded by 5% so markers aren't clipped.
    ///
    /// Returns `None` when the panel has no finite data.
    pub fn bounds(&self) -> Option<([f64; 2], [f64; 2])> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for s in &self.scatter {
            for &(x, y) in &s.points {
                xs.push(x);
                ys.push(y);
            }
        }
        for c in &self.curves {
            for &(x, y) in &c.points {
                xs.push(x);
                ys.push(y);
            }
        }
        for b in &self.bands {
            xs.extend_from_slice(&b.x);
            ys.extend_from_slice(&b.lower);
            ys.extend_from_slice(&b.upper);
        }

        let x = padded_range(&xs)?;
        let y = padded_range(&ys)?;
        Some((x, y))
    }
}

/// A complete renderable result (one or more panels side by side).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Figure {
    pub panels: Vec<Panel>,
}

impl Figure {
    pub fn new(panels: Vec<Panel>) -> Self {
        Self { panels }
    }
}

fn padded_range(values: &[f64]) -> Option<[f64; 2]> {
    let (lo, hi) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    let span = hi - lo;
    let pad = if span > 1e-12 { 0.05 * span } else { 0.5 };
    Some([lo - pad, hi + pad])
}
