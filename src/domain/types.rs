//! Shared domain types.
//!
//! These types are intentionally small and immutable once built so they can be:
//!
//! - shared read-only between the data source selector and the compute form
//! - encoded to / decoded from the on-disk dataset formats
//! - handed to a fitting engine without copying

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// On-disk dataset encodings understood by the dataset resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatTag {
    /// Binary serialized numeric array (`.p`).
    PickledArray,
    /// Comma-separated text with an optional header row (`.csv`, `.txt`).
    DelimitedTable,
}

impl FormatTag {
    pub const ALL: [FormatTag; 2] = [FormatTag::PickledArray, FormatTag::DelimitedTable];

    /// File extensions (lowercase, no dot) mapped to this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FormatTag::PickledArray => &["p"],
            FormatTag::DelimitedTable => &["csv", "txt"],
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            FormatTag::PickledArray => "pickled-array",
            FormatTag::DelimitedTable => "delimited-table",
        }
    }
}

/// Lowercased extension of `path` (without the dot), or `""` if it has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// A dense numeric array in row-major order.
///
/// `shape` is kept verbatim so arbitrary-rank arrays survive an
/// encode/decode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericArray {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NumericArray {
    /// Build an array, checking that `shape` accounts for every element.
    ///
    /// Shapes come from untrusted files, so every partial product is checked;
    /// `n_cols` relies on the trailing axes fitting in a `usize` as well.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, String> {
        let tail = shape.get(1..).unwrap_or(&[]);
        let (Some(expected), Some(_)) = (checked_len(&shape), checked_len(tail)) else {
            return Err(format!("shape {shape:?} overflows the addressable element count"));
        };
        if expected != data.len() {
            return Err(format!(
                "shape {shape:?} expects {expected} elements, found {}",
                data.len()
            ));
        }
        Ok(Self { shape, data })
    }

    /// Build a 2-D array from equally sized rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, String> {
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(format!(
                "row {idx} has {} values, expected {n_cols}",
                row.len()
            ));
        }
        let data = rows.iter().flatten().copied().collect();
        Self::new(vec![rows.len(), n_cols], data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Number of rows (first axis); a scalar counts as one row.
    pub fn n_rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    /// Number of columns for a 2-D array; 1-D arrays have a single column.
    pub fn n_cols(&self) -> usize {
        match self.shape.len() {
            0 | 1 => 1,
            _ => self.shape[1..].iter().product(),
        }
    }

    /// Row `i` as a slice (rank >= 1).
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        let cols = self.n_cols();
        self.data.get(i * cols..(i + 1) * cols)
    }
}

fn checked_len(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d))
}

/// A column-oriented numeric table with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    headers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, String> {
        if headers.len() != columns.len() {
            return Err(format!(
                "{} headers for {} columns",
                headers.len(),
                columns.len()
            ));
        }
        let n_rows = columns.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, _)) = columns.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
            return Err(format!("column '{}' has a different length", headers[idx]));
        }
        Ok(Self { headers, columns })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let idx = self.headers.iter().position(|h| h == name)?;
        Some(&self.columns[idx])
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Vec::len).unwrap_or(0)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, i: usize) -> Option<Vec<f64>> {
        if i >= self.n_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| c[i]).collect())
    }
}

/// Decoded dataset contents.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Array(NumericArray),
    Table(DataTable),
}

impl Payload {
    pub fn n_rows(&self) -> usize {
        match self {
            Payload::Array(a) => a.n_rows(),
            Payload::Table(t) => t.n_rows(),
        }
    }

    pub fn n_cols(&self) -> usize {
        match self {
            Payload::Array(a) => a.n_cols(),
            Payload::Table(t) => t.n_cols(),
        }
    }

    /// The first `n` rows, for previews.
    pub fn head(&self, n: usize) -> Vec<Vec<f64>> {
        let n = n.min(self.n_rows());
        (0..n)
            .filter_map(|i| match self {
                Payload::Array(a) => a.row(i).map(<[f64]>::to_vec),
                Payload::Table(t) => t.row(i),
            })
            .collect()
    }

    /// Interpret the payload as an `(x, y)` series.
    ///
    /// - 2-D array / table: x = first column, y = second column
    /// - 1-D array: x = row index, y = value
    pub fn series(&self) -> Result<Series, String> {
        match self {
            Payload::Array(a) if a.shape().len() == 1 => Ok(Series {
                x: (0..a.data().len()).map(|i| i as f64).collect(),
                y: a.data().to_vec(),
            }),
            Payload::Array(a) if a.shape().len() == 2 && a.n_cols() >= 2 => {
                let cols = a.n_cols();
                let x = a.data().iter().step_by(cols).copied().collect();
                let y = a.data().iter().skip(1).step_by(cols).copied().collect();
                Ok(Series { x, y })
            }
            Payload::Array(a) => Err(format!(
                "expected a 1-D array or a 2-D array with at least 2 columns, got shape {:?}",
                a.shape()
            )),
            Payload::Table(t) if t.n_cols() >= 2 => Ok(Series {
                x: t.columns()[0].clone(),
                y: t.columns()[1].clone(),
            }),
            Payload::Table(t) => Err(format!(
                "expected at least 2 columns, got {}",
                t.n_cols()
            )),
        }
    }
}

/// Paired observations fed to the fitting engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn points(&self) -> Vec<(f64, f64)> {
        self.x.iter().copied().zip(self.y.iter().copied()).collect()
    }
}

/// A loaded dataset. Immutable after creation; a new selection replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetHandle {
    pub source_path: PathBuf,
    pub format_tag: FormatTag,
    pub payload: Payload,
}

impl DatasetHandle {
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }
}

/// Which catalog the data source selector is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CatalogKind {
    /// Read-only files packaged under the sample directory.
    Sample,
    /// Files uploaded into the session staging directory.
    Personal,
}

impl CatalogKind {
    pub fn display_name(self) -> &'static str {
        match self {
            CatalogKind::Sample => "Sample",
            CatalogKind::Personal => "Personal",
        }
    }
}

/// Which fitting procedure a compute form runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FitMethod {
    /// Smoothing parameter chosen by generalized cross-validation.
    Gcv,
    /// Smoothing parameter fixed by the variance ratio.
    Reml,
    /// Outlier screening followed by a refit on clean data.
    TwoStage,
    /// REML fit split into low- and high-frequency signals.
    Mmf,
}

impl FitMethod {
    pub const ALL: [FitMethod; 4] = [FitMethod::Gcv, FitMethod::Reml, FitMethod::TwoStage, FitMethod::Mmf];

    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::Gcv => "GCV",
            FitMethod::Reml => "REML",
            FitMethod::TwoStage => "Two-stage",
            FitMethod::Mmf => "MMF",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Raster/vector formats for rendered figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImageFormat {
    Png,
    Svg,
}

/// Tabular formats for data artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataFormat {
    Csv,
    Txt,
}

/// What is being exported from a compute result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Data,
}

/// A concrete export format, tagged with the artifact kind it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Image(ImageFormat),
    Data(DataFormat),
}

impl ExportFormat {
    pub fn kind(self) -> ArtifactKind {
        match self {
            ExportFormat::Image(_) => ArtifactKind::Image,
            ExportFormat::Data(_) => ArtifactKind::Data,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Image(ImageFormat::Png) => "png",
            ExportFormat::Image(ImageFormat::Svg) => "svg",
            ExportFormat::Data(DataFormat::Csv) => "csv",
            ExportFormat::Data(DataFormat::Txt) => "txt",
        }
    }

    /// Formats offered for an artifact kind (first entry is the default).
    pub fn options(kind: ArtifactKind) -> &'static [ExportFormat] {
        match kind {
            ArtifactKind::Image => &[
                ExportFormat::Image(ImageFormat::Png),
                ExportFormat::Image(ImageFormat::Svg),
            ],
            ArtifactKind::Data => &[
                ExportFormat::Data(DataFormat::Csv),
                ExportFormat::Data(DataFormat::Txt),
            ],
        }
    }

    /// Parse a user-supplied extension for the given artifact kind.
    pub fn parse(kind: ArtifactKind, ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::options(kind)
            .iter()
            .copied()
            .find(|f| f.extension() == ext)
    }
}
