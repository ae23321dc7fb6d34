//! Command-line parsing for the `alps` session tool.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! session pipeline: every subcommand maps onto selector / form / export
//! operations in `app`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::DEFAULT_SAMPLE_NAME;
use crate::domain::{CatalogKind, DataFormat, FitMethod, ImageFormat};
use crate::session::DEFAULT_DATA_ROOT;

pub mod picker;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "alps", version, about = "ALPS curve fitting sessions: pick data, fit, export")]
pub struct Cli {
    /// Project-relative data root (sample datasets; fallback session directories).
    #[arg(long, global = true, default_value = DEFAULT_DATA_ROOT)]
    pub data_dir: PathBuf,

    /// Debug-level logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the datasets in a catalog.
    List(ListArgs),
    /// Select a dataset, fit it, print a summary, and optionally export.
    Fit(FitArgs),
    /// Write a synthetic sample dataset into the sample directory.
    Sample(SampleArgs),
    /// Launch the interactive TUI.
    ///
    /// Same selector / form / export pipeline as `alps fit`, rendered with Ratatui.
    Tui(TuiArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Which catalog to list.
    #[arg(long, value_enum, default_value_t = CatalogKind::Sample)]
    pub catalog: CatalogKind,
}

/// Files uploaded into the session staging area before anything else runs.
#[derive(Debug, Args, Clone, Default)]
pub struct UploadArgs {
    /// Upload files into the personal catalog (repeatable; each file handled independently).
    #[arg(long = "upload", value_name = "FILE")]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub upload: UploadArgs,

    /// Catalog to pick the dataset from.
    #[arg(long, value_enum, default_value_t = CatalogKind::Sample)]
    pub catalog: CatalogKind,

    /// Dataset file name (or path) in the catalog; prompts when omitted.
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Fitting method.
    #[arg(short, long, value_enum, default_value_t = FitMethod::Gcv)]
    pub method: FitMethod,

    /// Degree of the B-spline bases (2-5).
    #[arg(long)]
    pub degree: Option<f64>,

    /// Order of the difference penalty (1 to degree-1).
    #[arg(long)]
    pub order: Option<f64>,

    /// Number of prediction points (1-9999).
    #[arg(long)]
    pub count: Option<f64>,

    /// Lambda variance (reml, mmf).
    #[arg(long)]
    pub lambda_var: Option<f64>,

    /// Error variance (reml, mmf).
    #[arg(long)]
    pub error_var: Option<f64>,

    /// Outlier scaling threshold for stage 1 (two-stage).
    #[arg(long)]
    pub threshold1: Option<f64>,

    /// Outlier scaling threshold for stage 2 (two-stage).
    #[arg(long)]
    pub threshold2: Option<f64>,

    /// Plot title (first panel).
    #[arg(long)]
    pub title: Option<String>,

    /// X axis label (all panels).
    #[arg(long)]
    pub x_label: Option<String>,

    /// Y axis label (all panels).
    #[arg(long)]
    pub y_label: Option<String>,

    /// Export the fitted outputs as a table with this file name.
    #[arg(long, value_name = "NAME")]
    pub export_data: Option<String>,

    /// Table format for `--export-data`.
    #[arg(long, value_enum, default_value_t = DataFormat::Csv)]
    pub data_format: DataFormat,

    /// Export the rendered figure with this file name.
    #[arg(long, value_name = "NAME")]
    pub export_image: Option<String>,

    /// Image format for `--export-image`.
    #[arg(long, value_enum, default_value_t = ImageFormat::Png)]
    pub image_format: ImageFormat,

    /// Rows of the dataset preview to print.
    #[arg(long, default_value_t = 5)]
    pub head: usize,
}

#[derive(Debug, Args, Clone)]
pub struct SampleArgs {
    /// Number of observations.
    #[arg(short = 'n', long, default_value_t = 50)]
    pub rows: usize,

    /// Random seed.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Output file name inside the sample directory.
    #[arg(long, default_value = DEFAULT_SAMPLE_NAME)]
    pub name: String,

    /// Noise standard deviation (m).
    #[arg(long, default_value_t = 0.05)]
    pub noise: f64,

    /// Probability of a jump (outlier) per observation.
    #[arg(long, default_value_t = 0.04)]
    pub jump_prob: f64,
}

#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    #[command(flatten)]
    pub upload: UploadArgs,

    /// Fitting method the form starts with.
    #[arg(short, long, value_enum, default_value_t = FitMethod::Gcv)]
    pub method: FitMethod,
}

/// Rewrite argv so `alps` defaults to `alps tui`.
///
/// Rules:
/// - `alps`                         -> `alps tui`
/// - `alps --data-dir d`            -> `alps --data-dir d tui`
/// - `alps --help/--version/-h`     -> unchanged (show top-level help/version)
/// - any argv naming a subcommand   -> unchanged
pub fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let rest = argv.get(1..).unwrap_or_default();

    let asks_help_or_version = rest
        .iter()
        .any(|a| matches!(a.as_str(), "-h" | "--help" | "-V" | "--version" | "help"));
    let names_subcommand = rest
        .iter()
        .any(|a| matches!(a.as_str(), "list" | "fit" | "sample" | "tui"));

    if !asks_help_or_version && !names_subcommand {
        argv.push("tui".to_string());
    }
    argv
}
