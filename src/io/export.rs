//! Export a compute result to the session results directory.
//!
//! Two artifact kinds:
//!
//! - data: every named output merged column-wise into one comma-separated
//!   table (headers `<output>_<field>`, short columns padded with empty cells)
//! - image: the renderable drawn by a `Renderer` in the chosen image format
//!
//! Requests are validated before anything touches the filesystem, and the
//! result is only read, so one result can be exported any number of times.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::{ArtifactKind, ExportFormat};
use crate::error::PipelineError;
use crate::fit::ArtifactData;
use crate::form::ComputeResult;
use crate::plot::{PlottersRenderer, Renderer};

#[derive(Debug, Clone)]
pub struct ExportDispatcher<R: Renderer = PlottersRenderer> {
    results_dir: PathBuf,
    renderer: R,
}

impl ExportDispatcher<PlottersRenderer> {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self::with_renderer(results_dir, PlottersRenderer::default())
    }
}

impl<R: Renderer> ExportDispatcher<R> {
    pub fn with_renderer(results_dir: impl Into<PathBuf>, renderer: R) -> Self {
        Self {
            results_dir: results_dir.into(),
            renderer,
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Path an export of `filename` in `format` would be written to.
    ///
    /// The format's extension is appended unless `filename` already ends with it.
    pub fn target_path(&self, filename: &str, format: ExportFormat) -> Result<PathBuf, PipelineError> {
        let name = filename.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidExportRequest("filename is empty".to_string()));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PipelineError::InvalidExportRequest(format!(
                "filename '{name}' must be a plain file name"
            )));
        }

        let ext = format.extension();
        let has_ext = Path::new(name)
            .extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext));
        let file = if has_ext { name.to_string() } else { format!("{name}.{ext}") };

        let path = self.results_dir.join(file);
        if path.is_dir() {
            return Err(PipelineError::InvalidExportRequest(format!(
                "'{}' is a directory",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Write one artifact of `result` and return the stored path.
    pub fn export(&self, result: &ComputeResult, filename: &str, format: ExportFormat) -> Result<PathBuf, PipelineError> {
        let path = self.target_path(filename, format)?;

        match format {
            ExportFormat::Data(_) => {
                if result.artifact_data.is_empty() {
                    return Err(PipelineError::InvalidExportRequest(
                        "result has no data outputs".to_string(),
                    ));
                }
                let bytes = merged_table(&result.artifact_data)?;
                fs::write(&path, bytes)
                    .map_err(|e| PipelineError::io(format!("Failed to write export '{}'", path.display()), e))?;
            }
            ExportFormat::Image(image) => {
                if let Err(e) = self.renderer.render(&result.renderable, &path, image) {
                    // Leave no half-drawn image behind.
                    if path.is_file() {
                        if let Err(rm) = fs::remove_file(&path) {
                            warn!(path = %path.display(), error = %rm, "failed to remove partial export");
                        }
                    }
                    return Err(e);
                }
            }
        }

        info!(path = %path.display(), format = format.extension(), "artifact exported");
        Ok(path)
    }
}

/// Resolve a user-supplied extension for an artifact kind.
pub fn resolve_export_format(kind: ArtifactKind, ext: &str) -> Result<ExportFormat, PipelineError> {
    ExportFormat::parse(kind, ext).ok_or_else(|| {
        let offered: Vec<&str> = ExportFormat::options(kind).iter().map(|f| f.extension()).collect();
        PipelineError::InvalidExportRequest(format!(
            "format '{ext}' is not available for {kind:?} exports (expected one of: {})",
            offered.join(", ")
        ))
    })
}

/// Merge every named output into one comma-separated table.
fn merged_table(data: &ArtifactData) -> Result<Vec<u8>, PipelineError> {
    let columns = data.merged_columns();
    let rows = data.merged_rows();

    let to_io = |e: csv::Error| PipelineError::io("Failed to encode export table", std::io::Error::other(e));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(columns.iter().map(|(header, _)| header.as_str()))
        .map_err(to_io)?;
    for r in 0..rows {
        writer
            .write_record(
                columns
                    .iter()
                    .map(|(_, values)| values.get(r).map(|v| v.to_string()).unwrap_or_default()),
            )
            .map_err(to_io)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::io("Failed to encode export table", e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DataFormat, ImageFormat};
    use crate::fit::NamedOutput;
    use crate::plot::{Figure, Panel};
    use tempfile::tempdir;

    fn result() -> ComputeResult {
        ComputeResult {
            artifact_data: ArtifactData::new()
                .with(
                    NamedOutput::new("reml")
                        .with_field("xpred", vec![0.0, 1.0, 2.0])
                        .with_field("ypred", vec![1.0, 1.5, 2.0]),
                )
                .with(NamedOutput::flat("freq_low", vec![0.5, 0.5])),
            renderable: Figure::new(vec![
                Panel::new("REML", "Time", "Thickness Change (m)").with_curve("fit", &[0.0, 1.0], &[1.0, 2.0]),
            ]),
        }
    }

    #[test]
    fn data_export_merges_named_columns() {
        let tmp = tempdir().unwrap();
        let dispatcher = ExportDispatcher::new(tmp.path());
        let path = dispatcher
            .export(&result(), "out", ExportFormat::Data(DataFormat::Csv))
            .unwrap();

        assert_eq!(path, tmp.path().join("out.csv"));
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "reml_xpred,reml_ypred,freq_low\n0,1,0.5\n1,1.5,0.5\n2,2,\n"
        );
    }

    #[test]
    fn existing_extension_is_not_doubled() {
        let tmp = tempdir().unwrap();
        let dispatcher = ExportDispatcher::new(tmp.path());
        let path = dispatcher
            .target_path("table.TXT", ExportFormat::Data(DataFormat::Txt))
            .unwrap();
        assert_eq!(path, tmp.path().join("table.TXT"));
    }

    #[test]
    fn empty_filename_writes_nothing() {
        let tmp = tempdir().unwrap();
        let dispatcher = ExportDispatcher::new(tmp.path());
        for name in ["", "   "] {
            let err = dispatcher
                .export(&result(), name, ExportFormat::Data(DataFormat::Csv))
                .unwrap_err();
            assert!(matches!(err, PipelineError::InvalidExportRequest(_)));
        }
        assert_eq!(fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn directory_target_is_rejected() {
        let tmp = tempdir().unwrap();
        fs::create_dir(tmp.path().join("taken.csv")).unwrap();
        let dispatcher = ExportDispatcher::new(tmp.path());
        let err = dispatcher
            .export(&result(), "taken", ExportFormat::Data(DataFormat::Csv))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidExportRequest(_)));
    }

    #[test]
    fn path_separators_are_rejected() {
        let tmp = tempdir().unwrap();
        let dispatcher = ExportDispatcher::new(tmp.path());
        assert!(dispatcher.target_path("../x", ExportFormat::Data(DataFormat::Csv)).is_err());
    }

    #[test]
    fn format_must_match_artifact_kind() {
        assert!(resolve_export_format(ArtifactKind::Image, "csv").is_err());
        assert_eq!(
            resolve_export_format(ArtifactKind::Image, ".SVG").unwrap(),
            ExportFormat::Image(ImageFormat::Svg)
        );
    }

    #[test]
    fn repeated_exports_leave_result_intact() {
        let tmp = tempdir().unwrap();
        let dispatcher = ExportDispatcher::new(tmp.path());
        let r = result();
        let before = r.clone();
        dispatcher.export(&r, "a", ExportFormat::Data(DataFormat::Csv)).unwrap();
        dispatcher.export(&r, "b", ExportFormat::Image(ImageFormat::Svg)).unwrap();
        assert_eq!(r, before);
        assert!(tmp.path().join("a.csv").is_file());
        assert!(tmp.path().join("b.svg").is_file());
    }
}
