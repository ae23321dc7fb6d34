//! Shared session pipeline used by both CLI and TUI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! storage -> catalog -> select/confirm -> compute form -> submit -> export
//!
//! The CLI and the TUI can then focus on presentation (printing vs widgets).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::cli::FitArgs;
use crate::cli::picker::find_entry;
use crate::domain::{CatalogKind, DatasetHandle, ExportFormat};
use crate::error::{AppError, PipelineError};
use crate::fit::PsplineEngine;
use crate::form::{ComputeForm, ComputeResult, ParamKey, ParameterSet};
use crate::io::{DatasetResolver, ExportDispatcher};
use crate::session::{SessionPaths, SessionStorage};
use crate::source::DataSourceSelector;

/// The components of one running session, wired to its directories.
pub struct Session {
    pub paths: SessionPaths,
    pub selector: DataSourceSelector,
    pub exporter: ExportDispatcher,
}

impl Session {
    /// Initialize storage and wire the selector and exporter to it.
    pub fn open(storage: &SessionStorage) -> Result<Self, PipelineError> {
        let paths = storage.initialize()?;
        let selector = DataSourceSelector::new(
            DatasetResolver::default(),
            storage.config().sample_dir.clone(),
            paths.staging_dir.clone(),
        );
        let exporter = ExportDispatcher::new(paths.results_dir.clone());
        Ok(Self {
            paths,
            selector,
            exporter,
        })
    }

    /// Show `kind`, choose an entry, and confirm it.
    ///
    /// `wanted` names the entry directly; otherwise `pick` chooses from the
    /// listed catalog (the CLI prompts, tests pass a closure).
    pub fn select_dataset(
        &mut self,
        kind: CatalogKind,
        wanted: Option<&Path>,
        pick: impl FnOnce(CatalogKind, &[PathBuf]) -> Result<usize, AppError>,
    ) -> Result<Arc<DatasetHandle>, AppError> {
        let entries = self.selector.show_catalog(kind).to_vec();

        let idx = match wanted {
            Some(wanted) => find_entry(&entries, wanted).ok_or_else(|| {
                AppError::new(
                    2,
                    format!(
                        "'{}' is not in the {} catalog. Run `alps list --catalog {}` to see it.",
                        wanted.display(),
                        kind.display_name().to_lowercase(),
                        kind.display_name().to_lowercase()
                    ),
                )
            })?,
            None => pick(kind, &entries)?,
        };

        self.selector.select(Some(idx));
        Ok(self.selector.confirm()?)
    }
}

/// Compute form for `dataset` with the shipped engine.
pub fn new_form(dataset: Arc<DatasetHandle>, params: ParameterSet) -> ComputeForm<PsplineEngine> {
    ComputeForm::new(PsplineEngine::default(), dataset, params)
}

/// Method preset with the command-line overrides applied.
///
/// Degree is applied before the penalty order so the order is clamped
/// against the requested degree, not the preset one.
pub fn params_from_args(args: &FitArgs) -> Result<ParameterSet, PipelineError> {
    let mut params = ParameterSet::preset(args.method);

    let overrides = [
        (ParamKey::Degree, args.degree),
        (ParamKey::PenaltyOrder, args.order),
        (ParamKey::Count, args.count),
        (ParamKey::LambdaVariance, args.lambda_var),
        (ParamKey::ErrorVariance, args.error_var),
        (ParamKey::Threshold1, args.threshold1),
        (ParamKey::Threshold2, args.threshold2),
    ];
    for (key, value) in overrides {
        if let Some(value) = value {
            let stored = params
                .set(key, value)
                .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
            if stored != value {
                info!(parameter = key.label(), requested = value, stored, "parameter clamped");
            }
        }
    }

    let labels = params.labels_mut();
    if let (Some(title), Some(first)) = (&args.title, labels.first_mut()) {
        first.title = title.clone();
    }
    for panel in labels.iter_mut() {
        if let Some(x) = &args.x_label {
            panel.x_label = x.clone();
        }
        if let Some(y) = &args.y_label {
            panel.y_label = y.clone();
        }
    }

    Ok(params)
}

/// Exports named on the command line, as `(filename, format)` pairs.
pub fn requested_exports(args: &FitArgs) -> Vec<(String, ExportFormat)> {
    let mut out = Vec::new();
    if let Some(name) = &args.export_data {
        out.push((name.clone(), ExportFormat::Data(args.data_format)));
    }
    if let Some(name) = &args.export_image {
        out.push((name.clone(), ExportFormat::Image(args.image_format)));
    }
    out
}

/// Write every requested export of `result`, stopping at the first failure.
pub fn write_exports(
    exporter: &ExportDispatcher,
    result: &ComputeResult,
    requests: &[(String, ExportFormat)],
) -> Result<Vec<PathBuf>, PipelineError> {
    requests
        .iter()
        .map(|(name, format)| exporter.export(result, name, *format))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use std::fs;

    use tempfile::tempdir;

    use crate::cli::{Cli, Command};
    use crate::data::{SampleConfig, write_sample};
    use crate::domain::{DataFormat, FitMethod, ImageFormat};
    use crate::session::{SessionConfig, SessionGuard};

    fn never_prompt(_: CatalogKind, _: &[PathBuf]) -> Result<usize, AppError> {
        Err(AppError::new(2, "prompted"))
    }

    fn fit_args(extra: &[&str]) -> FitArgs {
        let mut argv = vec!["alps", "fit"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Fit(args) => args,
            other => panic!("expected fit, got {other:?}"),
        }
    }

    #[test]
    fn order_override_is_clamped_against_new_degree() {
        let params = params_from_args(&fit_args(&["--degree", "3", "--order", "4"])).unwrap();
        assert_eq!(params.value(ParamKey::Degree), Some(3.0));
        assert_eq!(params.value(ParamKey::PenaltyOrder), Some(2.0));
    }

    #[test]
    fn override_for_another_method_is_invalid_input() {
        let err = params_from_args(&fit_args(&["--lambda-var", "0.5"])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn labels_apply_title_to_first_panel_only() {
        let params = params_from_args(&fit_args(&[
            "-m",
            "two-stage",
            "--title",
            "Site A",
            "--y-label",
            "dh (m)",
        ]))
        .unwrap();
        assert_eq!(params.method(), FitMethod::TwoStage);
        assert_eq!(params.labels()[0].title, "Site A");
        assert_eq!(params.labels()[1].title, "Two-step");
        assert!(params.labels().iter().all(|l| l.y_label == "dh (m)"));
    }

    #[test]
    fn requested_exports_follow_flags() {
        let args = fit_args(&["--export-image", "fig", "--image-format", "svg", "--export-data", "tab"]);
        assert_eq!(
            requested_exports(&args),
            vec![
                ("tab".to_string(), ExportFormat::Data(DataFormat::Csv)),
                ("fig".to_string(), ExportFormat::Image(ImageFormat::Svg)),
            ]
        );
        assert!(requested_exports(&fit_args(&[])).is_empty());
    }

    #[test]
    fn sample_fit_exports_one_table() {
        let tmp = tempdir().unwrap();
        let config = SampleConfig {
            rows: 50,
            ..SampleConfig::default()
        };
        write_sample(tmp.path(), "sample.csv", &config, &DatasetResolver::default()).unwrap();
        let storage = SessionStorage::new(SessionConfig::local(tmp.path()));
        let mut session = Session::open(&storage).unwrap();

        let args = fit_args(&["-f", "sample.csv", "--degree", "4", "--order", "2", "--count", "200"]);
        let dataset = session
            .select_dataset(CatalogKind::Sample, args.file.as_deref(), never_prompt)
            .unwrap();
        assert_eq!(dataset.payload.n_rows(), 50);

        let mut form = new_form(dataset, params_from_args(&args).unwrap());
        let result = form.submit().unwrap();
        let written = write_exports(
            &session.exporter,
            result,
            &[("out".to_string(), ExportFormat::Data(DataFormat::Csv))],
        )
        .unwrap();

        let entries: Vec<_> = fs::read_dir(&session.paths.results_dir).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(written, vec![session.paths.results_dir.join("out.csv")]);
        let text = fs::read_to_string(&written[0]).unwrap();
        assert!(text.starts_with("gcv_xpred,gcv_ypred"));
        assert_eq!(text.lines().count(), 201);
    }

    #[test]
    fn unknown_file_name_fails_without_prompting() {
        let tmp = tempdir().unwrap();
        let storage = SessionStorage::new(SessionConfig::local(tmp.path()));
        let mut session = Session::open(&storage).unwrap();

        let err = session
            .select_dataset(CatalogKind::Sample, Some(Path::new("missing.csv")), never_prompt)
            .unwrap_err();
        assert!(err.to_string().contains("not in the sample catalog"));
    }

    #[test]
    fn teardown_keeps_exports_and_drops_uploads() {
        let tmp = tempdir().unwrap();
        let upload = tmp.path().join("mine.csv");
        fs::write(&upload, "time,thickness_change\n0,0.1\n1,0.2\n2,0.25\n3,0.3\n4,0.5\n5,0.4\n6,0.6\n7,0.7\n").unwrap();
        let storage = SessionStorage::new(SessionConfig::local(&tmp.path().join("data")));
        let results;
        {
            let mut session = Session::open(&storage).unwrap();
            let _guard = SessionGuard::new(&storage);
            results = session.paths.results_dir.clone();

            let report = session.selector.upload_paths(&[upload.clone()]);
            assert_eq!(report.stored.len(), 1);
            let dataset = session
                .select_dataset(CatalogKind::Personal, Some(Path::new("mine.csv")), never_prompt)
                .unwrap();

            let mut params = ParameterSet::preset(FitMethod::Gcv);
            params.set(ParamKey::Degree, 2.0).unwrap();
            params.set(ParamKey::Count, 20.0).unwrap();
            let mut form = new_form(dataset, params);
            let result = form.submit().unwrap();
            session
                .exporter
                .export(result, "fit", ExportFormat::Image(ImageFormat::Svg))
                .unwrap();
        }

        assert_eq!(fs::read_dir(&storage.config().staging_dir).unwrap().count(), 0);
        assert!(results.join("fit.svg").is_file());
        assert!(upload.is_file());
    }
}
