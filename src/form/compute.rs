//! Compute form: a bound dataset, a parameter set, and the current result.
//!
//! The form owns its result. A submit runs the engine synchronously and
//! replaces the previous result wholesale (or clears it on failure); export
//! availability is derived from "is there a current result", never stored.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::domain::{ArtifactKind, DatasetHandle, ExportFormat};
use crate::error::{FitError, PipelineError};
use crate::fit::{ArtifactData, FitOutput, FittingEngine};
use crate::form::params::{ParamKey, ParameterSet};
use crate::plot::Figure;

/// Output of the most recent successful submit.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeResult {
    pub artifact_data: ArtifactData,
    pub renderable: Figure,
}

impl From<FitOutput> for ComputeResult {
    fn from(out: FitOutput) -> Self {
        Self {
            artifact_data: out.artifact_data,
            renderable: out.renderable,
        }
    }
}

pub struct ComputeForm<E: FittingEngine> {
    engine: E,
    dataset: Arc<DatasetHandle>,
    params: ParameterSet,
    result: Option<ComputeResult>,
    last_error: Option<String>,
}

impl<E: FittingEngine> ComputeForm<E> {
    pub fn new(engine: E, dataset: Arc<DatasetHandle>, params: ParameterSet) -> Self {
        Self {
            engine,
            dataset,
            params,
            result: None,
            last_error: None,
        }
    }

    pub fn dataset(&self) -> &DatasetHandle {
        &self.dataset
    }

    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Mutable access for label edits; value changes still go through
    /// `ParameterSet::set`, which re-applies `clamp`.
    pub fn params_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }

    pub fn set_param(&mut self, key: ParamKey, value: f64) -> Result<f64, FitError> {
        self.params.set(key, value)
    }

    pub fn adjust_param(&mut self, key: ParamKey, steps: i32) -> Result<f64, FitError> {
        self.params.adjust(key, steps)
    }

    /// Run the engine once on a snapshot of the current parameters.
    ///
    /// On failure the previous result is discarded, so exports disable.
    pub fn submit(&mut self) -> Result<&ComputeResult, PipelineError> {
        let snapshot = self.params.clone();
        let started = Instant::now();

        // Clear first: no state where an old result outlives a new submit.
        self.result = None;
        match self.engine.fit(&self.dataset, &snapshot) {
            Ok(out) => {
                info!(
                    method = snapshot.method().display_name(),
                    dataset = %self.dataset.file_name(),
                    outputs = ?out.artifact_data.names(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "compute finished"
                );
                self.last_error = None;
                Ok(&*self.result.insert(out.into()))
            }
            Err(e) => {
                warn!(
                    method = snapshot.method().display_name(),
                    dataset = %self.dataset.file_name(),
                    error = %e,
                    "compute failed"
                );
                self.last_error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    pub fn result(&self) -> Option<&ComputeResult> {
        self.result.as_ref()
    }

    pub fn has_current_result(&self) -> bool {
        self.result.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether `controls` may trigger an export right now.
    pub fn export_enabled(&self, controls: &ExportControls) -> bool {
        controls.enabled(self.has_current_result())
    }
}

/// Filename + format inputs of one export control group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportControls {
    pub filename: String,
    pub format: ExportFormat,
}

impl ExportControls {
    /// Empty filename, default format for the artifact kind.
    pub fn new(kind: ArtifactKind) -> Self {
        Self {
            filename: String::new(),
            format: ExportFormat::options(kind)[0],
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.format.kind()
    }

    pub fn enabled(&self, has_result: bool) -> bool {
        has_result && !self.filename.trim().is_empty()
    }

    /// Next format offered for the same artifact kind.
    pub fn cycle_format(&mut self) {
        let options = ExportFormat::options(self.kind());
        let idx = options.iter().position(|f| *f == self.format).unwrap_or(0);
        self.format = options[(idx + 1) % options.len()];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::path::PathBuf;

    use crate::domain::{DataFormat, FitMethod, FormatTag, NumericArray, Payload};
    use crate::fit::NamedOutput;

    /// Engine that fails on the calls listed in `fail_on` (1-based).
    struct ScriptedEngine {
        calls: Cell<usize>,
        fail_on: Vec<usize>,
    }

    impl ScriptedEngine {
        fn new(fail_on: Vec<usize>) -> Self {
            Self {
                calls: Cell::new(0),
                fail_on,
            }
        }
    }

    impl FittingEngine for ScriptedEngine {
        fn fit(&self, _dataset: &DatasetHandle, params: &ParameterSet) -> Result<FitOutput, FitError> {
            let n = self.calls.get() + 1;
            self.calls.set(n);
            if self.fail_on.contains(&n) {
                return Err(FitError::Numerical(format!("call {n}")));
            }
            let count = params.value(ParamKey::Count).unwrap_or(0.0);
            Ok(FitOutput {
                renderable: Figure::default(),
                artifact_data: ArtifactData::new().with(NamedOutput::flat("gcv", vec![n as f64, count])),
            })
        }
    }

    fn dataset() -> Arc<DatasetHandle> {
        Arc::new(DatasetHandle {
            source_path: PathBuf::from("d.p"),
            format_tag: FormatTag::PickledArray,
            payload: Payload::Array(NumericArray::new(vec![2], vec![1.0, 2.0]).unwrap()),
        })
    }

    #[test]
    fn export_enabled_iff_last_submit_succeeded() {
        let engine = ScriptedEngine::new(vec![2, 4, 5]);
        let mut form = ComputeForm::new(engine, dataset(), ParameterSet::preset(FitMethod::Gcv));
        let mut controls = ExportControls::new(ArtifactKind::Data);
        controls.filename = "out".into();

        assert!(!form.export_enabled(&controls));
        let outcomes = [true, false, true, false, false, true];
        for ok in outcomes {
            assert_eq!(form.submit().is_ok(), ok);
            assert_eq!(form.has_current_result(), ok);
            assert_eq!(form.export_enabled(&controls), ok);
            assert_eq!(form.last_error().is_some(), !ok);
        }
    }

    #[test]
    fn submit_replaces_result_and_snapshots_params() {
        let mut form = ComputeForm::new(ScriptedEngine::new(vec![]), dataset(), ParameterSet::preset(FitMethod::Gcv));
        form.submit().unwrap();
        form.set_param(ParamKey::Count, 50.0).unwrap();
        let result = form.submit().unwrap();
        let values = result.artifact_data.get("gcv").unwrap().field("").unwrap();
        assert_eq!(values, &[2.0, 50.0]);
    }

    #[test]
    fn empty_filename_disables_export() {
        let form = ComputeForm::new(ScriptedEngine::new(vec![]), dataset(), ParameterSet::preset(FitMethod::Gcv));
        let mut controls = ExportControls::new(ArtifactKind::Data);
        assert!(!controls.enabled(true));
        controls.filename = "   ".into();
        assert!(!controls.enabled(true));
        controls.filename = "x".into();
        assert!(!form.export_enabled(&controls));
    }

    #[test]
    fn cycle_format_stays_within_kind() {
        let mut controls = ExportControls::new(ArtifactKind::Data);
        controls.cycle_format();
        assert_eq!(controls.format, ExportFormat::Data(DataFormat::Txt));
        controls.cycle_format();
        assert_eq!(controls.format, ExportFormat::Data(DataFormat::Csv));
    }
}
