//! Fitting engines.
//!
//! The session pipeline only depends on the `FittingEngine` contract:
//!
//! - input: a decoded dataset plus a parameter snapshot
//! - output: a renderable `Figure` and named numeric outputs (`ArtifactData`)
//!
//! `PsplineEngine` is the engine shipped with the binary.

pub mod artifact;
pub mod engine;
pub mod lambda_grid;

pub use artifact::*;
pub use engine::*;
pub use lambda_grid::*;

use crate::domain::DatasetHandle;
use crate::error::FitError;
use crate::form::ParameterSet;
use crate::plot::Figure;

/// Everything one engine invocation produces.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutput {
    pub renderable: Figure,
    pub artifact_data: ArtifactData,
}

/// Black-box fitting collaborator of the compute form.
pub trait FittingEngine {
    fn fit(&self, dataset: &DatasetHandle, params: &ParameterSet) -> Result<FitOutput, FitError>;
}

impl<E: FittingEngine + ?Sized> FittingEngine for &E {
    fn fit(&self, dataset: &DatasetHandle, params: &ParameterSet) -> Result<FitOutput, FitError> {
        (**self).fit(dataset, params)
    }
}
