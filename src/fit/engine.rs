//! Penalized B-spline (P-spline) engine.
//!
//! Every method fits the same model:
//!
//! ```text
//! minimize ||y - B a||² + λ ||D_q a||²
//! ```
//!
//! with `B` a B-spline basis of the chosen degree on uniform knots and `D_q`
//! the q-th order difference matrix. Methods differ in how λ is chosen and
//! what is done with the fit:
//!
//! - `Gcv`: λ minimizes the GCV score over a log-spaced grid (parallel)
//! - `Reml`: λ = error variance / lambda variance
//! - `TwoStage`: MAD-scaled residual screening in two passes, then a GCV
//!   refit on the clean points
//! - `Mmf`: REML fit split into a polynomial trend of degree `q - 1` (the
//!   penalty's null space) and the high-frequency remainder
//!
//! Predictions are made on `count` evenly spaced points across the data
//! range together with a 95% t-interval half width (`std_t`).

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{DatasetHandle, FitMethod, Series};
use crate::error::FitError;
use crate::fit::artifact::{ArtifactData, NamedOutput};
use crate::fit::lambda_grid::default_lambda_grid;
use crate::fit::{FitOutput, FittingEngine};
use crate::form::{PanelLabels, ParamKey, ParameterSet};
use crate::math::{
    difference_matrix, linspace, solve_least_squares, solve_penalized, BsplineBasis, NormalEquations,
    PenalizedSolution,
};
use crate::plot::{Figure, Panel};

/// Consistency constant turning a MAD into a normal-scale estimate.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Fewest observations any method will fit.
const MIN_POINTS: usize = 5;

#[derive(Debug, Clone)]
pub struct PsplineEngine {
    /// Upper bound on the number of knot segments.
    pub max_segments: usize,
    /// Candidate λ values for GCV.
    pub lambda_grid: Vec<f64>,
}

impl Default for PsplineEngine {
    fn default() -> Self {
        Self {
            max_segments: 40,
            lambda_grid: default_lambda_grid(),
        }
    }
}

/// Fitted curve on the prediction grid.
#[derive(Debug, Clone)]
struct SplineFit {
    xpred: Vec<f64>,
    ypred: Vec<f64>,
    std_t: Vec<f64>,
    /// Fitted values at the observations.
    fitted: Vec<f64>,
    lambda: f64,
}

impl SplineFit {
    fn lower(&self) -> Vec<f64> {
        self.ypred.iter().zip(&self.std_t).map(|(y, s)| y - s).collect()
    }

    fn upper(&self) -> Vec<f64> {
        self.ypred.iter().zip(&self.std_t).map(|(y, s)| y + s).collect()
    }

    fn to_output(&self, name: &str) -> NamedOutput {
        NamedOutput::new(name)
            .with_field("xpred", self.xpred.clone())
            .with_field("ypred", self.ypred.clone())
            .with_field("std_t", self.std_t.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum Smoothing {
    Gcv,
    Fixed(f64),
}

#[derive(Debug, Clone, Copy)]
struct SplineSpec {
    degree: usize,
    order: usize,
    count: usize,
}

impl SplineSpec {
    fn from_params(params: &ParameterSet) -> Result<Self, FitError> {
        let degree = params.require_whole(ParamKey::Degree)?;
        let order = params.require_whole(ParamKey::PenaltyOrder)?;
        let count = params.require_whole(ParamKey::Count)?;
        if order == 0 || order >= degree {
            return Err(FitError::InvalidParameter(format!(
                "penalty order must be in 1..{degree}, got {order}"
            )));
        }
        if count == 0 {
            return Err(FitError::InvalidParameter(
                "number of prediction points must be >= 1".to_string(),
            ));
        }
        Ok(Self { degree, order, count })
    }
}

impl FittingEngine for PsplineEngine {
    fn fit(&self, dataset: &DatasetHandle, params: &ParameterSet) -> Result<FitOutput, FitError> {
        let series = prepare_series(dataset)?;
        let spec = SplineSpec::from_params(params)?;

        debug!(
            method = params.method().display_name(),
            n = series.len(),
            degree = spec.degree,
            order = spec.order,
            count = spec.count,
            "fitting"
        );

        match params.method() {
            FitMethod::Gcv => self.fit_gcv(&series, &spec, params),
            FitMethod::Reml => self.fit_reml(&series, &spec, params),
            FitMethod::TwoStage => self.fit_two_stage(&series, &spec, params),
            FitMethod::Mmf => self.fit_mmf(&series, &spec, params),
        }
    }
}

impl PsplineEngine {
    fn fit_gcv(&self, series: &Series, spec: &SplineSpec, params: &ParameterSet) -> Result<FitOutput, FitError> {
        let gcv = self.fit_spline(series, spec, Smoothing::Gcv)?;
        let panel = single_fit_panel(&params.panel_labels(0), series, &gcv, "Mean Prediction");
        Ok(FitOutput {
            renderable: Figure::new(vec![panel]),
            artifact_data: ArtifactData::new().with(gcv.to_output("gcv")),
        })
    }

    fn fit_reml(&self, series: &Series, spec: &SplineSpec, params: &ParameterSet) -> Result<FitOutput, FitError> {
        let reml = self.fit_spline(series, spec, Smoothing::Fixed(variance_ratio(params)?))?;
        let panel = single_fit_panel(&params.panel_labels(0), series, &reml, "Mean Prediction");
        Ok(FitOutput {
            renderable: Figure::new(vec![panel]),
            artifact_data: ArtifactData::new().with(reml.to_output("reml")),
        })
    }

    fn fit_two_stage(
        &self,
        series: &Series,
        spec: &SplineSpec,
        params: &ParameterSet,
    ) -> Result<FitOutput, FitError> {
        let t1 = params.require(ParamKey::Threshold1)?;
        let t2 = params.require(ParamKey::Threshold2)?;

        let original = self.fit_spline(series, spec, Smoothing::Gcv)?;

        // Stage 1: screen against the full-data fit.
        let stage1 = flag_outliers(&series.y, &original.fitted, t1);
        let survivors = subset(series, &stage1, false);
        if survivors.len() < MIN_POINTS {
            return Err(FitError::InsufficientData(format!(
                "only {} points remain after stage-1 screening",
                survivors.len()
            )));
        }

        // Stage 2: refit the survivors and screen again with the tighter threshold.
        let refit = self.fit_spline(&survivors, spec, Smoothing::Gcv)?;
        let stage2 = flag_outliers(&survivors.y, &refit.fitted, t2);
        let clean = subset(&survivors, &stage2, false);
        if clean.len() < MIN_POINTS {
            return Err(FitError::InsufficientData(format!(
                "only {} points remain after stage-2 screening",
                clean.len()
            )));
        }

        let mut outliers = subset(series, &stage1, true);
        let late = subset(&survivors, &stage2, true);
        outliers.x.extend(late.x);
        outliers.y.extend(late.y);

        let clean_fit = self.fit_spline(&clean, spec, Smoothing::Gcv)?;
        debug!(
            outliers = outliers.len(),
            clean = clean.len(),
            lambda_original = original.lambda,
            lambda_clean = clean_fit.lambda,
            "two-stage screening done"
        );

        let one_step = single_fit_panel(&params.panel_labels(0), series, &original, "With full data");
        let labels = params.panel_labels(1);
        let two_step = Panel::new(labels.title, labels.x_label, labels.y_label)
            .with_scatter("Normal data", clean.points())
            .with_scatter("Outlier detected", outliers.points())
            .with_curve("With full data", &original.xpred, &original.ypred)
            .with_curve("Without outliers", &clean_fit.xpred, &clean_fit.ypred)
            .with_band("95% t-interval", &clean_fit.xpred, clean_fit.lower(), clean_fit.upper());

        let artifact_data = ArtifactData::new()
            .with(original.to_output("original_gcv"))
            .with(clean_fit.to_output("clean_gcv"))
            .with(
                NamedOutput::new("outliers")
                    .with_field("x", outliers.x)
                    .with_field("y", outliers.y),
            );

        Ok(FitOutput {
            renderable: Figure::new(vec![one_step, two_step]),
            artifact_data,
        })
    }

    fn fit_mmf(&self, series: &Series, spec: &SplineSpec, params: &ParameterSet) -> Result<FitOutput, FitError> {
        let reml = self.fit_spline(series, spec, Smoothing::Fixed(variance_ratio(params)?))?;
        let (low, high) = split_frequencies(&reml.xpred, &reml.ypred, spec.order)?;

        let first = single_fit_panel(&params.panel_labels(0), series, &reml, "Mean Prediction");
        let labels = params.panel_labels(1);
        let zero = vec![0.0; reml.xpred.len()];
        let second = Panel::new(labels.title, labels.x_label, labels.y_label)
            .with_scatter("Data", series.points())
            .with_curve("Low freq. signal", &reml.xpred, &low)
            .with_curve("High freq. signal", &reml.xpred, &high)
            .with_curve("0 thickness change", &reml.xpred, &zero);

        let artifact_data = ArtifactData::new()
            .with(reml.to_output("reml"))
            .with(NamedOutput::flat("freq_low", low))
            .with(NamedOutput::flat("freq_high", high));

        Ok(FitOutput {
            renderable: Figure::new(vec![first, second]),
            artifact_data,
        })
    }

    fn fit_spline(&self, series: &Series, spec: &SplineSpec, smoothing: Smoothing) -> Result<SplineFit, FitError> {
        let n = series.len();
        if n < MIN_POINTS.max(spec.order + 2) {
            return Err(FitError::InsufficientData(format!(
                "need at least {} points, got {n}",
                MIN_POINTS.max(spec.order + 2)
            )));
        }

        let (lo, hi) = min_max(&series.x);
        let nseg = (n / 3).max(5).min(self.max_segments.max(1));
        let basis = BsplineBasis::new(lo, hi, nseg, spec.degree).ok_or_else(|| {
            FitError::InsufficientData(format!("x values span an empty range [{lo}, {hi}]"))
        })?;
        if spec.order >= basis.len() {
            return Err(FitError::InvalidParameter(format!(
                "penalty order {} is too large for {} basis functions",
                spec.order,
                basis.len()
            )));
        }

        let b = basis.design(&series.x);
        let y = DVector::from_column_slice(&series.y);
        let ne = NormalEquations::new(&b, &y);
        let d = difference_matrix(basis.len(), spec.order);
        let penalty = d.transpose() * &d;

        let solution = match smoothing {
            Smoothing::Gcv => self.select_by_gcv(&ne, &penalty)?,
            Smoothing::Fixed(lambda) => solve_penalized(&ne, &penalty, lambda).ok_or_else(|| {
                FitError::Numerical(format!("penalized system is singular for lambda={lambda}"))
            })?,
        };

        let dof = n as f64 - solution.edf;
        if dof <= 0.0 {
            return Err(FitError::InsufficientData(format!(
                "no residual degrees of freedom (n={n}, edf={:.2})",
                solution.edf
            )));
        }
        let sigma2 = solution.rss / dof;
        let tq = t_quantile_975(dof);
        debug!(nseg, lambda = solution.lambda, edf = solution.edf, sigma2, "spline fitted");

        let xpred = linspace(lo, hi, spec.count);
        let bp = basis.design(&xpred);
        let ypred: Vec<f64> = (&bp * &solution.coef).iter().copied().collect();
        let cov = &bp * &solution.g_inv;
        let std_t: Vec<f64> = (0..xpred.len())
            .map(|i| tq * (sigma2 * cov.row(i).dot(&bp.row(i)).max(0.0)).sqrt())
            .collect();
        let fitted: Vec<f64> = (&b * &solution.coef).iter().copied().collect();

        if ypred.iter().chain(&std_t).any(|v| !v.is_finite()) {
            return Err(FitError::Numerical("non-finite prediction".to_string()));
        }

        Ok(SplineFit {
            xpred,
            ypred,
            std_t,
            fitted,
            lambda: solution.lambda,
        })
    }

    fn select_by_gcv(&self, ne: &NormalEquations, penalty: &DMatrix<f64>) -> Result<PenalizedSolution, FitError> {
        if self.lambda_grid.is_empty() {
            return Err(FitError::InvalidParameter("lambda grid is empty".to_string()));
        }

        // Evaluate each λ independently (parallel).
        let candidates: Vec<(usize, f64, PenalizedSolution)> = self
            .lambda_grid
            .par_iter()
            .enumerate()
            .filter_map(|(idx, &lambda)| {
                let sol = solve_penalized(ne, penalty, lambda)?;
                let score = sol.gcv(ne.n)?;
                Some((idx, score, sol))
            })
            .collect();

        // Deterministic selection: minimum score; ties broken by grid index.
        let mut best: Option<(usize, f64, PenalizedSolution)> = None;
        for c in candidates {
            let better = match &best {
                None => true,
                Some((idx, score, _)) => c.1 < *score || (c.1 == *score && c.0 < *idx),
            };
            if better {
                best = Some(c);
            }
        }

        let (_, score, solution) =
            best.ok_or_else(|| FitError::Numerical("no lambda on the grid produced a valid fit".to_string()))?;
        debug!(lambda = solution.lambda, edf = solution.edf, gcv = score, "lambda selected");
        Ok(solution)
    }
}

/// Finite `(x, y)` pairs sorted by x.
fn prepare_series(dataset: &DatasetHandle) -> Result<Series, FitError> {
    let series = dataset
        .payload
        .series()
        .map_err(|e| FitError::InsufficientData(format!("{}: {e}", dataset.file_name())))?;

    let mut pairs: Vec<(f64, f64)> = series
        .points()
        .into_iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (x, y) = pairs.into_iter().unzip();
    Ok(Series { x, y })
}

fn variance_ratio(params: &ParameterSet) -> Result<f64, FitError> {
    let lambda_var = params.require(ParamKey::LambdaVariance)?;
    let error_var = params.require(ParamKey::ErrorVariance)?;
    if !(lambda_var > 0.0 && error_var > 0.0) {
        return Err(FitError::InvalidParameter(format!(
            "variances must be > 0 (lambda={lambda_var}, error={error_var})"
        )));
    }
    Ok(error_var / lambda_var)
}

fn single_fit_panel(labels: &PanelLabels, series: &Series, fit: &SplineFit, curve: &str) -> Panel {
    Panel::new(labels.title.clone(), labels.x_label.clone(), labels.y_label.clone())
        .with_scatter("Data", series.points())
        .with_curve(curve, &fit.xpred, &fit.ypred)
        .with_band("95% t-interval", &fit.xpred, fit.lower(), fit.upper())
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        0.5 * (v[mid - 1] + v[mid])
    } else {
        v[mid]
    }
}

/// Flag residuals larger than `threshold` robust standard deviations.
///
/// A zero scale (e.g. an exact fit) flags nothing.
fn flag_outliers(y: &[f64], fitted: &[f64], threshold: f64) -> Vec<bool> {
    let residuals: Vec<f64> = y.iter().zip(fitted).map(|(a, b)| a - b).collect();
    let center = median(&residuals);
    let deviations: Vec<f64> = residuals.iter().map(|r| (r - center).abs()).collect();
    let scale = MAD_TO_SIGMA * median(&deviations);
    if scale <= f64::EPSILON {
        return vec![false; residuals.len()];
    }
    residuals
        .iter()
        .map(|r| (r - center).abs() > threshold * scale)
        .collect()
}

fn subset(series: &Series, flags: &[bool], keep_flagged: bool) -> Series {
    let (x, y) = series
        .points()
        .into_iter()
        .zip(flags)
        .filter(|(_, f)| **f == keep_flagged)
        .map(|(p, _)| p)
        .unzip();
    Series { x, y }
}

/// Split a curve into a polynomial trend of degree `order - 1` and the rest.
fn split_frequencies(x: &[f64], y: &[f64], order: usize) -> Result<(Vec<f64>, Vec<f64>), FitError> {
    let (lo, hi) = min_max(x);
    let mid = 0.5 * (lo + hi);
    let half = (0.5 * (hi - lo)).max(f64::EPSILON);

    // Scale to [-1, 1] to keep the Vandermonde matrix well conditioned.
    let cols = order.min(x.len()).max(1);
    let mut design = DMatrix::<f64>::zeros(x.len(), cols);
    for (i, &xi) in x.iter().enumerate() {
        let u = (xi - mid) / half;
        let mut p = 1.0;
        for j in 0..cols {
            design[(i, j)] = p;
            p *= u;
        }
    }

    let beta = solve_least_squares(&design, &DVector::from_column_slice(y))
        .ok_or_else(|| FitError::Numerical("trend fit failed".to_string()))?;
    let low: Vec<f64> = (&design * beta).iter().copied().collect();
    let high = y.iter().zip(&low).map(|(a, b)| a - b).collect();
    Ok((low, high))
}

/// Upper 97.5% quantile of Student's t with `dof` degrees of freedom.
///
/// Cornish-Fisher expansion around the normal quantile; accurate to about
/// 1e-3 for `dof >= 3`.
fn t_quantile_975(dof: f64) -> f64 {
    const Z: f64 = 1.959_963_984_540_054;
    let v = dof.max(1.0);
    let z2 = Z * Z;
    let z3 = z2 * Z;
    let z5 = z3 * z2;
    let z7 = z5 * z2;
    let z9 = z7 * z2;
    Z + (z3 + Z) / (4.0 * v)
        + (5.0 * z5 + 16.0 * z3 + 3.0 * Z) / (96.0 * v * v)
        + (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * Z) / (384.0 * v * v * v)
        + (79.0 * z9 + 776.0 * z7 + 1482.0 * z5 - 1920.0 * z3 - 945.0 * Z) / (92160.0 * v * v * v * v)
}
