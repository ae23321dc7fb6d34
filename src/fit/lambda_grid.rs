//! Smoothing parameter grid.
//!
//! GCV picks λ from a deterministic log-spaced grid rather than a continuous
//! optimizer: the GCV curve is often flat or multi-modal at the extremes and
//! a grid makes the choice reproducible for the same inputs.

use crate::error::FitError;

/// Default grid bounds and resolution.
pub const LAMBDA_MIN: f64 = 1e-4;
pub const LAMBDA_MAX: f64 = 1e6;
pub const LAMBDA_STEPS: usize = 41;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, FitError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(FitError::InvalidParameter(format!(
            "invalid lambda range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(FitError::InvalidParameter("lambda steps must be >= 2".to_string()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    Ok((0..steps).map(|i| (ln_min + step * i as f64).exp()).collect())
}

/// Grid used by `PsplineEngine::default()`.
pub fn default_lambda_grid() -> Vec<f64> {
    log_space(LAMBDA_MIN, LAMBDA_MAX, LAMBDA_STEPS).unwrap_or_default()
}
