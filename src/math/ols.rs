//! Least squares solvers.
//!
//! Two problem shapes show up in this project:
//!
//! ```text
//! ordinary:   minimize ||y - X β||²
//! penalized:  minimize ||y - B a||² + λ ||D a||²
//! ```
//!
//! The ordinary solver is used for small polynomial trend fits; the penalized
//! solver is the workhorse of the smoothing engine and is called once per
//! candidate λ during the grid search.
//!
//! Implementation choices:
//! - Ordinary problems go through SVD so tall, slightly rank-deficient designs
//!   still solve. (Nalgebra's `QR::solve` is intended for square systems and
//!   will panic for non-square matrices.)
//! - Penalized problems form the normal equations `(BᵀB + λDᵀD) a = Bᵀy`
//!   once per λ and factor them with Cholesky. `BᵀB` and `Bᵀy` are computed
//!   by the caller and reused across the grid.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Cross products of a design matrix that don't depend on λ.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    pub btb: DMatrix<f64>,
    pub bty: DVector<f64>,
    pub yty: f64,
    pub n: usize,
}

impl NormalEquations {
    pub fn new(b: &DMatrix<f64>, y: &DVector<f64>) -> Self {
        let bt = b.transpose();
        Self {
            btb: &bt * b,
            bty: &bt * y,
            yty: y.dot(y),
            n: y.len(),
        }
    }
}

/// Solution of one penalized problem.
#[derive(Debug, Clone)]
pub struct PenalizedSolution {
    pub lambda: f64,
    pub coef: DVector<f64>,
    /// `(BᵀB + λP)⁻¹`.
    pub g_inv: DMatrix<f64>,
    /// Effective degrees of freedom, `tr((BᵀB + λP)⁻¹ BᵀB)`.
    pub edf: f64,
    /// Residual sum of squares.
    pub rss: f64,
}

impl PenalizedSolution {
    /// Generalized cross-validation score `n·RSS / (n − edf)²`.
    pub fn gcv(&self, n: usize) -> Option<f64> {
        let denom = n as f64 - self.edf;
        if denom <= 0.0 {
            return None;
        }
        let score = n as f64 * self.rss / (denom * denom);
        score.is_finite().then_some(score)
    }
}

/// Solve the penalized normal equations for one λ.
///
/// Returns `None` when the system can't be factored even with a tiny ridge.
pub fn solve_penalized(ne: &NormalEquations, penalty: &DMatrix<f64>, lambda: f64) -> Option<PenalizedSolution> {
    if !(lambda.is_finite() && lambda >= 0.0) {
        return None;
    }

    let g = &ne.btb + penalty * lambda;
    let chol = g.clone().cholesky().or_else(|| {
        // A ridge far below the data scale keeps near-singular systems solvable.
        let ridge = 1e-10 * (1.0 + g.diagonal().amax());
        (g + DMatrix::<f64>::identity(ne.btb.nrows(), ne.btb.ncols()) * ridge).cholesky()
    })?;

    let coef = chol.solve(&ne.bty);
    let g_inv = chol.inverse();
    let edf = (&g_inv * &ne.btb).trace();

    // ||y - Ba||² = yᵀy − 2aᵀBᵀy + aᵀBᵀBa
    let rss = (ne.yty - 2.0 * coef.dot(&ne.bty) + coef.dot(&(&ne.btb * &coef))).max(0.0);

    if !(coef.iter().all(|v| v.is_finite()) && edf.is_finite() && rss.is_finite()) {
        return None;
    }

    Some(PenalizedSolution {
        lambda,
        coef,
        g_inv,
        edf,
        rss,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn zero_penalty_matches_ordinary_least_squares() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 3.1, 4.9, 7.2]);
        let ne = NormalEquations::new(&x, &y);
        let penalty = DMatrix::<f64>::zeros(2, 2);

        let pen = solve_penalized(&ne, &penalty, 0.0).unwrap();
        let ols = solve_least_squares(&x, &y).unwrap();
        assert!((pen.coef[0] - ols[0]).abs() < 1e-9);
        assert!((pen.coef[1] - ols[1]).abs() < 1e-9);
        // Unpenalized: edf equals the number of columns.
        assert!((pen.edf - 2.0).abs() < 1e-9);
    }

    #[test]
    fn heavier_penalty_reduces_effective_degrees_of_freedom() {
        let x = DMatrix::<f64>::identity(5, 5);
        let y = DVector::from_row_slice(&[1.0, -1.0, 2.0, -2.0, 0.5]);
        let ne = NormalEquations::new(&x, &y);
        let d = crate::math::difference_matrix(5, 2);
        let p = d.transpose() * d;

        let light = solve_penalized(&ne, &p, 0.01).unwrap();
        let heavy = solve_penalized(&ne, &p, 100.0).unwrap();
        assert!(heavy.edf < light.edf);
        assert!(heavy.rss > light.rss);
    }

    #[test]
    fn negative_lambda_is_rejected() {
        let x = DMatrix::<f64>::identity(2, 2);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        let ne = NormalEquations::new(&x, &y);
        assert!(solve_penalized(&ne, &DMatrix::zeros(2, 2), -1.0).is_none());
    }
}
