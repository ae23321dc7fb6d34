//! B-spline bases on equally spaced knots and difference penalties.
//!
//! The basis of degree `p` over `[lo, hi]` with `nseg` segments has
//! `nseg + p` functions. Knots extend `p` segments beyond each end so every
//! point in `[lo, hi]` is covered by exactly `p + 1` non-zero functions.
//!
//! Numerical notes:
//! - evaluation uses the Cox–de Boor recursion in place (one scratch vector)
//! - `x == hi` is assigned to the last interval, so the right edge is not
//!   silently zero

use nalgebra::DMatrix;

#[derive(Debug, Clone)]
pub struct BsplineBasis {
    lo: f64,
    hi: f64,
    nseg: usize,
    degree: usize,
    knots: Vec<f64>,
}

impl BsplineBasis {
    /// Build a basis; returns `None` for an empty/non-finite range or `nseg == 0`.
    pub fn new(lo: f64, hi: f64, nseg: usize, degree: usize) -> Option<Self> {
        if !(lo.is_finite() && hi.is_finite()) || hi <= lo || nseg == 0 {
            return None;
        }
        let dx = (hi - lo) / nseg as f64;
        let knots = (0..=(nseg + 2 * degree))
            .map(|i| lo + dx * (i as f64 - degree as f64))
            .collect();
        Some(Self {
            lo,
            hi,
            nseg,
            degree,
            knots,
        })
    }

    /// Number of basis functions.
    pub fn len(&self) -> usize {
        self.nseg + self.degree
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values of all basis functions at `x` (clamped into `[lo, hi]`).
    pub fn eval(&self, x: f64) -> Vec<f64> {
        let t = &self.knots;
        let dx = (self.hi - self.lo) / self.nseg as f64;
        let x = x.clamp(self.lo, self.hi);

        let span = (((x - t[0]) / dx).floor() as usize)
            .max(self.degree)
            .min(self.degree + self.nseg - 1);

        let mut b = vec![0.0; t.len() - 1];
        b[span] = 1.0;
        for k in 1..=self.degree {
            for i in 0..(t.len() - 1 - k) {
                let left = (x - t[i]) / (t[i + k] - t[i]) * b[i];
                let right = (t[i + k + 1] - x) / (t[i + k + 1] - t[i + 1]) * b[i + 1];
                b[i] = left + right;
            }
        }
        b.truncate(self.len());
        b
    }

    /// Design matrix: one row per `x`.
    pub fn design(&self, xs: &[f64]) -> DMatrix<f64> {
        let mut out = DMatrix::<f64>::zeros(xs.len(), self.len());
        for (i, &x) in xs.iter().enumerate() {
            for (j, v) in self.eval(x).into_iter().enumerate() {
                out[(i, j)] = v;
            }
        }
        out
    }
}

/// `order`-th difference matrix of size `(n - order) x n`.
pub fn difference_matrix(n: usize, order: usize) -> DMatrix<f64> {
    let mut d = DMatrix::<f64>::identity(n, n);
    for _ in 0..order.min(n.saturating_sub(1)) {
        let rows = d.nrows() - 1;
        let mut next = DMatrix::<f64>::zeros(rows, n);
        for r in 0..rows {
            for c in 0..n {
                next[(r, c)] = d[(r + 1, c)] - d[(r, c)];
            }
        }
        d = next;
    }
    d
}

/// `n` evenly spaced points over `[lo, hi]` (inclusive).
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n as f64 - 1.0);
            (0..n).map(|i| lo + step * i as f64).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_is_a_partition_of_unity() {
        let basis = BsplineBasis::new(0.0, 10.0, 7, 3).unwrap();
        assert_eq!(basis.len(), 10);
        for &x in &[0.0, 0.3, 2.5, 5.0, 9.99, 10.0] {
            let sum: f64 = basis.eval(x).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "sum at {x} was {sum}");
        }
    }

    #[test]
    fn basis_values_are_non_negative() {
        let basis = BsplineBasis::new(-1.0, 1.0, 5, 4).unwrap();
        for i in 0..=20 {
            let x = -1.0 + 0.1 * i as f64;
            assert!(basis.eval(x).iter().all(|v| *v >= -1e-15));
        }
    }

    #[test]
    fn second_difference_rows() {
        let d = difference_matrix(4, 2);
        assert_eq!(d.shape(), (2, 4));
        assert_eq!(d.row(0).iter().copied().collect::<Vec<_>>(), vec![1.0, -2.0, 1.0, 0.0]);
        assert_eq!(d.row(1).iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, -2.0, 1.0]);
    }

    #[test]
    fn linspace_includes_endpoints() {
        let v = linspace(1.0, 3.0, 5);
        assert_eq!(v, vec![1.0, 1.5, 2.0, 2.5, 3.0]);
        assert_eq!(linspace(2.0, 4.0, 1), vec![2.0]);
    }

    #[test]
    fn degenerate_range_has_no_basis() {
        assert!(BsplineBasis::new(1.0, 1.0, 5, 3).is_none());
    }
}
