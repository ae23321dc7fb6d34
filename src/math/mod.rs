//! Mathematical utilities: B-spline bases and (penalized) least squares.

pub mod bspline;
pub mod ols;

pub use bspline::*;
pub use ols::*;
