#![allow(clippy::needless_range_loop)]
//! Cholesky decomposition for the weighted normal equations.
//!
//! The EM estimator solves (X'WX) beta = X'Wy at every M-step; the
//! cross-product matrix is symmetric positive definite unless the
//! cofactor columns are collinear, in which case `NotPositiveDefinite`
//! is returned and the caller decides how to recover.

use crate::dense::DenseMatrix;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Result of a Cholesky decomposition.
pub struct CholeskyDecomp {
    /// Lower triangular factor L such that A = L * L'.
    pub l: DenseMatrix,
}

impl CholeskyDecomp {
    /// Compute the Cholesky decomposition of a symmetric positive definite matrix.
    pub fn new(a: &DenseMatrix) -> Result<Self, LinalgError> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LinalgError::DimensionMismatch {
                expected: n,
                got: a.ncols(),
            });
        }
        let mut l = DenseMatrix::zeros(n, n);

        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l.get(j, k) * l.get(j, k);
            }
            let diag = a.get(j, j) - sum;
            if diag <= 0.0 {
                return Err(LinalgError::NotPositiveDefinite);
            }
            l.set(j, j, diag.sqrt());

            for i in (j + 1)..n {
                let mut sum = 0.0;
                for k in 0..j {
                    sum += l.get(i, k) * l.get(j, k);
                }
                l.set(i, j, (a.get(i, j) - sum) / l.get(j, j));
            }
        }

        Ok(CholeskyDecomp { l })
    }

    /// Solve L * L' * x = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.l.nrows();
        assert_eq!(b.len(), n);

        // Forward substitution: L * y = b
        let mut y = vec![0.0; n];
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..i {
                sum += self.l.get(i, j) * y[j];
            }
            y[i] = (b[i] - sum) / self.l.get(i, i);
        }

        // Backward substitution: L' * x = y
        let mut x = vec![0.0; n];
        for i in (0..n).rev() {
            let mut sum = 0.0;
            for j in (i + 1)..n {
                sum += self.l.get(j, i) * x[j];
            }
            x[i] = (y[i] - sum) / self.l.get(i, i);
        }

        x
    }
}

/// Solve the weighted least-squares system (X'WX) beta = X'Wy.
///
/// Retries once with a small ridge on the diagonal when the plain
/// cross-product matrix is not positive definite; a failure after the
/// ridge means the design is effectively singular.
pub fn solve_weighted_least_squares(
    x: &DenseMatrix,
    w: &[f64],
    y: &[f64],
) -> Result<Vec<f64>, LinalgError> {
    let xtwx = x.xtwx(w);
    let xtwy = x.xtwv(w, y);

    match CholeskyDecomp::new(&xtwx) {
        Ok(chol) => Ok(chol.solve(&xtwy)),
        Err(_) => {
            let p = xtwx.nrows();
            let mut ridged = xtwx;
            for i in 0..p {
                ridged.set(i, i, ridged.get(i, i) + 1e-6);
            }
            let chol = CholeskyDecomp::new(&ridged)?;
            Ok(chol.solve(&xtwy))
        }
    }
}
