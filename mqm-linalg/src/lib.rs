//! mqm-linalg: dense linear algebra for MQM-RS
//!
//! A thin faer-backed matrix type plus the Cholesky solver used by the
//! weighted least-squares steps of the EM estimator.

pub mod decomposition;
pub mod dense;

pub use decomposition::{CholeskyDecomp, LinalgError};
pub use dense::DenseMatrix;
