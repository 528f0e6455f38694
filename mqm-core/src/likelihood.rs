//! Mixture likelihood primitives.
//!
//! Pure functions shared by the EM estimator and the cofactor selector.
//! Callers floor the variance before invoking; a zero mixture sum
//! degrades to negative infinity rather than failing.

use std::f64::consts::PI;

/// Gaussian density of a residual at the given variance.
pub fn normal_density(residual: f64, variance: f64) -> f64 {
    (-(residual * residual) / (2.0 * variance)).exp() / (2.0 * PI * variance).sqrt()
}

/// Log-likelihood contribution of one real individual: the log of the
/// prior-weighted sum of normal densities over its (augmentation,
/// genotype-class) rows.
pub fn mixture_log_likelihood(prior_weights: &[f64], residuals: &[f64], variance: f64) -> f64 {
    debug_assert_eq!(prior_weights.len(), residuals.len());
    let sum: f64 = prior_weights
        .iter()
        .zip(residuals.iter())
        .map(|(&w, &r)| w * normal_density(r, variance))
        .sum();
    sum.ln()
}

/// Convert a full-vs-null log-likelihood difference to the LOD scale.
pub fn lod_score(ll_full: f64, ll_null: f64) -> f64 {
    (ll_full - ll_null) / std::f64::consts::LN_10
}
