//! Scan configuration.
//!
//! Every caller-supplied knob is an explicit field with a documented
//! default, so the estimator and the selector stay testable in
//! isolation. `validate` rejects inconsistent configurations before any
//! scan begins.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::table::CrossTable;

/// Residual-variance denominator in the EM M-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceMode {
    /// Divide the weighted residual sum of squares by (total weight - rank).
    RestrictedMl,
    /// Divide by the total weight.
    FullMl,
}

/// Configuration for one MQM invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Run backward elimination on the initial cofactor set.
    pub backward: bool,
    /// Restricted vs full maximum-likelihood variance estimation.
    pub variance_mode: VarianceMode,
    /// Significance level for the selector's stopping rule.
    pub alpha: f64,
    /// EM iteration cap.
    pub max_em_iter: usize,
    /// Relative log-likelihood tolerance for EM convergence.
    pub em_tolerance: f64,
    /// Strictly positive floor re-applied to the variance after every M-step.
    pub variance_floor: f64,
    /// Exclusion radius (cM) around selected cofactors during scanning.
    pub window_cm: f64,
    /// Scan step size (cM).
    pub step_cm: f64,
    /// First scanned position on every chromosome (cM).
    pub step_min_cm: f64,
    /// Last scanned position on every chromosome (cM).
    pub step_max_cm: f64,
    /// Number of permutation runs; 0 disables permutation.
    pub n_permutations: usize,
    /// Re-estimate inter-marker distances from the data before scanning.
    pub reestimate_map: bool,
    /// Estimate a dominance deviation (three-class crosses only).
    pub dominance: bool,
    /// Master seed for permutation shuffles.
    pub seed: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            backward: true,
            variance_mode: VarianceMode::FullMl,
            alpha: 0.02,
            max_em_iter: 1000,
            em_tolerance: 1e-5,
            variance_floor: 1e-10,
            window_cm: 25.0,
            step_cm: 5.0,
            step_min_cm: 0.0,
            step_max_cm: 200.0,
            n_permutations: 0,
            reestimate_map: false,
            dominance: false,
            seed: 12345,
        }
    }
}

impl ScanConfig {
    /// Reject configurations that cannot produce a meaningful scan.
    /// `cofactors` are the initial cofactor marker indices.
    pub fn validate(&self, table: &CrossTable, cofactors: &[usize]) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            bail!("alpha must lie in (0, 1), got {}", self.alpha);
        }
        if self.max_em_iter == 0 {
            bail!("max_em_iter must be at least 1");
        }
        if !(self.em_tolerance > 0.0) {
            bail!("em_tolerance must be positive, got {}", self.em_tolerance);
        }
        if !(self.variance_floor > 0.0) {
            bail!("variance_floor must be positive, got {}", self.variance_floor);
        }
        if self.window_cm < 0.0 {
            bail!("window_cm must be non-negative, got {}", self.window_cm);
        }
        if !(self.step_cm > 0.0) {
            bail!("step_cm must be positive, got {}", self.step_cm);
        }
        if self.step_min_cm > self.step_max_cm {
            bail!(
                "step_min_cm ({}) exceeds step_max_cm ({})",
                self.step_min_cm,
                self.step_max_cm
            );
        }
        if self.dominance && !table.cross_type().supports_dominance() {
            bail!(
                "dominance requires a three-class cross, got {}",
                table.cross_type()
            );
        }
        for &c in cofactors {
            if c >= table.n_markers() {
                bail!(
                    "cofactor index {c} out of range for {} markers",
                    table.n_markers()
                );
            }
        }
        let mut sorted = cofactors.to_vec();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            bail!("duplicate cofactor indices");
        }
        Ok(())
    }
}
