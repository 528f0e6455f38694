//! EM estimation of the genotype-class mixture model.
//!
//! The working regression has one row per (augmentation, genotype-class)
//! pair. The E-step recomputes posterior case weights from the class
//! priors and the current fit; the M-step solves a weighted least
//! squares for the class means and cofactor effects and re-estimates the
//! residual variance. Convergence is a relative log-likelihood
//! tolerance; hitting the iteration cap is reported, not fatal.
//!
//! With no QTL priors the same machinery fits the cofactor-only null
//! model: a single pseudo-class whose prior is 1 for every augmentation.

use anyhow::{ensure, Context, Result};
use tracing::{debug, trace};

use mqm_linalg::decomposition::solve_weighted_least_squares;
use mqm_linalg::DenseMatrix;

use crate::config::{ScanConfig, VarianceMode};
use crate::cross::Genotype;
use crate::likelihood::mixture_log_likelihood;
use crate::likelihood::normal_density;
use crate::table::CrossTable;

/// Knobs the EM loop needs, split out of `ScanConfig` so the estimator
/// is testable on its own.
#[derive(Debug, Clone)]
pub struct EmOptions {
    pub max_iter: usize,
    /// Relative log-likelihood tolerance.
    pub tolerance: f64,
    /// Absolute tolerance on the largest coefficient change; either
    /// criterion ends the iteration.
    pub coefficient_tolerance: f64,
    pub variance_floor: f64,
    pub variance_mode: VarianceMode,
    pub dominance: bool,
}

impl EmOptions {
    pub fn from_config(cfg: &ScanConfig) -> Self {
        Self {
            max_iter: cfg.max_em_iter,
            tolerance: cfg.em_tolerance,
            coefficient_tolerance: cfg.em_tolerance * 1e-3,
            variance_floor: cfg.variance_floor,
            variance_mode: cfg.variance_mode,
            dominance: cfg.dominance,
        }
    }
}

/// Genotype-class priors for a putative QTL, one row per augmented
/// pseudo-individual in table order. Rows are normalized to sum to 1.
#[derive(Debug, Clone)]
pub struct QtlPriors {
    classes: Vec<Genotype>,
    values: Vec<f64>,
}

impl QtlPriors {
    pub fn new(classes: Vec<Genotype>) -> Self {
        assert!(!classes.is_empty());
        Self {
            classes,
            values: Vec::new(),
        }
    }

    pub fn push_row(&mut self, priors: &[f64]) {
        assert_eq!(priors.len(), self.classes.len());
        self.values.extend_from_slice(priors);
    }

    pub fn classes(&self) -> &[Genotype] {
        &self.classes
    }

    pub fn n_rows(&self) -> usize {
        self.values.len() / self.classes.len()
    }

    pub fn row(&self, i: usize) -> &[f64] {
        let k = self.classes.len();
        &self.values[i * k..(i + 1) * k]
    }
}

/// A fitted mixture model.
#[derive(Debug, Clone)]
pub struct EmFit {
    pub log_likelihood: f64,
    /// One mean per genotype class (a single entry for the null model).
    pub class_means: Vec<f64>,
    /// One additive effect per cofactor, in cofactor order.
    pub cofactor_effects: Vec<f64>,
    pub variance: f64,
    /// Heterozygote deviation from the homozygote midpoint, when modeled.
    pub dominance_deviation: Option<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Rows of the working regression, grouped by real individual.
struct Workspace {
    x: DenseMatrix,
    y: Vec<f64>,
    /// Prior case weight of each row (augmentation weight x class prior);
    /// sums to 1 within each individual's row range.
    base: Vec<f64>,
    /// Row range per real individual.
    bounds: Vec<(usize, usize)>,
    n_class_cols: usize,
    one_hot: bool,
}

fn class_columns(row: &mut [f64], classes: &[Genotype], c: usize, one_hot: bool) {
    if classes.is_empty() {
        row[0] = 1.0;
    } else if one_hot {
        row[c] = 1.0;
    } else {
        row[0] = 1.0;
        row[1] = classes[c].additive_code();
    }
}

fn build_workspace(
    table: &CrossTable,
    cofactors: &[usize],
    qtl: Option<&QtlPriors>,
    opts: &EmOptions,
) -> Result<Workspace> {
    let classes: &[Genotype] = qtl.map(|q| q.classes()).unwrap_or(&[]);
    let n_classes = classes.len().max(1);
    let one_hot = opts.dominance && classes.len() == 3;
    let n_class_cols = if classes.is_empty() {
        1
    } else if one_hot {
        classes.len()
    } else {
        2
    };
    let p = n_class_cols + cofactors.len();

    if let Some(q) = qtl {
        ensure!(
            q.n_rows() == table.n_augmented(),
            "QTL priors carry {} rows for {} augmented individuals",
            q.n_rows(),
            table.n_augmented()
        );
    }

    let n_rows = table.n_augmented() * n_classes;
    let mut x = DenseMatrix::zeros(n_rows, p);
    let mut y = Vec::with_capacity(n_rows);
    let mut base = Vec::with_capacity(n_rows);
    let mut bounds = Vec::with_capacity(table.n_individuals());

    let mut aug_index = 0;
    let mut row_index = 0;
    let mut row = vec![0.0; p];
    for ind in table.individuals() {
        let start = row_index;
        for aug in &ind.augmentations {
            let priors: &[f64] = qtl.map(|q| q.row(aug_index)).unwrap_or(&[1.0]);
            for c in 0..n_classes {
                row.iter_mut().for_each(|v| *v = 0.0);
                class_columns(&mut row, classes, c, one_hot);
                for (k, &m) in cofactors.iter().enumerate() {
                    row[n_class_cols + k] = aug.genotypes[m].additive_code();
                }
                x.set_row(row_index, &row);
                y.push(ind.phenotype);
                base.push(aug.weight * priors[c]);
                row_index += 1;
            }
            aug_index += 1;
        }
        bounds.push((start, row_index));
    }

    Ok(Workspace {
        x,
        y,
        base,
        bounds,
        n_class_cols,
        one_hot,
    })
}

/// Fit the mixture model for a fixed cofactor set and (optional) QTL
/// prior distribution. `qtl = None` fits the cofactor-only null model.
pub fn fit_mixture(
    table: &CrossTable,
    cofactors: &[usize],
    qtl: Option<&QtlPriors>,
    opts: &EmOptions,
) -> Result<EmFit> {
    let ws = build_workspace(table, cofactors, qtl, opts)?;
    let n_rows = ws.y.len();
    let p = ws.x.ncols();

    let mut weights = ws.base.clone();
    let mut variance = opts.variance_floor;
    let mut beta = vec![0.0; p];
    let mut residuals = vec![0.0; n_rows];
    let mut ll = f64::NEG_INFINITY;
    let mut ll_prev = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;

    for iter in 1..=opts.max_iter {
        iterations = iter;

        // M-step (the first pass doubles as initialization from the
        // prior weights).
        let beta_new = solve_weighted_least_squares(&ws.x, &weights, &ws.y)
            .context("singular cofactor regression")?;
        let max_coefficient_change = beta_new
            .iter()
            .zip(beta.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f64, f64::max);
        beta = beta_new;
        let fitted = ws.x.mat_vec(&beta);
        for i in 0..n_rows {
            residuals[i] = ws.y[i] - fitted[i];
        }

        let total_weight: f64 = weights.iter().sum();
        let ss: f64 = weights
            .iter()
            .zip(residuals.iter())
            .map(|(&w, &r)| w * r * r)
            .sum();
        let denom = match opts.variance_mode {
            VarianceMode::FullMl => total_weight,
            VarianceMode::RestrictedMl => {
                let d = total_weight - p as f64;
                if d > 0.0 {
                    d
                } else {
                    total_weight
                }
            }
        };
        variance = (ss / denom).max(opts.variance_floor);

        ll = ws
            .bounds
            .iter()
            .map(|&(s, e)| mixture_log_likelihood(&ws.base[s..e], &residuals[s..e], variance))
            .sum();
        trace!(iter, ll, variance, "EM step");

        let ll_settled = ll.is_finite() && (ll - ll_prev).abs() < opts.tolerance * (1.0 + ll.abs());
        let coefficients_settled = iter > 1 && max_coefficient_change < opts.coefficient_tolerance;
        if ll_settled || coefficients_settled {
            converged = true;
            break;
        }
        ll_prev = ll;

        // E-step: posterior case weights, renormalized per individual.
        for &(s, e) in &ws.bounds {
            let mut sum = 0.0;
            for i in s..e {
                weights[i] = ws.base[i] * normal_density(residuals[i], variance);
                sum += weights[i];
            }
            if sum > 0.0 {
                for i in s..e {
                    weights[i] /= sum;
                }
                debug_assert!(
                    (weights[s..e].iter().sum::<f64>() - 1.0).abs() < 1e-9,
                    "posterior weights must renormalize to 1 per individual"
                );
            } else {
                // Degenerate fit for this individual; fall back to the
                // prior weights rather than dividing by zero.
                weights[s..e].copy_from_slice(&ws.base[s..e]);
            }
        }
    }

    if !converged {
        debug!(
            iterations,
            ll, "EM hit the iteration cap without converging"
        );
    }

    let classes: &[Genotype] = qtl.map(|q| q.classes()).unwrap_or(&[]);
    let class_means: Vec<f64> = if classes.is_empty() {
        vec![beta[0]]
    } else if ws.one_hot {
        beta[..ws.n_class_cols].to_vec()
    } else {
        classes
            .iter()
            .map(|g| beta[0] + g.additive_code() * beta[1])
            .collect()
    };
    let dominance_deviation = if ws.one_hot {
        Some(class_means[1] - 0.5 * (class_means[0] + class_means[2]))
    } else {
        None
    };

    Ok(EmFit {
        log_likelihood: ll,
        class_means,
        cofactor_effects: beta[ws.n_class_cols..].to_vec(),
        variance,
        dominance_deviation,
        iterations,
        converged,
    })
}
