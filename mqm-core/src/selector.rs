//! Backward elimination of cofactors.
//!
//! Starting from the caller's initial cofactor set, repeatedly refit the
//! cofactor-only model with each cofactor dropped in turn, and remove
//! the one whose drop costs the least likelihood until every remaining
//! cofactor clears the chi-squared threshold implied by `alpha`. Ties
//! break toward the lowest marker index, so the procedure is
//! deterministic and reproducible.

use anyhow::{anyhow, Result};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::em::{fit_mixture, EmOptions};
use crate::table::CrossTable;

/// How the selector left the cofactor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// No cofactor was removed.
    Unmodified,
    /// At least one cofactor was removed; some remain.
    Reduced,
    /// Every cofactor was eliminated.
    Empty,
}

/// One elimination step: the dropped marker and its drop statistic.
/// A negative-infinity statistic marks a removal forced by a singular
/// full-model fit.
#[derive(Debug, Clone)]
pub struct EliminationStep {
    pub marker: usize,
    pub statistic: f64,
}

/// The selector's result: the surviving cofactors (ascending marker
/// index) and the elimination trace.
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub cofactors: Vec<usize>,
    pub outcome: SelectionOutcome,
    pub steps: Vec<EliminationStep>,
}

/// Likelihood-ratio threshold for dropping one additive cofactor term.
fn drop_threshold(alpha: f64) -> Result<f64> {
    let chi2 = ChiSquared::new(1.0).map_err(|e| anyhow!("chi-squared setup: {e}"))?;
    Ok(chi2.inverse_cdf(1.0 - alpha))
}

/// Run backward elimination. The initial set is used as-is (sorted,
/// deduplicated by `ScanConfig::validate` beforehand).
pub fn backward_eliminate(
    table: &CrossTable,
    initial: &[usize],
    cfg: &ScanConfig,
) -> Result<SelectionResult> {
    let opts = EmOptions::from_config(cfg);
    let threshold = drop_threshold(cfg.alpha)?;
    let mut set: Vec<usize> = initial.to_vec();
    set.sort_unstable();
    let mut steps: Vec<EliminationStep> = Vec::new();

    while !set.is_empty() {
        let full = fit_mixture(table, &set, None, &opts);

        // Reduced fits, one per candidate drop, in ascending marker order.
        let reduced: Vec<(usize, Option<f64>)> = set
            .iter()
            .map(|&m| {
                let without: Vec<usize> = set.iter().copied().filter(|&c| c != m).collect();
                let ll = fit_mixture(table, &without, None, &opts)
                    .ok()
                    .map(|f| f.log_likelihood);
                (m, ll)
            })
            .collect();

        let drop = match &full {
            Ok(full_fit) => {
                // Smallest likelihood-ratio statistic; strict `<` keeps
                // the lowest marker index on ties.
                let mut best: Option<(usize, f64)> = None;
                for &(m, ll) in &reduced {
                    let stat = match ll {
                        Some(ll) => (2.0 * (full_fit.log_likelihood - ll)).max(0.0),
                        None => f64::INFINITY,
                    };
                    if best.map_or(true, |(_, s)| stat < s) {
                        best = Some((m, stat));
                    }
                }
                match best {
                    Some((m, stat)) if stat < threshold => Some(EliminationStep {
                        marker: m,
                        statistic: stat,
                    }),
                    _ => None,
                }
            }
            Err(err) => {
                // A singular full fit is infinitely unfavorable: some
                // cofactor must go. Prefer the drop whose reduced model
                // fits best; fall back to the lowest index if none fit.
                warn!("full cofactor model singular, forcing a removal: {err}");
                let forced = reduced
                    .iter()
                    .filter_map(|&(m, ll)| ll.map(|ll| (m, ll)))
                    .fold(None::<(usize, f64)>, |best, (m, ll)| {
                        match best {
                            Some((_, best_ll)) if best_ll >= ll => best,
                            _ => Some((m, ll)),
                        }
                    })
                    .map(|(m, _)| m)
                    .unwrap_or(set[0]);
                Some(EliminationStep {
                    marker: forced,
                    statistic: f64::NEG_INFINITY,
                })
            }
        };

        match drop {
            Some(step) => {
                debug!(
                    marker = step.marker,
                    statistic = step.statistic,
                    "dropping cofactor"
                );
                set.retain(|&m| m != step.marker);
                steps.push(step);
            }
            None => break,
        }
    }

    let outcome = if steps.is_empty() {
        SelectionOutcome::Unmodified
    } else if set.is_empty() {
        SelectionOutcome::Empty
    } else {
        SelectionOutcome::Reduced
    };
    info!(
        initial = initial.len(),
        kept = set.len(),
        dropped = steps.len(),
        "backward elimination finished"
    );

    Ok(SelectionResult {
        cofactors: set,
        outcome,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::cross::{CrossType, Genotype};
    use crate::table::{Augmentation, Individual, MarkerInfo};

    /// Backcross where marker 0 drives the phenotype and marker 1 is noise.
    fn two_marker_table() -> CrossTable {
        let markers = vec![
            MarkerInfo {
                name: "m1".into(),
                chromosome: 1,
                position_cm: 0.0,
            },
            MarkerInfo {
                name: "m2".into(),
                chromosome: 2,
                position_cm: 0.0,
            },
        ];
        let mut individuals = Vec::new();
        for i in 0..60 {
            let g0 = if i % 2 == 0 { Genotype::AA } else { Genotype::AB };
            let g1 = if (i / 2) % 2 == 0 { Genotype::AA } else { Genotype::AB };
            let effect = if g0 == Genotype::AB { 3.0 } else { 0.0 };
            individuals.push(Individual {
                phenotype: effect + 0.1 * ((i % 7) as f64 - 3.0),
                augmentations: vec![Augmentation {
                    genotypes: vec![g0, g1],
                    weight: 1.0,
                }],
            });
        }
        CrossTable::new(CrossType::Backcross, markers, individuals).unwrap()
    }

    #[test]
    fn test_keeps_informative_drops_noise() {
        let table = two_marker_table();
        let cfg = ScanConfig::default();
        let result = backward_eliminate(&table, &[0, 1], &cfg).unwrap();
        assert_eq!(result.cofactors, vec![0]);
        assert_eq!(result.outcome, SelectionOutcome::Reduced);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].marker, 1);
        assert!(result.steps[0].statistic < drop_threshold(cfg.alpha).unwrap());
    }

    #[test]
    fn test_empty_input_is_unmodified() {
        let table = two_marker_table();
        let result = backward_eliminate(&table, &[], &ScanConfig::default()).unwrap();
        assert!(result.cofactors.is_empty());
        assert_eq!(result.outcome, SelectionOutcome::Unmodified);
    }

    #[test]
    fn test_strong_cofactor_survives_alone() {
        let table = two_marker_table();
        let result = backward_eliminate(&table, &[0], &ScanConfig::default()).unwrap();
        assert_eq!(result.cofactors, vec![0]);
        assert_eq!(result.outcome, SelectionOutcome::Unmodified);
    }

    #[test]
    fn test_all_noise_goes_empty() {
        // Phenotype independent of both markers with alpha pushed high
        // enough that nothing survives.
        let markers = vec![
            MarkerInfo {
                name: "m1".into(),
                chromosome: 1,
                position_cm: 0.0,
            },
            MarkerInfo {
                name: "m2".into(),
                chromosome: 1,
                position_cm: 50.0,
            },
        ];
        let mut individuals = Vec::new();
        for i in 0..40 {
            let g0 = if i % 2 == 0 { Genotype::AA } else { Genotype::AB };
            let g1 = if (i / 2) % 2 == 0 { Genotype::AA } else { Genotype::AB };
            individuals.push(Individual {
                phenotype: (i % 9) as f64,
                augmentations: vec![Augmentation {
                    genotypes: vec![g0, g1],
                    weight: 1.0,
                }],
            });
        }
        let table = CrossTable::new(CrossType::Backcross, markers, individuals).unwrap();
        let cfg = ScanConfig {
            alpha: 1e-6,
            ..Default::default()
        };
        let result = backward_eliminate(&table, &[0, 1], &cfg).unwrap();
        assert!(result.cofactors.is_empty());
        assert_eq!(result.outcome, SelectionOutcome::Empty);
        assert_eq!(result.steps.len(), 2);
    }

    #[test]
    fn test_set_size_monotone_and_kept_significant() {
        let table = two_marker_table();
        let cfg = ScanConfig::default();
        let result = backward_eliminate(&table, &[0, 1], &cfg).unwrap();
        // Every recorded drop was below threshold (or forced).
        let threshold = drop_threshold(cfg.alpha).unwrap();
        for step in &result.steps {
            assert!(step.statistic < threshold);
        }
        // Set size is initial minus drops.
        assert_eq!(result.cofactors.len(), 2 - result.steps.len());
    }
}
