//! The position scanner.
//!
//! Steps a putative QTL across every chromosome at a fixed increment,
//! builds its genotype-class priors from the flanking markers, runs the
//! EM estimator with the selected cofactors held fixed, and records a
//! LOD score per position. Positions within the exclusion window of a
//! cofactor on the same chromosome are reported but not computed.
//!
//! The grid depends only on the map and the stepping parameters, and
//! each position is evaluated independently, so the profile is
//! deterministic and the per-position work parallelizes freely.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ScanConfig;
use crate::em::{fit_mixture, EmOptions, QtlPriors};
use crate::likelihood::lod_score;
use crate::map::haldane_recombination;
use crate::table::CrossTable;

/// What the scanner produced at one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PositionOutcome {
    /// A computed LOD score and the EM convergence flag for it.
    Lod { lod: f64, converged: bool },
    /// Inside the exclusion window of a selected cofactor.
    Excluded,
    /// The model could not be fit at this position.
    Failed,
}

/// One row of the genome-wide profile.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileEntry {
    pub chromosome: u16,
    pub position_cm: f64,
    pub outcome: PositionOutcome,
}

impl ProfileEntry {
    /// The LOD score, when one was computed.
    pub fn lod(&self) -> Option<f64> {
        match self.outcome {
            PositionOutcome::Lod { lod, .. } => Some(lod),
            _ => None,
        }
    }
}

/// The scanned positions on one chromosome, identical for every
/// chromosome: step_min, step_min + step, ... up to step_max.
pub fn position_grid(cfg: &ScanConfig) -> Vec<f64> {
    let mut grid = Vec::new();
    let mut k = 0u32;
    loop {
        let pos = cfg.step_min_cm + f64::from(k) * cfg.step_cm;
        if pos > cfg.step_max_cm + 1e-9 {
            break;
        }
        grid.push(pos);
        k += 1;
    }
    grid
}

/// Class priors for a putative QTL at `position_cm` on `chromosome`,
/// conditioned per augmentation on the flanking marker genotypes.
fn priors_at_position(table: &CrossTable, chromosome: u16, position_cm: f64) -> QtlPriors {
    let cross = table.cross_type();
    let markers = table.markers();
    let (start, end) = table
        .chromosome_span(chromosome)
        .expect("scanned chromosome has markers");

    // Bracketing markers: the last at-or-before and first at-or-after.
    let left = markers[start..end]
        .iter()
        .enumerate()
        .take_while(|(_, m)| m.position_cm <= position_cm + 1e-9)
        .last()
        .map(|(i, _)| start + i);
    let right = (start..end).find(|&i| markers[i].position_cm >= position_cm - 1e-9);

    let left_r = left.map(|i| {
        cross.effective_recombination(haldane_recombination(
            position_cm - markers[i].position_cm,
        ))
    });
    let right_r = right.map(|i| {
        cross.effective_recombination(haldane_recombination(
            markers[i].position_cm - position_cm,
        ))
    });

    let mut priors = QtlPriors::new(cross.classes().to_vec());
    for ind in table.individuals() {
        for aug in &ind.augmentations {
            let left_flank = left.zip(left_r).map(|(i, r)| (aug.genotypes[i], r));
            let right_flank = right.zip(right_r).map(|(i, r)| (aug.genotypes[i], r));
            priors.push_row(&cross.flanked_prior(left_flank, right_flank));
        }
    }
    priors
}

fn within_cofactor_window(
    table: &CrossTable,
    cofactors: &[usize],
    chromosome: u16,
    position_cm: f64,
    window_cm: f64,
) -> bool {
    cofactors.iter().any(|&c| {
        let m = &table.markers()[c];
        m.chromosome == chromosome && (m.position_cm - position_cm).abs() < window_cm
    })
}

/// Scan the genome with the given cofactor set held fixed. Returns one
/// entry per (chromosome, grid position), in chromosome-then-position
/// order.
pub fn scan_positions(
    table: &CrossTable,
    cofactors: &[usize],
    cfg: &ScanConfig,
) -> Result<Vec<ProfileEntry>> {
    let opts = EmOptions::from_config(cfg);
    let null = fit_mixture(table, cofactors, None, &opts)
        .context("null model fit failed before scanning")?;
    if !null.converged {
        warn!("null model EM did not converge; LOD baseline uses its last estimates");
    }
    let ll_null = null.log_likelihood;

    let grid = position_grid(cfg);
    let sites: Vec<(u16, f64)> = table
        .chromosomes()
        .into_iter()
        .flat_map(|chromosome| grid.iter().map(move |&p| (chromosome, p)))
        .collect();

    let profile: Vec<ProfileEntry> = sites
        .par_iter()
        .map(|&(chromosome, position_cm)| {
            let outcome = if within_cofactor_window(
                table,
                cofactors,
                chromosome,
                position_cm,
                cfg.window_cm,
            ) {
                PositionOutcome::Excluded
            } else {
                let priors = priors_at_position(table, chromosome, position_cm);
                match fit_mixture(table, cofactors, Some(&priors), &opts) {
                    Ok(fit) => PositionOutcome::Lod {
                        lod: lod_score(fit.log_likelihood, ll_null),
                        converged: fit.converged,
                    },
                    Err(err) => {
                        warn!(chromosome, position_cm, "position fit failed: {err}");
                        PositionOutcome::Failed
                    }
                }
            };
            ProfileEntry {
                chromosome,
                position_cm,
                outcome,
            }
        })
        .collect();

    info!(
        positions = profile.len(),
        computed = profile.iter().filter(|e| e.lod().is_some()).count(),
        "scan finished"
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cross::{CrossType, Genotype};
    use crate::table::{Augmentation, Individual, MarkerInfo};
    use rand::{Rng, SeedableRng};

    fn scan_config() -> ScanConfig {
        ScanConfig {
            step_cm: 5.0,
            step_min_cm: 0.0,
            step_max_cm: 40.0,
            window_cm: 10.0,
            max_em_iter: 100,
            ..Default::default()
        }
    }

    /// Backcross, one chromosome 0..40 cM, QTL effect at the 20 cM marker,
    /// genotypes simulated with Haldane recombination between markers.
    fn scan_table() -> CrossTable {
        let markers = vec![
            MarkerInfo {
                name: "m1".into(),
                chromosome: 1,
                position_cm: 0.0,
            },
            MarkerInfo {
                name: "m2".into(),
                chromosome: 1,
                position_cm: 20.0,
            },
            MarkerInfo {
                name: "m3".into(),
                chromosome: 1,
                position_cm: 40.0,
            },
        ];
        let r = haldane_recombination(20.0);
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
        let mut individuals = Vec::new();
        for _ in 0..120 {
            let mut g = Vec::with_capacity(3);
            g.push(if rng.gen::<bool>() {
                Genotype::AA
            } else {
                Genotype::AB
            });
            for m in 1..3 {
                let prev: Genotype = g[m - 1];
                let next = if rng.gen::<f64>() < r {
                    if prev == Genotype::AA {
                        Genotype::AB
                    } else {
                        Genotype::AA
                    }
                } else {
                    prev
                };
                g.push(next);
            }
            let effect = if g[1] == Genotype::AB { 2.0 } else { 0.0 };
            let noise = rng.gen::<f64>() + rng.gen::<f64>() - 1.0;
            individuals.push(Individual {
                phenotype: effect + 0.5 * noise,
                augmentations: vec![Augmentation {
                    genotypes: g,
                    weight: 1.0,
                }],
            });
        }
        CrossTable::new(CrossType::Backcross, markers, individuals).unwrap()
    }

    #[test]
    fn test_grid_length() {
        let cfg = scan_config();
        let grid = position_grid(&cfg);
        assert_eq!(grid.len(), 9); // 0, 5, ..., 40
        assert_eq!(grid[0], 0.0);
        assert_eq!(*grid.last().unwrap(), 40.0);
    }

    #[test]
    fn test_profile_length_is_data_independent() {
        let table = scan_table();
        let cfg = scan_config();
        let profile = scan_positions(&table, &[], &cfg).unwrap();
        assert_eq!(profile.len(), position_grid(&cfg).len());
    }

    #[test]
    fn test_peak_near_causal_marker() {
        let table = scan_table();
        let cfg = scan_config();
        let profile = scan_positions(&table, &[], &cfg).unwrap();
        let best = profile
            .iter()
            .max_by(|a, b| {
                a.lod()
                    .unwrap_or(f64::NEG_INFINITY)
                    .total_cmp(&b.lod().unwrap_or(f64::NEG_INFINITY))
            })
            .unwrap();
        assert!(
            (best.position_cm - 20.0).abs() <= 5.0,
            "peak at {} cM",
            best.position_cm
        );
        assert!(best.lod().unwrap() > 3.0);
    }

    #[test]
    fn test_window_exclusion() {
        let table = scan_table();
        let cfg = scan_config();
        // Cofactor at the 20 cM marker excludes (10, 30) exclusive.
        let profile = scan_positions(&table, &[1], &cfg).unwrap();
        for entry in &profile {
            let near = (entry.position_cm - 20.0).abs() < cfg.window_cm;
            assert_eq!(
                entry.outcome == PositionOutcome::Excluded,
                near,
                "position {}",
                entry.position_cm
            );
        }
    }

    #[test]
    fn test_scan_is_deterministic() {
        let table = scan_table();
        let cfg = scan_config();
        let a = scan_positions(&table, &[], &cfg).unwrap();
        let b = scan_positions(&table, &[], &cfg).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.chromosome, y.chromosome);
            assert_eq!(x.position_cm, y.position_cm);
            match (x.lod(), y.lod()) {
                (Some(lx), Some(ly)) => assert!((lx - ly).abs() < 1e-9),
                (a, b) => assert_eq!(a, b),
            }
        }
    }

    #[test]
    fn test_ordering_chromosome_then_position() {
        let mut markers = scan_table().markers().to_vec();
        markers.push(MarkerInfo {
            name: "m4".into(),
            chromosome: 2,
            position_cm: 0.0,
        });
        let individuals: Vec<Individual> = scan_table()
            .individuals()
            .iter()
            .map(|ind| Individual {
                phenotype: ind.phenotype,
                augmentations: ind
                    .augmentations
                    .iter()
                    .map(|a| {
                        let mut g = a.genotypes.clone();
                        g.push(Genotype::AA);
                        Augmentation {
                            genotypes: g,
                            weight: a.weight,
                        }
                    })
                    .collect(),
            })
            .collect();
        let table = CrossTable::new(CrossType::Backcross, markers, individuals).unwrap();
        let cfg = scan_config();
        let profile = scan_positions(&table, &[], &cfg).unwrap();
        assert_eq!(profile.len(), 2 * position_grid(&cfg).len());
        for pair in profile.windows(2) {
            let ordered = pair[0].chromosome < pair[1].chromosome
                || (pair[0].chromosome == pair[1].chromosome
                    && pair[0].position_cm < pair[1].position_cm);
            assert!(ordered);
        }
    }
}
