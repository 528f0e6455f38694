//! The permutation harness and the top-level MQM pipeline.
//!
//! `run_mqm` validates the configuration, optionally re-estimates the
//! map and runs backward elimination, scans the real data, and then
//! repeats the (selector +) scanner pipeline on phenotype-shuffled
//! copies of the table to collect a null distribution of genome-wide
//! maximum LOD scores. Per-run seeds are drawn from the master seed up
//! front, so runs are independent, order-insensitive, and safe to fan
//! out across rayon workers.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::config::ScanConfig;
use crate::map::reestimate_map;
use crate::scan::{scan_positions, ProfileEntry};
use crate::selector::{backward_eliminate, SelectionResult};
use crate::table::CrossTable;

/// The result of one MQM invocation.
#[derive(Debug, Clone, Serialize)]
pub struct MqmResult {
    /// Genome-wide profile from the real-data scan.
    pub profile: Vec<ProfileEntry>,
    /// Cofactors the real-data scan conditioned on.
    pub cofactors: Vec<usize>,
    /// Elimination trace of the real-data selector run, when it ran.
    #[serde(skip)]
    pub selection: Option<SelectionResult>,
    /// Genome-wide maximum LOD per permutation run; empty when
    /// `n_permutations == 0`.
    pub permutation_maxima: Vec<f64>,
}

/// Genome-wide maximum over the computed entries of a profile.
fn profile_maximum(profile: &[ProfileEntry]) -> f64 {
    profile
        .iter()
        .filter_map(|e| e.lod())
        .filter(|l| l.is_finite())
        .fold(f64::NEG_INFINITY, f64::max)
}

/// One permutation run: shuffle phenotypes across real individuals,
/// re-select cofactors if backward elimination is on, scan, and report
/// the maximum statistic.
fn permutation_run(
    table: &CrossTable,
    initial_cofactors: &[usize],
    cfg: &ScanConfig,
    seed: u64,
) -> Result<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..table.n_individuals()).collect();
    order.shuffle(&mut rng);
    let shuffled = table.with_permuted_phenotypes(&order)?;

    let cofactors = if cfg.backward {
        backward_eliminate(&shuffled, initial_cofactors, cfg)?.cofactors
    } else {
        initial_cofactors.to_vec()
    };
    let profile = scan_positions(&shuffled, &cofactors, cfg)?;
    Ok(profile_maximum(&profile))
}

/// Run the full MQM pipeline: selector, scanner, and permutation
/// harness, per the configuration.
pub fn run_mqm(
    table: &CrossTable,
    initial_cofactors: &[usize],
    cfg: &ScanConfig,
) -> Result<MqmResult> {
    cfg.validate(table, initial_cofactors)
        .context("invalid scan configuration")?;

    let owned;
    let table = if cfg.reestimate_map {
        info!("re-estimating map distances before scanning");
        owned = reestimate_map(table);
        &owned
    } else {
        table
    };

    let selection = if cfg.backward {
        Some(backward_eliminate(table, initial_cofactors, cfg)?)
    } else {
        None
    };
    let cofactors = selection
        .as_ref()
        .map(|s| s.cofactors.clone())
        .unwrap_or_else(|| {
            let mut c = initial_cofactors.to_vec();
            c.sort_unstable();
            c
        });

    let profile = scan_positions(table, &cofactors, cfg)?;

    let permutation_maxima = if cfg.n_permutations > 0 {
        let mut master = ChaCha8Rng::seed_from_u64(cfg.seed);
        let seeds: Vec<u64> = (0..cfg.n_permutations).map(|_| master.gen()).collect();
        info!(runs = cfg.n_permutations, "starting permutation runs");
        seeds
            .par_iter()
            .map(|&seed| permutation_run(table, initial_cofactors, cfg, seed))
            .collect::<Result<Vec<f64>>>()?
    } else {
        Vec::new()
    };

    Ok(MqmResult {
        profile,
        cofactors,
        selection,
        permutation_maxima,
    })
}
