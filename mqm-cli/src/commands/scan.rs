//! Run a genome scan.
//!
//! mqm scan --geno-file ... --pheno-file ... --map-file ... \
//!          --cross-type f2 --cofactors m12,m48 --backward \
//!          --n-permutations 1000 --output-prefix out/run1

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::input;
use mqm_core::{run_mqm, MqmResult, PositionOutcome, ScanConfig, VarianceMode};

#[derive(Args)]
pub struct ScanArgs {
    /// Genotype file (id, weight, one column per marker)
    #[arg(long)]
    geno_file: PathBuf,

    /// Phenotype file (id, phenotype)
    #[arg(long)]
    pheno_file: PathBuf,

    /// Map file (marker, chromosome, position)
    #[arg(long)]
    map_file: PathBuf,

    /// Cross type: f2, backcross, or ril
    #[arg(long, default_value = "f2")]
    cross_type: String,

    /// Initial cofactor marker names (comma-separated)
    #[arg(long, default_value = "")]
    cofactors: String,

    /// Run backward elimination on the cofactor set
    #[arg(long, default_value = "true")]
    backward: bool,

    /// Variance estimation: ml or reml
    #[arg(long, default_value = "ml")]
    variance_mode: String,

    /// Significance level for the selector's stopping rule
    #[arg(long, default_value = "0.02")]
    alpha: f64,

    /// EM iteration cap
    #[arg(long, default_value = "1000")]
    max_em_iter: usize,

    /// Exclusion radius around cofactors (cM)
    #[arg(long, default_value = "25.0")]
    window_cm: f64,

    /// Scan step size (cM)
    #[arg(long, default_value = "5.0")]
    step_cm: f64,

    /// First scanned position per chromosome (cM)
    #[arg(long, default_value = "0.0")]
    step_min_cm: f64,

    /// Last scanned position per chromosome (cM)
    #[arg(long, default_value = "200.0")]
    step_max_cm: f64,

    /// Number of permutation runs (0 = real-data scan only)
    #[arg(long, default_value = "0")]
    n_permutations: usize,

    /// Model a dominance deviation (F2 only)
    #[arg(long, default_value = "false")]
    dominance: bool,

    /// Re-estimate map distances before scanning
    #[arg(long, default_value = "false")]
    reestimate_map: bool,

    /// Master seed for permutation shuffles
    #[arg(long, default_value = "12345")]
    seed: u64,

    /// Output file prefix
    #[arg(long)]
    output_prefix: String,

    /// Also save a JSON summary sidecar
    #[arg(long, default_value = "false")]
    save_json: bool,
}

fn write_profile(result: &MqmResult, path: &Path) -> Result<()> {
    let mut out = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writeln!(out, "chromosome\tposition_cm\tlod\tstatus")?;
    for entry in &result.profile {
        match entry.outcome {
            PositionOutcome::Lod { lod, converged } => writeln!(
                out,
                "{}\t{:.4}\t{:.6}\t{}",
                entry.chromosome,
                entry.position_cm,
                lod,
                if converged { "ok" } else { "nonconverged" }
            )?,
            PositionOutcome::Excluded => writeln!(
                out,
                "{}\t{:.4}\tNA\texcluded",
                entry.chromosome, entry.position_cm
            )?,
            PositionOutcome::Failed => writeln!(
                out,
                "{}\t{:.4}\tNA\tfailed",
                entry.chromosome, entry.position_cm
            )?,
        }
    }
    Ok(())
}

fn write_permutations(maxima: &[f64], path: &Path) -> Result<()> {
    let mut out = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writeln!(out, "run\tmax_lod")?;
    for (run, max) in maxima.iter().enumerate() {
        writeln!(out, "{run}\t{max:.6}")?;
    }
    Ok(())
}

pub fn run(args: ScanArgs) -> Result<()> {
    let cross_type = input::parse_cross_type(&args.cross_type)?;
    let variance_mode = match args.variance_mode.to_lowercase().as_str() {
        "ml" => VarianceMode::FullMl,
        "reml" => VarianceMode::RestrictedMl,
        other => anyhow::bail!("Unknown variance mode: {other}"),
    };

    info!("=== MQM scan ===");
    info!("Cross type: {cross_type}");
    info!("Genotype file: {}", args.geno_file.display());

    let table = input::load_table(
        &args.geno_file,
        &args.pheno_file,
        &args.map_file,
        cross_type,
    )?;
    info!(
        "Loaded {} individuals ({} augmented) x {} markers",
        table.n_individuals(),
        table.n_augmented(),
        table.n_markers()
    );

    let cofactors: Vec<usize> = if args.cofactors.is_empty() {
        Vec::new()
    } else {
        args.cofactors
            .split(',')
            .map(|name| {
                let name = name.trim();
                table
                    .marker_index(name)
                    .ok_or_else(|| anyhow::anyhow!("unknown cofactor marker '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?
    };
    info!("Initial cofactors: {}", cofactors.len());

    let cfg = ScanConfig {
        backward: args.backward,
        variance_mode,
        alpha: args.alpha,
        max_em_iter: args.max_em_iter,
        window_cm: args.window_cm,
        step_cm: args.step_cm,
        step_min_cm: args.step_min_cm,
        step_max_cm: args.step_max_cm,
        n_permutations: args.n_permutations,
        reestimate_map: args.reestimate_map,
        dominance: args.dominance,
        seed: args.seed,
        ..Default::default()
    };

    let result = run_mqm(&table, &cofactors, &cfg)?;

    let kept: Vec<&str> = result
        .cofactors
        .iter()
        .map(|&c| table.markers()[c].name.as_str())
        .collect();
    info!("Cofactors in the scan model: [{}]", kept.join(", "));

    let profile_path = Path::new(&args.output_prefix).with_extension("profile.tsv");
    write_profile(&result, &profile_path)?;
    info!("Profile written to {}", profile_path.display());

    if !result.permutation_maxima.is_empty() {
        let perm_path = Path::new(&args.output_prefix).with_extension("permutations.tsv");
        write_permutations(&result.permutation_maxima, &perm_path)?;
        info!("Permutation maxima written to {}", perm_path.display());
    }

    if args.save_json {
        let json_path = Path::new(&args.output_prefix).with_extension("summary.json");
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        info!("JSON summary written to {}", json_path.display());
    }

    let best = result
        .profile
        .iter()
        .filter_map(|e| e.lod().map(|l| (e, l)))
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((entry, lod)) = best {
        println!(
            "max LOD {:.3} at chromosome {} position {:.1} cM",
            lod, entry.chromosome, entry.position_cm
        );
    }

    Ok(())
}
