//! Parse and validate the input files without scanning.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::input;

#[derive(Args)]
pub struct CheckArgs {
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
}

pub fn run(args: CheckArgs) -> Result<()> {
    let cross_type = input::parse_cross_type(&args.cross_type)?;
    let table = input::load_table(
        &args.geno_file,
        &args.pheno_file,
        &args.map_file,
        cross_type,
    )?;

    println!("cross type:    {}", table.cross_type());
    println!("individuals:   {}", table.n_individuals());
    println!("augmented:     {}", table.n_augmented());
    println!("markers:       {}", table.n_markers());
    for chromosome in table.chromosomes() {
        let (start, end) = table.chromosome_span(chromosome).expect("listed chromosome");
        let first = &table.markers()[start];
        let last = &table.markers()[end - 1];
        println!(
            "chromosome {:>3}: {} markers, {:.1}..{:.1} cM",
            chromosome,
            end - start,
            first.position_cm,
            last.position_cm
        );
    }
    println!("ok");
    Ok(())
}
