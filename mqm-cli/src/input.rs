//! TSV input parsing for the scanner.
//!
//! Three files describe one cross family: a map file (marker,
//! chromosome, position), a phenotype file (individual id, value), and
//! a genotype file with one row per augmentation (individual id,
//! weight, one genotype column per marker). The augmentation utility
//! that produces the genotype file has already resolved missing data,
//! so every genotype cell must be a concrete call.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};

use mqm_core::{Augmentation, CrossTable, CrossType, Genotype, Individual, MarkerInfo};

fn read_rows(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let header_line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("{} is empty", path.display()))?;

    let split = |line: &str| -> Vec<String> {
        line.split('\t').map(|s| s.trim().to_string()).collect()
    };

    let header = split(header_line);
    let mut rows = Vec::new();
    for (lineno, line) in lines.enumerate() {
        let row = split(line);
        if row.len() != header.len() {
            bail!(
                "{} line {}: {} fields, expected {}",
                path.display(),
                lineno + 2,
                row.len(),
                header.len()
            );
        }
        rows.push(row);
    }
    Ok((header, rows))
}

/// Cross-type name as accepted on the command line.
pub fn parse_cross_type(name: &str) -> Result<CrossType> {
    match name.to_lowercase().as_str() {
        "f2" => Ok(CrossType::F2),
        "backcross" | "bc" => Ok(CrossType::Backcross),
        "ril" => Ok(CrossType::Ril),
        other => bail!("Unknown cross type: {other}"),
    }
}

fn parse_genotype(code: &str) -> Result<Genotype> {
    match code {
        "AA" | "A" => Ok(Genotype::AA),
        "AB" | "H" => Ok(Genotype::AB),
        "BB" | "B" => Ok(Genotype::BB),
        other => bail!("unknown genotype code '{other}' (augmented input must be complete)"),
    }
}

/// Map file: columns `marker`, `chromosome`, `position`.
/// Markers are returned sorted by chromosome then position.
pub fn load_map(path: &Path) -> Result<Vec<MarkerInfo>> {
    let (header, rows) = read_rows(path)?;
    let col = |name: &str| -> Result<usize> {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow::anyhow!("{}: missing column '{name}'", path.display()))
    };
    let (m_col, c_col, p_col) = (col("marker")?, col("chromosome")?, col("position")?);

    let mut markers = Vec::with_capacity(rows.len());
    for row in &rows {
        markers.push(MarkerInfo {
            name: row[m_col].clone(),
            chromosome: row[c_col]
                .parse()
                .with_context(|| format!("bad chromosome '{}'", row[c_col]))?,
            position_cm: row[p_col]
                .parse()
                .with_context(|| format!("bad position '{}'", row[p_col]))?,
        });
    }
    markers.sort_by(|a, b| {
        (a.chromosome, a.position_cm)
            .partial_cmp(&(b.chromosome, b.position_cm))
            .expect("finite positions")
    });
    Ok(markers)
}

/// Phenotype file: columns `id`, `phenotype`.
pub fn load_phenotypes(path: &Path) -> Result<HashMap<String, f64>> {
    let (header, rows) = read_rows(path)?;
    let id_col = header
        .iter()
        .position(|h| h == "id")
        .ok_or_else(|| anyhow::anyhow!("{}: missing column 'id'", path.display()))?;
    let ph_col = header
        .iter()
        .position(|h| h == "phenotype")
        .ok_or_else(|| anyhow::anyhow!("{}: missing column 'phenotype'", path.display()))?;

    let mut phenotypes = HashMap::with_capacity(rows.len());
    for row in &rows {
        let value: f64 = row[ph_col]
            .parse()
            .with_context(|| format!("bad phenotype '{}' for {}", row[ph_col], row[id_col]))?;
        if phenotypes.insert(row[id_col].clone(), value).is_some() {
            bail!("duplicate phenotype row for individual '{}'", row[id_col]);
        }
    }
    Ok(phenotypes)
}

/// Genotype file: columns `id`, `weight`, then one column per marker
/// name. Rows sharing an id are that individual's augmentations, in
/// file order.
pub fn load_table(
    geno_path: &Path,
    pheno_path: &Path,
    map_path: &Path,
    cross_type: CrossType,
) -> Result<CrossTable> {
    let markers = load_map(map_path)?;
    let phenotypes = load_phenotypes(pheno_path)?;
    let (header, rows) = read_rows(geno_path)?;

    if header.first().map(String::as_str) != Some("id")
        || header.get(1).map(String::as_str) != Some("weight")
    {
        bail!(
            "{}: expected leading columns 'id' and 'weight'",
            geno_path.display()
        );
    }

    // Genotype columns may appear in any order; map them to map order.
    let marker_cols: Vec<usize> = markers
        .iter()
        .map(|m| {
            header
                .iter()
                .position(|h| *h == m.name)
                .ok_or_else(|| {
                    anyhow::anyhow!("{}: missing genotype column '{}'", geno_path.display(), m.name)
                })
        })
        .collect::<Result<Vec<_>>>()?;

    // Group augmentation rows by individual, preserving first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<Augmentation>> = HashMap::new();
    for row in &rows {
        let id = &row[0];
        let weight: f64 = row[1]
            .parse()
            .with_context(|| format!("bad weight '{}' for {id}", row[1]))?;
        let genotypes = marker_cols
            .iter()
            .map(|&c| parse_genotype(&row[c]))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("individual {id}"))?;
        if !grouped.contains_key(id) {
            order.push(id.clone());
        }
        grouped
            .entry(id.clone())
            .or_default()
            .push(Augmentation { genotypes, weight });
    }

    let mut individuals = Vec::with_capacity(order.len());
    for id in &order {
        let phenotype = *phenotypes
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("no phenotype for individual '{id}'"))?;
        individuals.push(Individual {
            phenotype,
            augmentations: grouped.remove(id).expect("grouped by construction"),
        });
    }

    CrossTable::new(cross_type, markers, individuals)
        .context("genotype table failed validation")
}
