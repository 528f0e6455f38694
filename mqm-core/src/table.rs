//! The augmented genotype/phenotype table.
//!
//! Built once from the upstream augmentation utility's output and
//! read-only afterwards, so scans and permutation runs can share it
//! across worker threads without locking. Each real individual owns its
//! augmentations directly; there is no auxiliary index list to keep in
//! sync.

use anyhow::{bail, Result};

use crate::cross::{CrossType, Genotype};

/// A marker with its place on the genetic map.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerInfo {
    pub name: String,
    pub chromosome: u16,
    pub position_cm: f64,
}

/// One possible resolution of an individual's missing or ambiguous
/// genotypes, with its prior probability weight.
#[derive(Debug, Clone)]
pub struct Augmentation {
    /// One genotype per marker, in table marker order.
    pub genotypes: Vec<Genotype>,
    /// Prior weight; weights sum to 1 across an individual's augmentations.
    pub weight: f64,
}

/// A real observed individual: its phenotype plus the ordered list of
/// weighted augmentations that represent it.
#[derive(Debug, Clone)]
pub struct Individual {
    pub phenotype: f64,
    pub augmentations: Vec<Augmentation>,
}

/// The immutable input snapshot for a scan: markers, map, and the
/// augmented individuals of one cross family.
#[derive(Debug, Clone)]
pub struct CrossTable {
    cross_type: CrossType,
    markers: Vec<MarkerInfo>,
    individuals: Vec<Individual>,
}

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl CrossTable {
    /// Build and validate a table. Markers must be sorted by chromosome
    /// then position; every augmentation must carry one alphabet-conformant
    /// genotype per marker, and each individual's weights must sum to 1.
    pub fn new(
        cross_type: CrossType,
        markers: Vec<MarkerInfo>,
        individuals: Vec<Individual>,
    ) -> Result<Self> {
        if markers.is_empty() {
            bail!("table has no markers");
        }
        if individuals.is_empty() {
            bail!("table has no individuals");
        }

        for pair in markers.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.chromosome < a.chromosome {
                bail!(
                    "markers not sorted: chromosome {} follows {}",
                    b.chromosome,
                    a.chromosome
                );
            }
            if b.chromosome == a.chromosome && b.position_cm < a.position_cm {
                bail!(
                    "markers {} and {} out of order on chromosome {}",
                    a.name,
                    b.name,
                    a.chromosome
                );
            }
        }

        let alphabet = cross_type.classes();
        for (i, ind) in individuals.iter().enumerate() {
            if !ind.phenotype.is_finite() {
                bail!("individual {i} has a non-finite phenotype");
            }
            if ind.augmentations.is_empty() {
                bail!("individual {i} has no augmentations");
            }
            let mut weight_sum = 0.0;
            for aug in &ind.augmentations {
                if aug.genotypes.len() != markers.len() {
                    bail!(
                        "individual {i}: augmentation carries {} genotypes for {} markers",
                        aug.genotypes.len(),
                        markers.len()
                    );
                }
                if !(aug.weight.is_finite() && aug.weight > 0.0) {
                    bail!("individual {i}: augmentation weight {} invalid", aug.weight);
                }
                if let Some(&g) = aug.genotypes.iter().find(|&g| !alphabet.contains(g)) {
                    bail!("individual {i}: genotype {g} not in the {cross_type} alphabet");
                }
                weight_sum += aug.weight;
            }
            if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
                bail!("individual {i}: augmentation weights sum to {weight_sum}, expected 1");
            }
        }

        Ok(Self {
            cross_type,
            markers,
            individuals,
        })
    }

    pub fn cross_type(&self) -> CrossType {
        self.cross_type
    }

    pub fn markers(&self) -> &[MarkerInfo] {
        &self.markers
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn n_individuals(&self) -> usize {
        self.individuals.len()
    }

    /// Total number of augmented pseudo-individuals.
    pub fn n_augmented(&self) -> usize {
        self.individuals.iter().map(|i| i.augmentations.len()).sum()
    }

    /// Distinct chromosome ids in map order.
    pub fn chromosomes(&self) -> Vec<u16> {
        let mut out: Vec<u16> = Vec::new();
        for m in &self.markers {
            if out.last() != Some(&m.chromosome) {
                out.push(m.chromosome);
            }
        }
        out
    }

    /// Index range [start, end) of the markers on one chromosome.
    pub fn chromosome_span(&self, chromosome: u16) -> Option<(usize, usize)> {
        let start = self
            .markers
            .iter()
            .position(|m| m.chromosome == chromosome)?;
        let end = start
            + self.markers[start..]
                .iter()
                .take_while(|m| m.chromosome == chromosome)
                .count();
        Some((start, end))
    }

    /// Look up a marker index by name.
    pub fn marker_index(&self, name: &str) -> Option<usize> {
        self.markers.iter().position(|m| m.name == name)
    }

    /// A copy of this table with the phenotype values reassigned to
    /// individuals according to `order`: individual `i` receives the
    /// phenotype of individual `order[i]`. Augmentations stay with their
    /// individual, so the within-individual weight structure is preserved.
    pub fn with_permuted_phenotypes(&self, order: &[usize]) -> Result<CrossTable> {
        if order.len() != self.individuals.len() {
            bail!(
                "permutation length {} does not match {} individuals",
                order.len(),
                self.individuals.len()
            );
        }
        let mut individuals = self.individuals.clone();
        for (i, &src) in order.iter().enumerate() {
            if src >= self.individuals.len() {
                bail!("permutation index {src} out of range");
            }
            individuals[i].phenotype = self.individuals[src].phenotype;
        }
        Ok(CrossTable {
            cross_type: self.cross_type,
            markers: self.markers.clone(),
            individuals,
        })
    }

    /// A copy of this table with the marker positions replaced.
    /// Used by map re-estimation; the marker order is unchanged.
    pub(crate) fn with_positions(&self, positions: Vec<f64>) -> CrossTable {
        assert_eq!(positions.len(), self.markers.len());
        let markers = self
            .markers
            .iter()
            .zip(positions)
            .map(|(m, position_cm)| MarkerInfo {
                name: m.name.clone(),
                chromosome: m.chromosome,
                position_cm,
            })
            .collect();
        CrossTable {
            cross_type: self.cross_type,
            markers,
            individuals: self.individuals.clone(),
        }
    }
}
