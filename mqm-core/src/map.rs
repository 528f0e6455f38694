//! Genetic-map helpers: the Haldane map function and optional
//! re-estimation of inter-marker distances from the augmented data.
//!
//! Re-estimation updates distances on the fixed marker order only;
//! ordering markers is linkage-map construction and stays upstream.

use tracing::debug;

use crate::table::CrossTable;

/// Largest recombination fraction the inverse map function accepts;
/// keeps re-estimated distances finite.
const MAX_RECOMBINATION: f64 = 0.4999;

/// Haldane map function: distance in cM to recombination fraction.
pub fn haldane_recombination(distance_cm: f64) -> f64 {
    0.5 * (1.0 - (-2.0 * distance_cm.max(0.0) / 100.0).exp())
}

/// Inverse Haldane map function: recombination fraction to cM.
pub fn inverse_haldane(r: f64) -> f64 {
    let r = r.clamp(0.0, MAX_RECOMBINATION);
    -50.0 * (1.0 - 2.0 * r).ln()
}

/// Re-estimate the map distances between adjacent markers from the
/// augmentation-weighted expected recombination counts, and return a
/// table with the updated positions. Each chromosome keeps its first
/// marker's position as the anchor.
pub fn reestimate_map(table: &CrossTable) -> CrossTable {
    let cross = table.cross_type();
    let markers = table.markers();
    let mut positions: Vec<f64> = markers.iter().map(|m| m.position_cm).collect();

    for chromosome in table.chromosomes() {
        let (start, end) = table
            .chromosome_span(chromosome)
            .expect("chromosome listed but not spanned");
        let mut cursor = markers[start].position_cm;
        positions[start] = cursor;

        for m in start..end.saturating_sub(1) {
            let old_distance = markers[m + 1].position_cm - markers[m].position_cm;
            let r0 = haldane_recombination(old_distance).min(MAX_RECOMBINATION);

            let mut expected = 0.0;
            for ind in table.individuals() {
                for aug in &ind.augmentations {
                    expected += aug.weight
                        * cross.expected_recombinations(
                            aug.genotypes[m],
                            aug.genotypes[m + 1],
                            r0,
                        );
                }
            }
            let meioses = table.n_individuals() as f64 * cross.meioses_per_individual();
            let observed = (expected / meioses).clamp(0.0, MAX_RECOMBINATION);
            let r = cross
                .meiotic_recombination(observed)
                .clamp(0.0, MAX_RECOMBINATION);
            let new_distance = inverse_haldane(r);
            debug!(
                marker = markers[m].name.as_str(),
                old_distance, new_distance, "re-estimated interval"
            );
            cursor += new_distance;
            positions[m + 1] = cursor;
        }
    }

    table.with_positions(positions)
}
