//! Shared test fixture: a simulated F2 cross with one true QTL.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use mqm_core::map::haldane_recombination;
use mqm_core::{Augmentation, CrossTable, CrossType, Genotype, Individual, MarkerInfo};

/// Map position of the true QTL (it sits on a marker on chromosome 1).
pub const TRUE_QTL_CM: f64 = 30.0;
pub const TRUE_QTL_CHROMOSOME: u16 = 1;

fn genotype_from_b_count(b: u8) -> Genotype {
    match b {
        0 => Genotype::AA,
        1 => Genotype::AB,
        _ => Genotype::BB,
    }
}

/// Simulate an F2 cross: chromosome 1 with markers every 10 cM over
/// 0..60, chromosome 2 over 0..40, a QTL of additive effect `effect` at
/// the 30 cM marker on chromosome 1, and Gaussian noise of unit-ish
/// spread. A few individuals get an ambiguous marker expanded into
/// three weighted augmentations.
pub fn simulate_f2(n: usize, effect: f64, seed: u64) -> CrossTable {
    let mut markers = Vec::new();
    for (chromosome, span) in [(1u16, 60.0), (2u16, 40.0)] {
        let mut pos = 0.0;
        let mut idx = 0;
        while pos <= span + 1e-9 {
            markers.push(MarkerInfo {
                name: format!("c{chromosome}m{idx}"),
                chromosome,
                position_cm: pos,
            });
            pos += 10.0;
            idx += 1;
        }
    }
    let causal = markers
        .iter()
        .position(|m| m.chromosome == TRUE_QTL_CHROMOSOME && m.position_cm == TRUE_QTL_CM)
        .expect("causal marker on the map");

    let r = haldane_recombination(10.0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut individuals = Vec::with_capacity(n);

    for i in 0..n {
        // Two independent gametes per chromosome, Markov along the map.
        let mut genotypes = vec![Genotype::AA; markers.len()];
        let mut m = 0;
        while m < markers.len() {
            let chromosome = markers[m].chromosome;
            let mut hap = [rng.gen::<bool>(), rng.gen::<bool>()];
            while m < markers.len() && markers[m].chromosome == chromosome {
                genotypes[m] = genotype_from_b_count(hap[0] as u8 + hap[1] as u8);
                for h in hap.iter_mut() {
                    if rng.gen::<f64>() < r {
                        *h = !*h;
                    }
                }
                m += 1;
            }
        }

        let additive = genotypes[causal].additive_code();
        // Box-Muller normal noise.
        let (u1, u2) = (rng.gen::<f64>().max(1e-12), rng.gen::<f64>());
        let noise = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        let phenotype = effect * additive + 0.7 * noise;

        // Every tenth individual gets one ambiguous (non-causal) marker,
        // expanded into the three weighted possibilities.
        let augmentations = if i % 10 == 0 {
            let ambiguous = if causal == 0 { 1 } else { causal - 1 };
            [
                (Genotype::AA, 0.25),
                (Genotype::AB, 0.5),
                (Genotype::BB, 0.25),
            ]
            .into_iter()
            .map(|(g, weight)| {
                let mut resolved = genotypes.clone();
                resolved[ambiguous] = g;
                Augmentation {
                    genotypes: resolved,
                    weight,
                }
            })
            .collect()
        } else {
            vec![Augmentation {
                genotypes,
                weight: 1.0,
            }]
        };

        individuals.push(Individual {
            phenotype,
            augmentations,
        });
    }

    CrossTable::new(CrossType::F2, markers, individuals).expect("simulated table is valid")
}
