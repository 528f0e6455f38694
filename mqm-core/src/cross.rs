//! Cross types and their segregation models.
//!
//! The experimental cross fixes the genotype alphabet, the expected
//! segregation ratios, and the two-locus transition probabilities used
//! to place a putative QTL between flanking markers. All cross-specific
//! behavior is dispatched through `CrossType` so the estimator and the
//! scanner never branch on the cross themselves.

use serde::{Deserialize, Serialize};

/// A genotype class. The alphabet in use depends on the cross:
/// F2 {AA, AB, BB}, backcross {AA, AB}, RIL {AA, BB}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Genotype {
    AA = 0,
    AB = 1,
    BB = 2,
}

impl Genotype {
    /// Additive coding used for cofactor and class-mean columns:
    /// number of B alleles, centered.
    pub fn additive_code(self) -> f64 {
        match self {
            Genotype::AA => -1.0,
            Genotype::AB => 0.0,
            Genotype::BB => 1.0,
        }
    }

    /// Number of B alleles carried.
    fn b_alleles(self) -> u8 {
        match self {
            Genotype::AA => 0,
            Genotype::AB => 1,
            Genotype::BB => 2,
        }
    }
}

impl std::fmt::Display for Genotype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Genotype::AA => write!(f, "AA"),
            Genotype::AB => write!(f, "AB"),
            Genotype::BB => write!(f, "BB"),
        }
    }
}

/// The experimental cross design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossType {
    F2,
    Backcross,
    Ril,
}

impl CrossType {
    /// Size of the genotype alphabet.
    pub fn class_count(&self) -> usize {
        match self {
            CrossType::F2 => 3,
            CrossType::Backcross | CrossType::Ril => 2,
        }
    }

    /// The genotype classes of this cross, in fixed order.
    pub fn classes(&self) -> &'static [Genotype] {
        match self {
            CrossType::F2 => &[Genotype::AA, Genotype::AB, Genotype::BB],
            CrossType::Backcross => &[Genotype::AA, Genotype::AB],
            CrossType::Ril => &[Genotype::AA, Genotype::BB],
        }
    }

    /// Whether a dominance deviation is a meaningful parameter.
    pub fn supports_dominance(&self) -> bool {
        matches!(self, CrossType::F2)
    }

    /// Expected segregation frequency of a genotype class.
    pub fn segregation_prior(&self, g: Genotype) -> f64 {
        match self {
            CrossType::F2 => match g {
                Genotype::AA | Genotype::BB => 0.25,
                Genotype::AB => 0.5,
            },
            CrossType::Backcross | CrossType::Ril => 0.5,
        }
    }

    /// Informative meioses per individual per marker interval.
    pub fn meioses_per_individual(&self) -> f64 {
        match self {
            CrossType::F2 => 2.0,
            CrossType::Backcross | CrossType::Ril => 1.0,
        }
    }

    /// Two-locus genotype transition probability P(to | from) at
    /// recombination fraction `r`. For RILs `r` is the effective
    /// (map-expanded) fraction R = 2r/(1+2r) already.
    pub fn transition(&self, from: Genotype, to: Genotype, r: f64) -> f64 {
        match self {
            CrossType::Backcross | CrossType::Ril => {
                if from == to {
                    1.0 - r
                } else {
                    r
                }
            }
            CrossType::F2 => {
                let s = 1.0 - r;
                match (from.b_alleles(), to.b_alleles()) {
                    (0, 0) | (2, 2) => s * s,
                    (0, 1) | (2, 1) => 2.0 * r * s,
                    (0, 2) | (2, 0) => r * r,
                    (1, 0) | (1, 2) => r * s,
                    (1, 1) => s * s + r * r,
                    _ => unreachable!(),
                }
            }
        }
    }

    /// Effective two-locus recombination fraction seen in the final
    /// genotypes, as a function of the meiotic fraction `r`. Identity
    /// except for RILs, where repeated selfing expands the map.
    pub fn effective_recombination(&self, r: f64) -> f64 {
        match self {
            CrossType::Ril => 2.0 * r / (1.0 + 2.0 * r),
            _ => r,
        }
    }

    /// Inverse of `effective_recombination`: the meiotic fraction that
    /// produces an observed fraction `observed`.
    pub fn meiotic_recombination(&self, observed: f64) -> f64 {
        match self {
            CrossType::Ril => observed / (2.0 - 2.0 * observed).max(f64::MIN_POSITIVE),
            _ => observed,
        }
    }

    /// Expected number of recombinant meioses between two adjacent
    /// markers, given the joint genotypes and the current meiotic
    /// fraction `r`. Used by map re-estimation.
    pub fn expected_recombinations(&self, a: Genotype, b: Genotype, r: f64) -> f64 {
        match self {
            CrossType::Backcross | CrossType::Ril => {
                if a == b {
                    0.0
                } else {
                    1.0
                }
            }
            CrossType::F2 => {
                let (na, nb) = (a.b_alleles() as i8, b.b_alleles() as i8);
                if na == 1 && nb == 1 {
                    // Double heterozygote: either zero or two recombinant
                    // gametes, weighted by their relative probability.
                    let s = 1.0 - r;
                    2.0 * r * r / (s * s + r * r)
                } else {
                    (na - nb).abs() as f64
                }
            }
        }
    }

    /// Genotype-class prior at a scanned position, conditioned on the
    /// flanking marker genotypes. Each flank is (genotype, effective
    /// recombination fraction to the position); a missing flank means
    /// the position lies outside the marker span on that side. With no
    /// flank at all the segregation prior applies.
    ///
    /// Returns one prior per class in `classes()` order, normalized to
    /// sum to 1.
    pub fn flanked_prior(
        &self,
        left: Option<(Genotype, f64)>,
        right: Option<(Genotype, f64)>,
    ) -> Vec<f64> {
        let classes = self.classes();
        let mut priors: Vec<f64> = classes
            .iter()
            .map(|&c| {
                let mut p = 1.0;
                match left {
                    Some((g, r)) => p *= self.transition(g, c, r),
                    None => p *= self.segregation_prior(c),
                }
                if let Some((g, r)) = right {
                    p *= self.transition(c, g, r);
                }
                p
            })
            .collect();

        let sum: f64 = priors.iter().sum();
        if sum > 0.0 {
            for p in priors.iter_mut() {
                *p /= sum;
            }
        } else {
            // Flanks contradict each other at zero recombination; fall
            // back to the unconditional segregation prior.
            for (p, &c) in priors.iter_mut().zip(classes.iter()) {
                *p = self.segregation_prior(c);
            }
        }
        priors
    }
}

impl std::fmt::Display for CrossType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrossType::F2 => write!(f, "F2"),
            CrossType::Backcross => write!(f, "backcross"),
            CrossType::Ril => write!(f, "RIL"),
        }
    }
}
