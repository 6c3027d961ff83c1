//! Rooted-triplet pseudo-likelihood of a species tree.
//!
//! Under the multispecies coalescent a gene tree agrees with the species
//! tree on three species with probability `1 - 2/3 exp(-tau / Ne)`, where
//! `tau` is the internal branch of the species triplet; each of the two
//! other resolutions has probability `1/3 exp(-tau / Ne)`. Treating the
//! triplets of a gene-tree sample as independent gives a pseudo-likelihood
//! that can be computed from counts alone. It is not a generative model, so
//! counts cannot be simulated.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dag::{ensure_swapped, erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode};
use crate::distribution::Distribution;
use crate::error::{GraphError, ModelError};
use crate::rng::RandomSource;
use crate::taxon::Taxon;
use crate::tree::{RootedTriplet, Tree};

const OWNER: &str = "triplet coalescent";

/// How often a resolution of three species was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripletCount {
    pub triplet: RootedTriplet,
    pub count: u64,
}

/// Observed rooted-triplet counts over a set of gene trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripletCounts {
    counts: Vec<TripletCount>,
}

impl TripletCounts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` observations of `triplet`.
    pub fn add(&mut self, triplet: RootedTriplet, count: u64) {
        match self.counts.iter_mut().find(|c| c.triplet == triplet) {
            Some(existing) => existing.count += count,
            None => self.counts.push(TripletCount { triplet, count }),
        }
    }

    /// Tallies the species triplets displayed by `gene_trees`.
    ///
    /// Gene tips are mapped to species through `taxa`; triplets spanning
    /// fewer than three species carry no information and are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownSpecies` for a gene tip that is not in
    /// `taxa`.
    pub fn tally(gene_trees: &[Tree], taxa: &[Taxon]) -> Result<Self, ModelError> {
        let species_of: HashMap<&str, &str> = taxa.iter().map(|t| (t.name(), t.species())).collect();
        let mut tally: BTreeMap<RootedTriplet, u64> = BTreeMap::new();
        for tree in gene_trees {
            for triplet in tree.rooted_triplets() {
                let species = |name: &str| {
                    species_of.get(name).copied().ok_or_else(|| ModelError::UnknownSpecies {
                        taxon: name.to_string(),
                        species: String::new(),
                    })
                };
                let [a, b] = triplet.pair();
                let (a, b, c) = (species(a.as_str())?, species(b.as_str())?, species(triplet.outgroup())?);
                if a == b || b == c || a == c {
                    continue;
                }
                *tally.entry(RootedTriplet::new(a, b, c)).or_insert(0) += 1;
            }
        }
        Ok(Self {
            counts: tally
                .into_iter()
                .map(|(triplet, count)| TripletCount { triplet, count })
                .collect(),
        })
    }

    #[must_use]
    pub fn counts(&self) -> &[TripletCount] {
        &self.counts
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// Pseudo-likelihood of observed [`TripletCounts`] given a species tree and a
/// population size.
#[derive(Debug, Clone)]
pub struct TripletCoalescent {
    species_tree: TypedDagNode<Tree>,
    population: TypedDagNode<f64>,
}

impl TripletCoalescent {
    #[must_use]
    pub fn new(species_tree: TypedDagNode<Tree>, population: TypedDagNode<f64>) -> Self {
        Self {
            species_tree,
            population,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn ln_density(&self, counts: &TripletCounts) -> f64 {
        let ne = *self.population.value();
        if !(ne.is_finite() && ne > 0.0) {
            return f64::NEG_INFINITY;
        }
        let species = self.species_tree.value();
        let mut ln = 0.0;
        for observed in &counts.counts {
            let [a, b, c] = observed.triplet.taxa();
            let Some((resolution, tau)) = species.rooted_triplet(a, b, c) else {
                return f64::NEG_INFINITY;
            };
            let discordance = (-tau / ne).exp() / 3.0;
            let p = if resolution == observed.triplet {
                1.0 - 2.0 * discordance
            } else {
                discordance
            };
            ln += observed.count as f64 * p.ln();
        }
        ln
    }
}

impl Distribution<TripletCounts> for TripletCoalescent {
    fn compute_ln_probability(&self, value: &TripletCounts) -> f64 {
        self.ln_density(value)
    }

    fn redraw_value(&self, _rng: &mut dyn RandomSource) -> Result<TripletCounts, GraphError> {
        Err(GraphError::SimulationUnsupported {
            model: OWNER.to_string(),
        })
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.species_tree), erase(&self.population)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let mut found = swap_slot(OWNER, &mut self.species_tree, old, new)?;
        found |= swap_slot(OWNER, &mut self.population, old, new)?;
        ensure_swapped(OWNER, found, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<TripletCounts>> {
        Box::new(self.clone())
    }
}
