//! Gene trees evolving inside a species tree.
//!
//! The density sweeps the species tree in post-order. Each species branch
//! receives the gene lineages leaving its child branches (or the gene copies
//! sampled from it, for a tip species) and lets them coalesce until the
//! branch's upper age. Lineages still separate at that age move on to the
//! parent branch.

use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};

use super::{Pending, PopulationSize};
use crate::dag::{ensure_swapped, erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode};
use crate::distribution::Distribution;
use crate::error::{GraphError, ModelError};
use crate::math::pairs;
use crate::rng::RandomSource;
use crate::taxon::Taxon;
use crate::tree::Tree;

const OWNER: &str = "multispecies coalescent";

/// Gene copies at an age equal to a coalescence count as present.
const AGE_TOLERANCE: f64 = 1e-9;

/// Distribution of a gene tree given a species tree and population sizes.
///
/// # Example
/// ```rust,ignore
/// let taxa = vec![
///     Taxon::new("g1").with_species("sp1"),
///     Taxon::new("g2").with_species("sp1"),
///     Taxon::new("g3").with_species("sp2"),
/// ];
/// let msc = MultispeciesCoalescent::new(species_tree, PopulationSize::shared(ne), taxa)?;
/// let gene_tree = StochasticNode::new("gene tree", Box::new(msc), &mut rng)?;
/// ```
#[derive(Debug, Clone)]
pub struct MultispeciesCoalescent {
    species_tree: TypedDagNode<Tree>,
    population: PopulationSize,
    taxa: Vec<Taxon>,
    species_of: HashMap<String, String>,
}

impl MultispeciesCoalescent {
    /// Creates the process for gene copies `taxa`, each labelled with the
    /// species tip it was sampled from.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::UnknownSpecies` if a taxon names a species that is
    /// not a tip of the species tree, `ModelError::LengthMismatch` if a
    /// per-branch population vector does not have one value per species-tree
    /// node, and `ModelError::InvalidParameter` for duplicate gene names.
    pub fn new(
        species_tree: TypedDagNode<Tree>,
        population: PopulationSize,
        taxa: Vec<Taxon>,
    ) -> Result<Self, ModelError> {
        let mut species_of = HashMap::with_capacity(taxa.len());
        {
            let tree = species_tree.value();
            let species: BTreeSet<&str> = tree.tips().filter_map(|t| t.name()).collect();
            for taxon in &taxa {
                if !species.contains(taxon.species()) {
                    return Err(ModelError::UnknownSpecies {
                        taxon: taxon.name().to_string(),
                        species: taxon.species().to_string(),
                    });
                }
                if species_of
                    .insert(taxon.name().to_string(), taxon.species().to_string())
                    .is_some()
                {
                    return Err(ModelError::InvalidParameter {
                        name: "taxa".to_string(),
                        reason: format!("gene copy '{}' appears twice", taxon.name()),
                    });
                }
            }
            if let Some(actual) = population.num_values() {
                if actual != tree.num_nodes() {
                    return Err(ModelError::LengthMismatch {
                        name: "population sizes".to_string(),
                        expected: tree.num_nodes(),
                        actual,
                    });
                }
            }
        }
        Ok(Self {
            species_tree,
            population,
            taxa,
            species_of,
        })
    }

    #[must_use]
    pub fn taxa(&self) -> &[Taxon] {
        &self.taxa
    }

    #[must_use]
    pub const fn population(&self) -> &PopulationSize {
        &self.population
    }

    /// Gene tips grouped by the species-tree node they are sampled from.
    fn gene_samples(&self, species: &Tree, gene: &Tree) -> Option<Vec<Vec<Pending>>> {
        let mut samples = vec![Vec::new(); species.num_nodes()];
        let mut count = 0;
        for node in gene.nodes() {
            let Some(name) = node.name() else { continue };
            if !node.is_tip() {
                return None;
            }
            let index = species.index_of(self.species_of.get(name)?)?;
            samples[index].push(Pending {
                age: node.age(),
                node: node.index(),
            });
            count += 1;
        }
        (count == self.species_of.len()).then_some(samples)
    }

    #[allow(clippy::too_many_lines)]
    fn ln_density(&self, gene: &Tree) -> f64 {
        let species = self.species_tree.value();
        let Some(mut samples) = self.gene_samples(&species, gene) else {
            return f64::NEG_INFINITY;
        };
        let parent_of = |index: usize| {
            gene.node(index)
                .and_then(|n| n.parent())
                .and_then(|p| gene.node(p))
                .map(|p| Pending {
                    age: p.age(),
                    node: p.index(),
                })
        };

        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); species.num_nodes()];
        let mut coalesced = vec![false; gene.num_nodes()];
        let mut ln = 0.0;
        for s in species.postorder() {
            let node = &species.nodes()[s];
            let Some(theta) = self.population.theta(s) else {
                return f64::NEG_INFINITY;
            };
            let lower = node.age();
            let upper = node
                .parent()
                .map_or(f64::INFINITY, |p| species.nodes()[p].age());

            let mut lineages: BTreeSet<usize> = node
                .children()
                .iter()
                .flat_map(|&c| std::mem::take(&mut outgoing[c]))
                .collect();
            let mut heap: BinaryHeap<Pending> = lineages.iter().filter_map(|&g| parent_of(g)).collect();
            let mut arrivals = std::mem::take(&mut samples[s]);
            arrivals.sort_by(|a, b| a.age.total_cmp(&b.age));
            let mut arrivals = arrivals.into_iter().peekable();

            let mut current = lower;
            loop {
                while heap.peek().is_some_and(|p| coalesced[p.node]) {
                    heap.pop();
                }
                let next_arrival = arrivals.peek().map(|p| p.age.max(lower));
                let next_merge = heap.peek().map(|p| p.age);
                let (age, is_arrival) = match (next_arrival, next_merge) {
                    (Some(a), Some(m)) if a <= m => (a, true),
                    (Some(a), None) => (a, true),
                    (_, Some(m)) => (m, false),
                    (None, None) => break,
                };
                if age >= upper {
                    break;
                }
                if age < current - AGE_TOLERANCE {
                    return f64::NEG_INFINITY;
                }
                let age = age.max(current);
                ln -= pairs(lineages.len()) * theta * (age - current);
                current = age;

                if is_arrival {
                    let Some(sample) = arrivals.next() else { break };
                    lineages.insert(sample.node);
                    heap.extend(parent_of(sample.node));
                } else {
                    let Some(merge) = heap.pop() else { break };
                    let children = gene.nodes()[merge.node].children();
                    if children.len() != 2 || !children.iter().all(|c| lineages.contains(c)) {
                        return f64::NEG_INFINITY;
                    }
                    for c in children {
                        lineages.remove(c);
                    }
                    lineages.insert(merge.node);
                    coalesced[merge.node] = true;
                    ln += theta.ln();
                    heap.extend(parent_of(merge.node));
                }
            }

            if arrivals.next().is_some() {
                // A gene copy older than the divergence of its species.
                return f64::NEG_INFINITY;
            }
            if upper.is_finite() {
                ln -= pairs(lineages.len()) * theta * (upper - current);
                outgoing[s] = lineages.into_iter().collect();
            } else if lineages.len() != 1 {
                return f64::NEG_INFINITY;
            }
        }
        ln
    }

    fn simulate(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        let species = self.species_tree.value();
        let mut gene = Tree::new();
        let mut samples: Vec<Vec<(f64, usize)>> = vec![Vec::new(); species.num_nodes()];
        for taxon in &self.taxa {
            let index = species
                .index_of(taxon.species())
                .ok_or_else(|| GraphError::SimulationFailed {
                    reason: format!("species '{}' is not in the species tree", taxon.species()),
                })?;
            let tip = gene.add_tip(taxon.clone());
            samples[index].push((taxon.age(), tip));
        }
        if self.taxa.len() < 2 {
            return Ok(gene);
        }

        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); species.num_nodes()];
        for s in species.postorder() {
            let node = &species.nodes()[s];
            let theta = self
                .population
                .theta(s)
                .ok_or_else(|| GraphError::SimulationFailed {
                    reason: format!("invalid population size on species branch {s}"),
                })?;
            let lower = node.age();
            let upper = node
                .parent()
                .map_or(f64::INFINITY, |p| species.nodes()[p].age());

            let mut active: Vec<usize> = node
                .children()
                .iter()
                .flat_map(|&c| std::mem::take(&mut outgoing[c]))
                .collect();
            let mut pending = std::mem::take(&mut samples[s]);
            pending.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut pending: VecDeque<(f64, usize)> = pending.into();

            let mut current = lower;
            loop {
                while pending.front().is_some_and(|(age, _)| *age <= current) {
                    if let Some((_, tip)) = pending.pop_front() {
                        active.push(tip);
                    }
                }
                let next_arrival = pending.front().map(|(age, _)| *age).filter(|&age| age < upper);
                if active.len() < 2 {
                    match next_arrival {
                        Some(age) => {
                            current = age;
                            continue;
                        }
                        None => break,
                    }
                }
                let age = current + rng.sample_exponential(pairs(active.len()) * theta);
                if let Some(arrival) = next_arrival {
                    if age > arrival {
                        current = arrival;
                        continue;
                    }
                }
                if age >= upper {
                    break;
                }
                let a = active.swap_remove(rng.sample_index(active.len()));
                let b = active.swap_remove(rng.sample_index(active.len()));
                let parent = gene
                    .add_internal(a, b, age)
                    .map_err(|e| GraphError::SimulationFailed { reason: e.to_string() })?;
                active.push(parent);
                current = age;
            }
            if let Some((age, tip)) = pending.front() {
                return Err(GraphError::SimulationFailed {
                    reason: format!("gene copy {tip} sampled at age {age} predates its species"),
                });
            }
            outgoing[s] = active;
        }
        log::trace!("simulated gene tree {}", gene.to_newick());
        Ok(gene)
    }
}

impl Distribution<Tree> for MultispeciesCoalescent {
    fn compute_ln_probability(&self, value: &Tree) -> f64 {
        self.ln_density(value)
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        self.simulate(rng)
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.species_tree), self.population.parameter()]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let mut found = swap_slot(OWNER, &mut self.species_tree, old, new)?;
        found |= self.population.swap(OWNER, old, new)?;
        ensure_swapped(OWNER, found, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<Tree>> {
        Box::new(self.clone())
    }
}
