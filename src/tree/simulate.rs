//! Building random trees by merging lineages backward in time.
//!
//! Both builders join two random lineages at each merge. When clade
//! constraints are given, only pairs whose union stays compatible with every
//! clade (contained in it, containing it, or disjoint from it) are eligible,
//! so each constraint ends up monophyletic.

use std::collections::{BTreeSet, VecDeque};

use crate::clade::Clade;
use crate::error::GraphError;
use crate::math::pairs;
use crate::rng::RandomSource;
use crate::taxon::Taxon;
use crate::tree::Tree;

/// How the age of the oldest merge is bounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgeBound {
    /// No bound.
    Unbounded,
    /// Every merge is strictly younger than the origin age.
    Origin(f64),
    /// The final merge happens exactly at the root age.
    Root(f64),
}

struct Lineage {
    node: usize,
    names: BTreeSet<String>,
}

struct Merger<'a> {
    tree: Tree,
    active: Vec<Lineage>,
    constraints: Vec<BTreeSet<&'a str>>,
}

impl<'a> Merger<'a> {
    fn new(taxa: &[Taxon], constraints: &'a [Clade]) -> Self {
        let present: BTreeSet<&str> = taxa.iter().map(Taxon::name).collect();
        let constraints = constraints
            .iter()
            .map(|c| c.names().filter(|n| present.contains(n)).collect::<BTreeSet<&str>>())
            .filter(|c| !c.is_empty())
            .collect();
        Self {
            tree: Tree::new(),
            active: Vec::new(),
            constraints,
        }
    }

    fn activate(&mut self, taxon: &Taxon) {
        let node = self.tree.add_tip(taxon.clone());
        self.active.push(Lineage {
            node,
            names: BTreeSet::from([taxon.name().to_string()]),
        });
    }

    fn compatible(&self, a: &Lineage, b: &Lineage) -> bool {
        let size = a.names.len() + b.names.len();
        self.constraints.iter().all(|clade| {
            let shared = a
                .names
                .iter()
                .chain(b.names.iter())
                .filter(|n| clade.contains(n.as_str()))
                .count();
            shared == 0 || shared == size || shared == clade.len()
        })
    }

    fn pick_pair(&self, rng: &mut dyn RandomSource) -> Option<(usize, usize)> {
        let k = self.active.len();
        if k < 2 {
            return None;
        }
        if self.constraints.is_empty() {
            let i = rng.sample_index(k);
            let mut j = rng.sample_index(k - 1);
            if j >= i {
                j += 1;
            }
            return Some((i, j));
        }
        let mut eligible = Vec::new();
        for i in 0..k {
            for j in (i + 1)..k {
                if self.compatible(&self.active[i], &self.active[j]) {
                    eligible.push((i, j));
                }
            }
        }
        if eligible.is_empty() {
            None
        } else {
            Some(eligible[rng.sample_index(eligible.len())])
        }
    }

    fn merge(&mut self, (i, j): (usize, usize), age: f64) -> Result<(), GraphError> {
        let (first, second) = if i > j { (i, j) } else { (j, i) };
        let a = self.active.swap_remove(first);
        let b = self.active.swap_remove(second);
        let node = self
            .tree
            .add_internal(a.node, b.node, age)
            .map_err(|e| simulation_failed(e.to_string()))?;
        let mut names = a.names;
        names.extend(b.names);
        self.active.push(Lineage { node, names });
        Ok(())
    }
}

fn simulation_failed(reason: impl Into<String>) -> GraphError {
    GraphError::SimulationFailed {
        reason: reason.into(),
    }
}

fn sorted_by_age(taxa: &[Taxon]) -> Vec<Taxon> {
    let mut sorted = taxa.to_vec();
    sorted.sort_by(|a, b| a.age().total_cmp(&b.age()));
    sorted
}

/// Builds a tree whose merges happen exactly at `merge_ages`.
///
/// # Errors
///
/// Returns `GraphError::SimulationFailed` if the number of ages does not
/// match the number of taxa, a merge finds fewer than two sampled lineages, or
/// the constraints leave no eligible pair.
pub fn merge_at_ages(
    taxa: &[Taxon],
    merge_ages: &[f64],
    constraints: &[Clade],
    rng: &mut dyn RandomSource,
) -> Result<Tree, GraphError> {
    if taxa.is_empty() || merge_ages.len() + 1 != taxa.len() {
        return Err(simulation_failed(format!(
            "{} taxa need {} merge ages, got {}",
            taxa.len(),
            taxa.len().saturating_sub(1),
            merge_ages.len()
        )));
    }
    if let [only] = taxa {
        return Ok(Tree::single_tip(only.clone()));
    }
    let mut ages = merge_ages.to_vec();
    ages.sort_by(f64::total_cmp);

    let mut pending: VecDeque<Taxon> = sorted_by_age(taxa).into();
    let mut merger = Merger::new(taxa, constraints);
    for age in ages {
        while pending.front().is_some_and(|t| t.age() <= age) {
            if let Some(taxon) = pending.pop_front() {
                merger.activate(&taxon);
            }
        }
        let pair = merger
            .pick_pair(rng)
            .ok_or_else(|| simulation_failed(format!("no eligible lineage pair at age {age}")))?;
        merger.merge(pair, age)?;
    }
    if let Some(taxon) = pending.front() {
        return Err(simulation_failed(format!(
            "taxon '{}' is older than the oldest merge",
            taxon.name()
        )));
    }
    Ok(merger.tree)
}

/// Builds a tree by a coalescent with per-pair merge rate `pair_rate`,
/// adding tips as the process reaches their sampling ages.
///
/// With an origin bound, a merge that would fall beyond the origin is drawn
/// uniformly between the current age and the origin instead. With a root
/// bound the last two lineages merge exactly at the root age.
///
/// # Errors
///
/// Returns `GraphError::SimulationFailed` if a taxon is older than the bound,
/// a root bound is combined with fewer than two taxa, or the constraints
/// leave no eligible pair.
pub fn heterochronous_merge(
    taxa: &[Taxon],
    pair_rate: f64,
    bound: AgeBound,
    constraints: &[Clade],
    rng: &mut dyn RandomSource,
) -> Result<Tree, GraphError> {
    if taxa.is_empty() {
        return Err(simulation_failed("no taxa to simulate"));
    }
    let (upper, target) = match bound {
        AgeBound::Unbounded => (f64::INFINITY, 1),
        AgeBound::Origin(t) => (t, 1),
        AgeBound::Root(t) => (t, 2),
    };
    if target == 2 && taxa.len() < 2 {
        return Err(simulation_failed("a root needs at least two taxa"));
    }
    let mut pending: VecDeque<Taxon> = sorted_by_age(taxa).into();
    if let Some(oldest) = pending.back() {
        if oldest.age() >= upper {
            return Err(simulation_failed(format!(
                "taxon '{}' of age {} is not younger than {upper}",
                oldest.name(),
                oldest.age()
            )));
        }
    }

    let mut merger = Merger::new(taxa, constraints);
    let mut current = pending.front().map_or(0.0, Taxon::age);
    loop {
        while pending.front().is_some_and(|t| t.age() <= current) {
            if let Some(taxon) = pending.pop_front() {
                merger.activate(&taxon);
            }
        }
        if merger.active.len() + pending.len() <= target {
            break;
        }
        let next_tip = pending.front().map(Taxon::age);
        let k = merger.active.len();
        if k < 2 {
            if let Some(t) = next_tip {
                current = t;
            }
            continue;
        }
        let mut age = current + rng.sample_exponential(pair_rate * pairs(k));
        if let Some(t) = next_tip {
            if age > t {
                current = t;
                continue;
            }
        }
        if age >= upper {
            age = current + (upper - current) * rng.uniform01();
        }
        match merger.pick_pair(rng) {
            Some(pair) => {
                merger.merge(pair, age)?;
                current = age;
            }
            None => match next_tip {
                Some(t) => current = t,
                None => return Err(simulation_failed("constraints leave no eligible lineage pair")),
            },
        }
    }

    if let AgeBound::Root(root_age) = bound {
        while let Some(taxon) = pending.pop_front() {
            merger.activate(&taxon);
        }
        let pair = merger
            .pick_pair(rng)
            .ok_or_else(|| simulation_failed("constraints cannot be met at the root"))?;
        merger.merge(pair, root_age)?;
    }
    Ok(merger.tree)
}
