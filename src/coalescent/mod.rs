//! Coalescent processes: gene trees inside a species tree, a single
//! constant-size population, and the rooted-triplet pseudo-likelihood.
//!
//! Every process here uses the pairwise coalescence rate `theta = 1 / Ne`:
//! with `k` lineages the waiting time to the next coalescence is exponential
//! with rate `C(k, 2) * theta`.

mod constant;
mod multispecies;
mod triplets;

use std::cmp::Ordering;

use crate::dag::{erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode, TypedNode};
use crate::error::GraphError;

pub use constant::ConstantCoalescent;
pub use multispecies::MultispeciesCoalescent;
pub use triplets::{TripletCoalescent, TripletCount, TripletCounts};

/// Effective population size, shared or one value per species-tree node.
#[derive(Debug, Clone)]
pub enum PopulationSize {
    Shared(TypedDagNode<f64>),
    /// Indexed by species-tree node index.
    PerBranch(TypedDagNode<Vec<f64>>),
}

impl PopulationSize {
    #[must_use]
    pub fn shared(ne: TypedDagNode<f64>) -> Self {
        Self::Shared(ne)
    }

    #[must_use]
    pub fn per_branch(ne: TypedDagNode<Vec<f64>>) -> Self {
        Self::PerBranch(ne)
    }

    /// Coalescence rate `1 / Ne` on the branch above species node `index`;
    /// `None` when the size is missing, non-positive or not finite.
    #[must_use]
    pub fn theta(&self, index: usize) -> Option<f64> {
        let ne = match self {
            Self::Shared(ne) => *ne.value(),
            Self::PerBranch(values) => *values.value().get(index)?,
        };
        (ne.is_finite() && ne > 0.0).then(|| 1.0 / ne)
    }

    /// Number of per-branch values, if any.
    #[must_use]
    pub fn num_values(&self) -> Option<usize> {
        match self {
            Self::Shared(_) => None,
            Self::PerBranch(values) => Some(values.value().len()),
        }
    }

    fn parameter(&self) -> DagNodeRef {
        match self {
            Self::Shared(ne) => erase(ne),
            Self::PerBranch(values) => erase(values),
        }
    }

    fn swap(&mut self, owner: &str, old: NodeId, new: &ParameterHandle) -> Result<bool, GraphError> {
        match self {
            Self::Shared(ne) => swap_slot(owner, ne, old, new),
            Self::PerBranch(values) => swap_slot(owner, values, old, new),
        }
    }
}

/// A gene-tree node waiting to coalesce, ordered youngest first in a
/// `BinaryHeap`.
#[derive(Debug, Clone, Copy)]
struct Pending {
    age: f64,
    node: usize,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .age
            .total_cmp(&self.age)
            .then_with(|| other.node.cmp(&self.node))
    }
}
