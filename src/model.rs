//! A model: every node connected to a set of seed nodes.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;

use crate::dag::{DagNode, DagNodeRef, NodeId};
use crate::error::ModelError;
use crate::snapshot::{MonitorSnapshot, NodeSnapshot};

/// The connected component of the graph around some seed nodes.
///
/// # Example
/// ```rust,ignore
/// let model = Model::new(&[erase(&tree)])?;
/// let posterior = model.ln_posterior();
/// let lambda = model.node("lambda").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Model {
    nodes: Vec<DagNodeRef>,
    by_name: HashMap<String, usize>,
}

impl Model {
    /// Collects every node reachable from `seeds` through parameter and
    /// affected edges, in discovery order.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` if the seeds are empty or two
    /// nodes share a name.
    pub fn new(seeds: &[DagNodeRef]) -> Result<Self, ModelError> {
        if seeds.is_empty() {
            return Err(ModelError::InvalidParameter {
                name: "seeds".to_string(),
                reason: "a model needs at least one node".to_string(),
            });
        }
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<DagNodeRef> = seeds.iter().cloned().collect();
        let mut nodes = Vec::new();
        let mut by_name = HashMap::new();
        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.id()) {
                continue;
            }
            if by_name.insert(node.name().to_string(), nodes.len()).is_some() {
                return Err(ModelError::InvalidParameter {
                    name: node.name().to_string(),
                    reason: "two nodes of the model share this name".to_string(),
                });
            }
            queue.extend(node.parents());
            queue.extend(node.children());
            nodes.push(node);
        }
        Ok(Self { nodes, by_name })
    }

    #[must_use]
    pub fn nodes(&self) -> &[DagNodeRef] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node with the given name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&DagNodeRef> {
        self.by_name.get(name).map(|&i| &self.nodes[i])
    }

    pub fn stochastic_nodes(&self) -> impl Iterator<Item = &DagNodeRef> {
        self.nodes.iter().filter(|n| n.is_stochastic())
    }

    /// Stochastic nodes that are not clamped to data.
    pub fn free_nodes(&self) -> impl Iterator<Item = &DagNodeRef> {
        self.stochastic_nodes().filter(|n| !n.is_clamped())
    }

    /// Sum of the log-probabilities of all stochastic nodes.
    #[must_use]
    pub fn ln_posterior(&self) -> f64 {
        self.stochastic_nodes().map(|n| n.ln_probability()).sum()
    }

    /// True when `node` belongs to the model.
    #[must_use]
    pub fn contains(&self, node: &DagNodeRef) -> bool {
        self.by_name
            .get(node.name())
            .is_some_and(|&i| self.nodes[i].id() == node.id())
    }

    #[must_use]
    pub fn snapshot(&self, generation: u64) -> MonitorSnapshot {
        MonitorSnapshot {
            timestamp: Utc::now(),
            generation,
            chain: None,
            ln_posterior: self.ln_posterior(),
            nodes: self.nodes.iter().map(|n| NodeSnapshot::capture(n.as_ref())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{erase, ConstantNode, StochasticNode, TypedDagNode};
    use crate::distributions::{Exponential, Normal};

    #[test]
    fn collects_the_connected_component() {
        let rate = ConstantNode::new("rate", 1.0);
        let x = StochasticNode::<f64>::with_value("x", Box::new(Exponential::new(rate.clone())), 2.0);
        let y = StochasticNode::<f64>::observed("y", Box::new(Normal::new(x.clone(), rate.clone())), 2.5);
        let x_handle: TypedDagNode<f64> = x.clone();
        let model = Model::new(&[erase(&x_handle)]).unwrap();
        assert_eq!(model.len(), 3);
        assert_eq!(model.stochastic_nodes().count(), 2);
        assert_eq!(model.free_nodes().count(), 1);
        assert_eq!(model.node("y").map(|n| n.id()), Some(y.id()));

        let expected = x.ln_probability() + y.ln_probability();
        assert!((model.ln_posterior() - expected).abs() < 1e-12);

        let snapshot = model.snapshot(7);
        assert_eq!(snapshot.generation, 7);
        assert_eq!(snapshot.nodes.len(), 3);
        assert!(snapshot.node("y").unwrap().clamped);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let a = ConstantNode::new("a", 1.0);
        let b = ConstantNode::new("a", 2.0);
        let x = StochasticNode::<f64>::with_value("x", Box::new(Normal::new(a, b)), 0.0);
        let handle: TypedDagNode<f64> = x;
        assert!(Model::new(&[erase(&handle)]).is_err());
        assert!(Model::new(&[]).is_err());
    }
}
