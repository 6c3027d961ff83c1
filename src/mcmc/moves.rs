//! Proposals on stochastic nodes.
//!
//! A move changes the value of one node through the node's setter, which
//! touches it and everything it affects. The chain then reads the
//! log-probability ratio and calls `accept` or `reject`.

use std::fmt;
use std::rc::Rc;

use crate::dag::{DagNode, DagNodeRef, StochasticNode, TypedNode};
use crate::error::{ModelError, PhyloResult};
use crate::rng::RandomSource;
use crate::tree::Tree;

/// A Metropolis-Hastings proposal.
pub trait Move: fmt::Debug {
    fn name(&self) -> &str;

    /// Relative probability of choosing this move.
    fn weight(&self) -> f64;

    /// The node the move changes.
    fn touched(&self) -> DagNodeRef;

    /// Changes the node's value and returns the log Hastings ratio.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is clamped or the change is structurally
    /// invalid. No touch is left open on error.
    fn propose(&mut self, rng: &mut dyn RandomSource) -> PhyloResult<f64>;

    fn accept(&mut self) {
        self.touched().keep();
    }

    /// # Errors
    ///
    /// Returns `GraphError::ProtocolViolation` if nothing was proposed.
    fn reject(&mut self) -> PhyloResult<()> {
        self.touched().restore()?;
        Ok(())
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter {
            name: name.to_string(),
            reason: format!("{value} is not a positive finite number"),
        })
    }
}

/// Multiplies a real value by `exp(lambda (u - 0.5))`.
#[derive(Debug)]
pub struct ScaleMove {
    node: Rc<StochasticNode<f64>>,
    lambda: f64,
    weight: f64,
}

impl ScaleMove {
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` for a non-positive tuning
    /// parameter.
    pub fn new(node: Rc<StochasticNode<f64>>, lambda: f64) -> Result<Self, ModelError> {
        check_positive("lambda", lambda)?;
        Ok(Self {
            node,
            lambda,
            weight: 1.0,
        })
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Move for ScaleMove {
    fn name(&self) -> &str {
        "scale"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn touched(&self) -> DagNodeRef {
        Rc::clone(&self.node) as DagNodeRef
    }

    fn propose(&mut self, rng: &mut dyn RandomSource) -> PhyloResult<f64> {
        let ln_factor = self.lambda * (rng.uniform01() - 0.5);
        self.node.update_value(|v| *v *= ln_factor.exp())?;
        Ok(ln_factor)
    }
}

/// Adds a uniform offset from `(-delta / 2, delta / 2)` to a real value.
#[derive(Debug)]
pub struct SlideMove {
    node: Rc<StochasticNode<f64>>,
    delta: f64,
    weight: f64,
}

impl SlideMove {
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` for a non-positive window.
    pub fn new(node: Rc<StochasticNode<f64>>, delta: f64) -> Result<Self, ModelError> {
        check_positive("delta", delta)?;
        Ok(Self {
            node,
            delta,
            weight: 1.0,
        })
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Move for SlideMove {
    fn name(&self) -> &str {
        "slide"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn touched(&self) -> DagNodeRef {
        Rc::clone(&self.node) as DagNodeRef
    }

    fn propose(&mut self, rng: &mut dyn RandomSource) -> PhyloResult<f64> {
        let offset = self.delta * (rng.uniform01() - 0.5);
        self.node.update_value(|v| *v += offset)?;
        Ok(0.0)
    }
}

/// Moves the age of a random non-root bifurcation uniformly between its
/// oldest child and its parent.
#[derive(Debug)]
pub struct NodeAgeSlide {
    node: Rc<StochasticNode<Tree>>,
    weight: f64,
}

impl NodeAgeSlide {
    #[must_use]
    pub fn new(node: Rc<StochasticNode<Tree>>) -> Self {
        Self { node, weight: 1.0 }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

impl Move for NodeAgeSlide {
    fn name(&self) -> &str {
        "node age slide"
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    fn touched(&self) -> DagNodeRef {
        Rc::clone(&self.node) as DagNodeRef
    }

    fn propose(&mut self, rng: &mut dyn RandomSource) -> PhyloResult<f64> {
        let choice = {
            let tree = self.node.value();
            let eligible: Vec<usize> = tree
                .speciation_nodes()
                .filter(|n| !n.is_root())
                .map(|n| n.index())
                .collect();
            if eligible.is_empty() {
                None
            } else {
                let index = eligible[rng.sample_index(eligible.len())];
                let lower = tree.nodes()[index]
                    .children()
                    .iter()
                    .map(|&c| tree.nodes()[c].age())
                    .fold(0.0, f64::max);
                let upper = tree.nodes()[index]
                    .parent()
                    .map_or(lower, |p| tree.nodes()[p].age());
                Some((index, lower + (upper - lower) * rng.uniform01()))
            }
        };
        let Some((index, age)) = choice else {
            // Nothing to move; the no-op proposal is always rejected.
            self.node.update_value(|_| ())?;
            return Ok(f64::NEG_INFINITY);
        };
        if let Err(e) = self.node.update_value(|tree| tree.set_age(index, age))? {
            self.node.restore()?;
            return Err(e.into());
        }
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ConstantNode;
    use crate::distributions::{Exponential, UniformReal};
    use crate::rng::seeded_source;
    use crate::tree::tests::three_taxon_tree;

    #[derive(Debug, Clone)]
    struct FlatTree;

    impl crate::distribution::Distribution<Tree> for FlatTree {
        fn compute_ln_probability(&self, _value: &Tree) -> f64 {
            0.0
        }

        fn redraw_value(&self, _rng: &mut dyn RandomSource) -> Result<Tree, crate::error::GraphError> {
            Ok(three_taxon_tree())
        }

        fn parameters(&self) -> Vec<DagNodeRef> {
            Vec::new()
        }

        fn swap_parameter(
            &mut self,
            old: crate::dag::NodeId,
            _new: &crate::dag::ParameterHandle,
        ) -> Result<(), crate::error::GraphError> {
            crate::dag::ensure_swapped("flat tree", false, old)
        }

        fn clone_box(&self) -> Box<dyn crate::distribution::Distribution<Tree>> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn scale_move_is_undone_by_reject() {
        let x = StochasticNode::<f64>::with_value("x", Box::new(Exponential::new(ConstantNode::new("r", 1.0))), 2.0);
        let mut mv = ScaleMove::new(x.clone(), 1.0).unwrap();
        let mut rng = seeded_source(3);
        let ln_hastings = mv.propose(&mut rng).unwrap();
        assert!((x.value().ln() - (2.0f64.ln() + ln_hastings)).abs() < 1e-12);
        mv.reject().unwrap();
        assert_eq!(*x.value(), 2.0);
        assert!(!x.is_touched());
    }

    #[test]
    fn slide_move_stays_in_window() {
        let x = StochasticNode::<f64>::with_value(
            "x",
            Box::new(UniformReal::new(ConstantNode::new("lo", 0.0), ConstantNode::new("hi", 10.0))),
            5.0,
        );
        let mut mv = SlideMove::new(x.clone(), 0.5).unwrap();
        let mut rng = seeded_source(8);
        for _ in 0..20 {
            assert_eq!(mv.propose(&mut rng).unwrap(), 0.0);
            assert!((*x.value() - 5.0).abs() <= 0.25);
            mv.reject().unwrap();
        }
    }

    #[test]
    fn node_age_slide_respects_neighbours() {
        let tree = StochasticNode::<Tree>::with_value("tree", Box::new(FlatTree), three_taxon_tree());
        let mut mv = NodeAgeSlide::new(tree.clone());
        let mut rng = seeded_source(21);
        for _ in 0..20 {
            mv.propose(&mut rng).unwrap();
            let age = tree.value().nodes()[3].age();
            assert!((0.0..=2.0).contains(&age));
            assert!(tree.value().has_consistent_ages());
            mv.accept();
        }
    }

    #[test]
    fn invalid_tuning_is_rejected() {
        let x = StochasticNode::<f64>::with_value("x", Box::new(Exponential::new(ConstantNode::new("r", 1.0))), 2.0);
        assert!(ScaleMove::new(x.clone(), 0.0).is_err());
        assert!(SlideMove::new(x, f64::NAN).is_err());
    }
}
