use crate::clade::Clade;
use crate::config::TreeSimulationConfig;
use crate::dag::{DagNodeRef, NodeId, ParameterHandle};
use crate::distribution::Distribution;
use crate::error::GraphError;
use crate::rng::RandomSource;
use crate::tree::Tree;

/// Restricts a tree distribution to trees in which every listed clade is
/// monophyletic.
///
/// The density is the inner density on the allowed trees and negative
/// infinity elsewhere. Simulation draws from the inner distribution until
/// the constraints hold.
#[derive(Debug, Clone)]
pub struct TopologyConstrained {
    inner: Box<dyn Distribution<Tree>>,
    constraints: Vec<Clade>,
    config: TreeSimulationConfig,
}

impl TopologyConstrained {
    #[must_use]
    pub fn new(inner: Box<dyn Distribution<Tree>>, constraints: Vec<Clade>) -> Self {
        Self {
            inner,
            constraints,
            config: TreeSimulationConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: TreeSimulationConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn constraints(&self) -> &[Clade] {
        &self.constraints
    }

    #[must_use]
    pub fn inner(&self) -> &dyn Distribution<Tree> {
        self.inner.as_ref()
    }
}

impl Distribution<Tree> for TopologyConstrained {
    fn compute_ln_probability(&self, value: &Tree) -> f64 {
        if !value.satisfies_constraints(&self.constraints) {
            return f64::NEG_INFINITY;
        }
        self.inner.compute_ln_probability(value)
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        for attempt in 1..=self.config.max_rejection_attempts {
            let tree = self.inner.redraw_value(rng)?;
            if tree.satisfies_constraints(&self.constraints) {
                if attempt > 1 {
                    log::debug!("constrained tree accepted after {attempt} draws");
                }
                return Ok(tree);
            }
        }
        Err(GraphError::SimulationFailed {
            reason: format!(
                "no tree satisfying {} clade constraint(s) in {} draws",
                self.constraints.len(),
                self.config.max_rejection_attempts
            ),
        })
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        self.inner.parameters()
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        self.inner.swap_parameter(old, new)
    }

    fn clone_box(&self) -> Box<dyn Distribution<Tree>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxon::Taxon;
    use crate::rng::seeded_source;

    /// Uniform over the three rooted topologies of A, B, C with fixed ages.
    #[derive(Debug, Clone)]
    struct ThreeTaxonTopologies;

    impl ThreeTaxonTopologies {
        fn build(cherry: [&str; 2], outgroup: &str) -> Tree {
            let mut tree = Tree::new();
            let a = tree.add_tip(Taxon::new(cherry[0]));
            let b = tree.add_tip(Taxon::new(cherry[1]));
            let c = tree.add_tip(Taxon::new(outgroup));
            let ab = tree.add_internal(a, b, 1.0).unwrap();
            tree.add_internal(ab, c, 2.0).unwrap();
            tree
        }
    }

    impl Distribution<Tree> for ThreeTaxonTopologies {
        fn compute_ln_probability(&self, _value: &Tree) -> f64 {
            -(3f64.ln())
        }

        fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
            Ok(match rng.sample_index(3) {
                0 => Self::build(["A", "B"], "C"),
                1 => Self::build(["A", "C"], "B"),
                _ => Self::build(["B", "C"], "A"),
            })
        }

        fn parameters(&self) -> Vec<DagNodeRef> {
            Vec::new()
        }

        fn swap_parameter(&mut self, old: NodeId, _new: &ParameterHandle) -> Result<(), GraphError> {
            Err(GraphError::ParameterNotFound {
                node: "topologies".to_string(),
                parent: old.to_string(),
            })
        }

        fn clone_box(&self) -> Box<dyn Distribution<Tree>> {
            Box::new(self.clone())
        }
    }

    fn constrained() -> TopologyConstrained {
        let ab = Clade::new(["A", "B"]).unwrap();
        TopologyConstrained::new(Box::new(ThreeTaxonTopologies), vec![ab])
    }

    #[test]
    fn violating_tree_is_impossible() {
        let d = constrained();
        let bad = ThreeTaxonTopologies::build(["A", "C"], "B");
        assert_eq!(d.compute_ln_probability(&bad), f64::NEG_INFINITY);
        let good = ThreeTaxonTopologies::build(["B", "A"], "C");
        assert!((d.compute_ln_probability(&good) + 3f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn draws_satisfy_constraints() {
        let d = constrained();
        let mut rng = seeded_source(17);
        for _ in 0..20 {
            let tree = d.redraw_value(&mut rng).unwrap();
            assert!(d.compute_ln_probability(&tree).is_finite());
        }
    }

    #[test]
    fn impossible_constraints_fail_after_the_attempt_limit() {
        let ab = Clade::new(["A", "B"]).unwrap();
        let ac = Clade::new(["A", "C"]).unwrap();
        let config = TreeSimulationConfig {
            max_rejection_attempts: 5,
            ..TreeSimulationConfig::default()
        };
        let d = TopologyConstrained::new(Box::new(ThreeTaxonTopologies), vec![ab, ac]).with_config(config);
        let mut rng = seeded_source(1);
        assert!(matches!(
            d.redraw_value(&mut rng),
            Err(GraphError::SimulationFailed { .. })
        ));
    }
}
