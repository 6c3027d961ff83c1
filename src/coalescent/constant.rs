//! Kingman coalescent in a single population of constant size, with tips
//! sampled at different ages.

use crate::dag::{ensure_swapped, erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode};
use crate::distribution::Distribution;
use crate::error::GraphError;
use crate::math::pairs;
use crate::rng::RandomSource;
use crate::taxon::Taxon;
use crate::tree::simulate::{heterochronous_merge, AgeBound};
use crate::tree::Tree;

/// Constant-size coalescent over `taxa`.
#[derive(Debug, Clone)]
pub struct ConstantCoalescent {
    population: TypedDagNode<f64>,
    taxa: Vec<Taxon>,
}

impl ConstantCoalescent {
    #[must_use]
    pub fn new(population: TypedDagNode<f64>, taxa: Vec<Taxon>) -> Self {
        Self { population, taxa }
    }

    fn theta(&self) -> Option<f64> {
        let ne = *self.population.value();
        (ne.is_finite() && ne > 0.0).then(|| 1.0 / ne)
    }

    fn ln_density(&self, tree: &Tree) -> f64 {
        let Some(theta) = self.theta() else {
            return f64::NEG_INFINITY;
        };
        if !tree.has_consistent_ages() || tree.nodes().iter().any(|n| n.is_sampled_ancestor()) {
            return f64::NEG_INFINITY;
        }
        // Samples before coalescences at equal ages.
        let mut events: Vec<(f64, bool)> = tree
            .nodes()
            .iter()
            .map(|n| (n.age(), n.is_tip()))
            .collect();
        events.sort_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut ln = 0.0;
        let mut lineages = 0usize;
        let mut current = events.first().map_or(0.0, |e| e.0);
        for (age, is_sample) in events {
            ln -= pairs(lineages) * theta * (age - current);
            current = age;
            if is_sample {
                lineages += 1;
            } else {
                if lineages < 2 {
                    return f64::NEG_INFINITY;
                }
                lineages -= 1;
                ln += theta.ln();
            }
        }
        ln
    }
}

impl Distribution<Tree> for ConstantCoalescent {
    fn compute_ln_probability(&self, value: &Tree) -> f64 {
        self.ln_density(value)
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<Tree, GraphError> {
        let theta = self.theta().ok_or_else(|| GraphError::SimulationFailed {
            reason: "population size must be positive and finite".to_string(),
        })?;
        heterochronous_merge(&self.taxa, theta, AgeBound::Unbounded, &[], rng)
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.population)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let found = swap_slot("constant coalescent", &mut self.population, old, new)?;
        ensure_swapped("constant coalescent", found, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<Tree>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ConstantNode;
    use crate::rng::seeded_source;
    use crate::tree::tests::three_taxon_tree;

    fn coalescent(ne: f64, taxa: Vec<Taxon>) -> ConstantCoalescent {
        ConstantCoalescent::new(ConstantNode::new("ne", ne), taxa)
    }

    #[test]
    fn three_contemporaneous_tips() {
        // Three lineages for 1, two for 1, two coalescences at rate 1 / Ne.
        let tree = three_taxon_tree();
        let ln = coalescent(2.0, Vec::new()).compute_ln_probability(&tree);
        let expected = 2.0 * 0.5f64.ln() - 0.5 * (3.0 + 1.0);
        assert!((ln - expected).abs() < 1e-12);
    }

    #[test]
    fn late_sample_shortens_first_interval() {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A"));
        let b = tree.add_tip(Taxon::new("B").with_age(1.0).unwrap());
        tree.add_internal(a, b, 3.0).unwrap();
        // One lineage until age 1, then two until 3.
        let ln = coalescent(1.0, Vec::new()).compute_ln_probability(&tree);
        assert!((ln - (-2.0)).abs() < 1e-12);
    }

    #[test]
    fn invalid_population_size_is_impossible() {
        let tree = three_taxon_tree();
        assert_eq!(
            coalescent(0.0, Vec::new()).compute_ln_probability(&tree),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn simulation_round_trip() {
        let taxa = vec![
            Taxon::new("A"),
            Taxon::new("B"),
            Taxon::new("C").with_age(0.4).unwrap(),
            Taxon::new("D").with_age(2.0).unwrap(),
        ];
        let process = coalescent(1.5, taxa);
        let mut rng = seeded_source(2);
        for _ in 0..20 {
            let tree = process.redraw_value(&mut rng).unwrap();
            tree.validate().unwrap();
            assert!(process.compute_ln_probability(&tree).is_finite());
        }
    }
}
