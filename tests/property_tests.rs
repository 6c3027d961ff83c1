use std::rc::Rc;

use proptest::prelude::*;

use phylodag::birthdeath::{BirthDeathProcess, PiecewiseRate, Rate};
use phylodag::distributions::{Exponential, Normal};
use phylodag::functions::{Arithmetic, Operator};
use phylodag::rng::seeded_source;
use phylodag::{
    Clade, ConstantNode, DagNode, DagNodeRef, DeterministicNode, Distribution, GraphError, StochasticNode, Taxon,
    TypedDagNode, TypedNode,
};

/// x ~ Exp(1) -> d0 := x + 1 -> d1 := d0 + 1 -> ... -> y ~ Normal(d_last, 1).
fn ladder(depth: usize) -> (Rc<StochasticNode<f64>>, Vec<DagNodeRef>, Rc<StochasticNode<f64>>) {
    let one: TypedDagNode<f64> = ConstantNode::new("one", 1.0);
    let x = StochasticNode::<f64>::with_value("x", Box::new(Exponential::new(one.clone())), 0.5);
    let mut nodes: Vec<DagNodeRef> = vec![x.clone()];
    let mut last: TypedDagNode<f64> = x.clone();
    for i in 0..depth {
        let step = DeterministicNode::new(format!("d{i}"), Box::new(Arithmetic::new(Operator::Add, last, one.clone())));
        nodes.push(step.clone());
        last = step;
    }
    let y = StochasticNode::<f64>::with_value("y", Box::new(Normal::new(last, one)), 2.0);
    nodes.push(y.clone());
    (x, nodes, y)
}

proptest! {
    #[test]
    fn back_edges_are_always_cycles(depth in 0usize..6, from in 0usize..8, to in 0usize..8) {
        let (_x, nodes, _y) = ladder(depth);
        let (from, to) = (from % nodes.len(), to % nodes.len());
        let (lower, upper) = (from.min(to), from.max(to));
        // `upper` depends on `lower`; making `lower` depend on `upper` closes a cycle.
        let err = nodes[lower].add_parameter(&nodes[upper]);
        let refused = matches!(
            err,
            Err(GraphError::CycleDetected { .. }) | Err(GraphError::ConstantNode { .. })
        );
        prop_assert!(refused);
        prop_assert!(nodes[lower].parents().iter().all(|p| p.id() != nodes[upper].id()));
    }

    #[test]
    fn restore_is_an_exact_inverse(first in 0.01f64..10.0, second in 0.01f64..10.0, depth in 0usize..4) {
        let (x, _, y) = ladder(depth);
        let lx = x.ln_probability();
        let ly = y.ln_probability();
        x.set_value(first).unwrap();
        let _ = y.ln_probability();
        // A second change within the same proposal keeps the first restore point.
        x.set_value(second).unwrap();
        let _ = y.ln_probability();
        x.restore().unwrap();
        prop_assert_eq!(*x.value(), 0.5);
        prop_assert_eq!(x.ln_probability().to_bits(), lx.to_bits());
        prop_assert_eq!(y.ln_probability().to_bits(), ly.to_bits());
        prop_assert!(!x.is_touched() && !y.is_touched());
    }

    #[test]
    fn touching_twice_is_touching_once(value in 0.01f64..10.0) {
        let (x, _, y) = ladder(2);
        let before = y.ln_probability();
        x.touch();
        x.touch();
        prop_assert_eq!(y.stored_ln_probability().map(f64::to_bits), Some(before.to_bits()));
        x.set_value(value).unwrap();
        x.restore().unwrap();
        prop_assert_eq!(y.ln_probability().to_bits(), before.to_bits());
    }

    #[test]
    fn clades_ignore_name_order(names in prop::collection::btree_set("[a-z]{1,6}", 1..8), seed in any::<u64>()) {
        let ordered: Vec<String> = names.iter().cloned().collect();
        let mut shuffled = ordered.clone();
        phylodag::rng::shuffle(&mut seeded_source(seed), &mut shuffled);
        let a = Clade::new(ordered).unwrap();
        let b = Clade::new(shuffled).unwrap();
        prop_assert_eq!(a.fingerprint(), b.fingerprint());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn change_times_belong_to_the_younger_segment(
        times in prop::collection::btree_set(1u32..1000, 1..5),
        pick in any::<prop::sample::Index>(),
    ) {
        let times: Vec<f64> = times.into_iter().map(|t| f64::from(t) / 10.0).collect();
        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f64> = (0..=times.len()).map(|i| i as f64 + 1.0).collect();
        let rate = PiecewiseRate::new("rate", values.clone(), times.clone()).unwrap();
        let i = pick.index(times.len());
        prop_assert_eq!(rate.at(times[i]), values[i]);
        prop_assert_eq!(rate.at(times[i] + 1e-6), values[i + 1]);
    }

    #[test]
    fn simulated_trees_are_in_the_support(seed in any::<u64>(), lambda in 0.2f64..3.0, turnover in 0.0f64..0.9) {
        let process = BirthDeathProcess::builder()
            .speciation(Rate::constant(ConstantNode::new("lambda", lambda)))
            .extinction(Rate::constant(ConstantNode::new("mu", lambda * turnover)))
            .root_age(ConstantNode::new("root", 2.0))
            .taxa(["A", "B", "C", "D", "E", "F"].into_iter().map(Taxon::new).collect())
            .build()
            .unwrap();
        let tree = process.redraw_value(&mut seeded_source(seed)).unwrap();
        prop_assert!(tree.validate().is_ok());
        prop_assert_eq!(tree.num_tips(), 6);
        prop_assert!((tree.root_age() - 2.0).abs() < 1e-9);
        prop_assert!(process.compute_ln_probability(&tree).is_finite());
    }
}
