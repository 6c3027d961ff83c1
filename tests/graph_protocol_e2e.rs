use std::rc::Rc;

use phylodag::birthdeath::{BirthDeathProcess, Rate};
use phylodag::dag::{affected_ln_probability_ratio, ParameterHandle};
use phylodag::distributions::{Exponential, Normal};
use phylodag::functions::TreeAge;
use phylodag::{
    erase, ConstantNode, DagNode, DagNodeRef, DeterministicNode, GraphError, StochasticNode, Taxon, Tree, TypedDagNode,
    TypedNode,
};

struct Phylogeny {
    lambda: Rc<StochasticNode<f64>>,
    tree: Rc<StochasticNode<Tree>>,
    root_age: Rc<DeterministicNode<f64>>,
    calibration: Rc<StochasticNode<f64>>,
}

/// lambda ~ Exp(1); tree ~ BD(lambda, 0.1, origin 5); root age := age(tree);
/// calibration ~ Normal(root age, 1) observed at 3.2.
fn phylogeny() -> Phylogeny {
    let lambda = StochasticNode::<f64>::with_value("lambda", Box::new(Exponential::new(ConstantNode::new("lambda rate", 1.0))), 1.0);
    let process = BirthDeathProcess::builder()
        .speciation(Rate::constant(lambda.clone()))
        .extinction(Rate::constant(ConstantNode::new("mu", 0.1)))
        .origin(ConstantNode::new("origin", 5.0))
        .build()
        .unwrap();
    let mut value = Tree::new();
    let a = value.add_tip(Taxon::new("A"));
    let b = value.add_tip(Taxon::new("B"));
    let c = value.add_tip(Taxon::new("C"));
    let ab = value.add_internal(a, b, 1.0).unwrap();
    value.add_internal(ab, c, 3.0).unwrap();
    let tree = StochasticNode::with_value("tree", Box::new(process), value);
    let tree_handle: TypedDagNode<Tree> = tree.clone();
    let root_age = DeterministicNode::new("root age", Box::new(TreeAge::new(tree_handle)));
    let calibration = StochasticNode::observed(
        "calibration",
        Box::new(Normal::new(root_age.clone(), ConstantNode::new("calibration sd", 1.0))),
        3.2,
    );
    Phylogeny {
        lambda,
        tree,
        root_age,
        calibration,
    }
}

#[test]
fn rate_proposal_leaves_the_calibration_density_unchanged() {
    let p = phylogeny();
    let before = p.lambda.ln_probability() + p.tree.ln_probability() + p.calibration.ln_probability();
    let calibration = p.calibration.ln_probability();

    p.lambda.set_value(1.7).unwrap();
    assert!(p.tree.is_dirty());
    assert!(p.calibration.is_touched());
    let after = p.lambda.ln_probability() + p.tree.ln_probability() + p.calibration.ln_probability();
    let ratio = affected_ln_probability_ratio(p.lambda.as_ref());
    assert!((ratio - (after - before)).abs() < 1e-12);
    assert_eq!(p.calibration.ln_probability().to_bits(), calibration.to_bits());

    p.lambda.keep();
    assert_eq!(*p.lambda.value(), 1.7);
    assert!(p.lambda.restore().is_err());
}

#[test]
fn tree_proposal_flows_through_deterministic_nodes_and_back() {
    let p = phylogeny();
    let tree_ln = p.tree.ln_probability();
    let calibration_ln = p.calibration.ln_probability();
    assert_eq!(*p.root_age.value(), 3.0);

    let root = p.tree.value().root().unwrap();
    p.tree.update_value(|t| t.set_age(root, 3.6)).unwrap().unwrap();
    assert_eq!(*p.root_age.value(), 3.6);
    assert_ne!(p.calibration.ln_probability(), calibration_ln);
    assert!(p.tree.ln_probability().is_finite());

    p.tree.restore().unwrap();
    assert_eq!(*p.root_age.value(), 3.0);
    assert_eq!(p.tree.ln_probability().to_bits(), tree_ln.to_bits());
    assert_eq!(p.calibration.ln_probability().to_bits(), calibration_ln.to_bits());
    assert!(!p.root_age.is_touched());
}

#[test]
fn observed_nodes_refuse_proposals() {
    let p = phylogeny();
    let err = p.calibration.set_value(0.0).unwrap_err();
    assert!(matches!(err, GraphError::ClampedNode { .. }));
    assert!(!p.calibration.is_touched());
}

#[test]
fn swapping_a_rate_rewires_edges_and_density() {
    let p = phylogeny();
    let lambda_handle: TypedDagNode<f64> = p.lambda.clone();
    let old = erase(&lambda_handle);
    let fixed: TypedDagNode<f64> = ConstantNode::new("fixed lambda", 1.7);

    p.lambda.set_value(1.7).unwrap();
    let expected = p.tree.ln_probability();
    p.lambda.restore().unwrap();

    p.tree.swap_parameter(&old, &ParameterHandle::Real(fixed.clone())).unwrap();
    assert!(p.lambda.children().is_empty());
    assert!(p.tree.parents().iter().any(|n| n.id() == fixed.id()));
    assert!((p.tree.ln_probability() - expected).abs() < 1e-12);

    let stranger: DagNodeRef = ConstantNode::new("stranger", 1.0);
    let err = p
        .tree
        .swap_parameter(&stranger, &ParameterHandle::Real(ConstantNode::new("other", 2.0)))
        .unwrap_err();
    assert!(matches!(err, GraphError::ParameterNotFound { .. }));
}

#[test]
fn cycles_are_refused() {
    let p = phylogeny();
    let calibration: DagNodeRef = p.calibration.clone();
    let err = p.lambda.add_parameter(&calibration).unwrap_err();
    assert!(matches!(err, GraphError::CycleDetected { .. }));
    assert!(p.lambda.parents().iter().all(|n| n.id() != p.calibration.id()));
}
