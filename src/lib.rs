//! # phylodag - Incremental model graphs for Bayesian phylogenetics
//!
//! phylodag evaluates hierarchical probabilistic models whose random
//! variables include time trees. A model is a directed acyclic graph of
//! constant, deterministic and stochastic nodes; a proposal touches one node,
//! the engine recomputes only what depends on it, and the change is then kept
//! or restored.
//!
//! ## Core Concepts
//!
//! - **DagNode**: A graph vertex with lazy recomputation and a touch/keep/restore protocol
//! - **Distribution**: The log-density, redraw and parameter contract behind a stochastic node
//! - **Tree**: A rooted time tree over named [`Taxon`]s, checked against [`Clade`] constraints
//! - **Tree priors**: Birth-death processes (constant, episodic, mass extinctions, fossilized)
//!   and coalescents (multispecies, constant population, rooted triplets)
//! - **Mcmc**: A Metropolis-Hastings driver over a [`Model`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use phylodag::birthdeath::{BirthDeathProcess, Condition, Rate};
//! use phylodag::dag::{erase, ConstantNode, StochasticNode};
//! use phylodag::distributions::Exponential;
//! use phylodag::mcmc::{Mcmc, ScaleMove};
//! use phylodag::{McmcConfig, Model, Taxon};
//!
//! let lambda = StochasticNode::new("lambda", Box::new(Exponential::new(ConstantNode::new("rate", 1.0))), &mut rng)?;
//! let process = BirthDeathProcess::builder()
//!     .speciation(Rate::constant(lambda.clone()))
//!     .extinction(Rate::constant(ConstantNode::new("mu", 0.1)))
//!     .root_age(ConstantNode::new("root", 10.0))
//!     .condition(Condition::Survival)
//!     .taxa(taxa)
//!     .build()?;
//! let tree = StochasticNode::observed("tree", Box::new(process), observed_tree);
//!
//! let model = Model::new(&[erase(&tree)])?;
//! let moves = vec![Box::new(ScaleMove::new(lambda, 1.0)?) as Box<dyn Move>];
//! let mut chain = Mcmc::new(model, moves, McmcConfig::default())?;
//! let summary = chain.run(|snapshot| println!("{}", snapshot.to_json().unwrap()))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod clade;
pub mod error;
pub mod math;
pub mod rng;
pub mod taxon;
pub mod tree;

// The model graph
pub mod dag;
pub mod distribution;
pub mod functions;

// Probability models
pub mod birthdeath;
pub mod coalescent;
pub mod distributions;

// Models and inference
pub mod config;
pub mod mcmc;
pub mod model;
pub mod snapshot;

// Re-export primary types at crate root for convenience
pub use clade::Clade;
pub use config::{McmcConfig, TreeSimulationConfig};
pub use dag::{erase, ConstantNode, DagNode, DagNodeRef, DeterministicNode, NodeId, StochasticNode, TypedDagNode, TypedNode};
pub use distribution::Distribution;
pub use error::{GraphError, ModelError, PhyloError, PhyloResult};
pub use model::Model;
pub use rng::RandomSource;
pub use snapshot::{MonitorSnapshot, NodeSnapshot};
pub use taxon::Taxon;
pub use tree::{TopologyNode, Tree};
