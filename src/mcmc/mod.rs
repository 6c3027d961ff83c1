//! Metropolis-Hastings over a [`Model`](crate::model::Model).
//!
//! A [`Mcmc`] chain owns its model and a weighted set of [`Move`]s. Several
//! chains can run side by side with [`run_independent_chains`], each on its
//! own thread with its own graph.

mod chain;
mod moves;
mod parallel;

pub use chain::{ChainSummary, Mcmc, MoveStats};
pub use moves::{Move, NodeAgeSlide, ScaleMove, SlideMove};
pub use parallel::{run_independent_chains, ChainFactory};
