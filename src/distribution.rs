//! The contract between stochastic nodes and probability models.

use std::fmt;

use crate::dag::{DagNodeRef, NodeId, ParameterHandle};
use crate::error::GraphError;
use crate::rng::RandomSource;

/// A probability model over values of type `T`.
///
/// A distribution is owned by a [`StochasticNode`](crate::dag::StochasticNode)
/// and holds typed handles to its parameter nodes. The node reads the handles
/// through [`parameters`](Distribution::parameters) to wire the graph, and
/// asks the distribution to rewire itself through
/// [`swap_parameter`](Distribution::swap_parameter).
pub trait Distribution<T>: fmt::Debug {
    /// Log-density of `value` given the current parameter values.
    ///
    /// Values outside the support yield negative infinity, never an error.
    fn compute_ln_probability(&self, value: &T) -> f64;

    /// Draws a new value from the same model whose density this reports.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::SimulationUnsupported` for models that only
    /// provide a density, or `GraphError::SimulationFailed` when a
    /// conditioned simulation cannot be completed.
    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<T, GraphError>;

    /// Current parameter nodes.
    fn parameters(&self) -> Vec<DagNodeRef>;

    /// Replaces the handle to `old` with `new`, keeping every other field.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ParameterNotFound` if no handle points at `old`,
    /// or `GraphError::ParameterTypeMismatch` if `new` has the wrong type.
    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError>;

    /// Independent copy sharing only the parameter nodes.
    fn clone_box(&self) -> Box<dyn Distribution<T>>;
}

impl<T> Clone for Box<dyn Distribution<T>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
