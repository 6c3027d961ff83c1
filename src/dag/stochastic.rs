use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::{DagNode, DagNodeRef, NodeCore, NodeId, NodeKind, NodeValue, ParameterHandle, TypedNode, WeakDagNode};
use crate::distribution::Distribution;
use crate::error::GraphError;
use crate::math::finite_or_neg_inf;
use crate::rng::RandomSource;

/// A random variable: a value plus the distribution it is drawn from.
///
/// The log-probability is cached and recomputed on the next read after the
/// node or one of its parameters is touched. A clamped node holds observed
/// data and refuses to be redrawn.
pub struct StochasticNode<T: NodeValue> {
    core: NodeCore,
    distribution: RefCell<Box<dyn Distribution<T>>>,
    value: RefCell<T>,
    stored_value: RefCell<Option<T>>,
    ln_prob: Cell<f64>,
    stored_ln_prob: Cell<Option<f64>>,
    needs_recalculation: Cell<bool>,
    clamped: Cell<bool>,
}

impl<T: NodeValue> StochasticNode<T> {
    /// Creates the node with an initial value drawn from the distribution.
    ///
    /// # Errors
    ///
    /// Propagates the distribution's simulation error.
    pub fn new(
        name: impl Into<String>,
        distribution: Box<dyn Distribution<T>>,
        rng: &mut dyn RandomSource,
    ) -> Result<Rc<Self>, GraphError> {
        let value = distribution.redraw_value(rng)?;
        Ok(Self::with_value(name, distribution, value))
    }

    /// Creates the node with a given initial value.
    #[must_use]
    pub fn with_value(name: impl Into<String>, distribution: Box<dyn Distribution<T>>, value: T) -> Rc<Self> {
        let name = name.into();
        let parents = distribution.parameters();
        Rc::new_cyclic(|weak| Self {
            core: NodeCore::new(name, weak.clone() as WeakDagNode, parents),
            distribution: RefCell::new(distribution),
            value: RefCell::new(value),
            stored_value: RefCell::new(None),
            ln_prob: Cell::new(0.0),
            stored_ln_prob: Cell::new(None),
            needs_recalculation: Cell::new(true),
            clamped: Cell::new(false),
        })
    }

    /// Creates a node clamped to observed data.
    #[must_use]
    pub fn observed(name: impl Into<String>, distribution: Box<dyn Distribution<T>>, value: T) -> Rc<Self> {
        let node = Self::with_value(name, distribution, value);
        node.clamped.set(true);
        node
    }

    /// The owned distribution.
    pub fn distribution(&self) -> Ref<'_, Box<dyn Distribution<T>>> {
        self.distribution.borrow()
    }

    /// Touches the node and replaces its value.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ClampedNode` if the node holds observed data.
    pub fn set_value(&self, value: T) -> Result<(), GraphError> {
        self.ensure_free()?;
        self.replace_value(value);
        Ok(())
    }

    fn replace_value(&self, value: T) {
        self.touch();
        let previous = self.value.replace(value);
        let mut stored = self.stored_value.borrow_mut();
        if stored.is_none() {
            *stored = Some(previous);
        }
    }

    /// Touches the node and edits its value in place.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ClampedNode` if the node holds observed data.
    pub fn update_value<R>(&self, edit: impl FnOnce(&mut T) -> R) -> Result<R, GraphError> {
        self.ensure_free()?;
        self.touch();
        {
            let mut stored = self.stored_value.borrow_mut();
            if stored.is_none() {
                *stored = Some(self.value.borrow().clone());
            }
        }
        Ok(edit(&mut self.value.borrow_mut()))
    }

    /// Replaces the value with a fresh draw from the distribution.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ClampedNode` for observed nodes, or the
    /// distribution's simulation error.
    pub fn redraw(&self, rng: &mut dyn RandomSource) -> Result<(), GraphError> {
        self.ensure_free()?;
        let value = self.distribution.borrow().redraw_value(rng)?;
        self.set_value(value)
    }

    /// Fixes the node to observed data and commits the change.
    pub fn clamp(&self, observed: T) {
        self.replace_value(observed);
        self.keep();
        self.clamped.set(true);
    }

    /// Frees the node so it can be redrawn and proposed on again.
    pub fn unclamp(&self) {
        self.clamped.set(false);
    }

    fn ensure_free(&self) -> Result<(), GraphError> {
        if self.clamped.get() {
            Err(GraphError::ClampedNode {
                node: self.core.name().to_string(),
            })
        } else {
            Ok(())
        }
    }

    fn recalculate(&self) {
        if self.needs_recalculation.get() {
            let value = self.value.borrow();
            let ln_prob = self.distribution.borrow().compute_ln_probability(&value);
            self.ln_prob.set(finite_or_neg_inf(ln_prob));
            self.needs_recalculation.set(false);
        }
    }
}

impl<T: NodeValue> fmt::Debug for StochasticNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StochasticNode")
            .field("core", &self.core)
            .field("distribution", &self.distribution.borrow())
            .field("clamped", &self.clamped.get())
            .field("ln_prob", &self.ln_prob.get())
            .finish_non_exhaustive()
    }
}

impl<T: NodeValue> DagNode for StochasticNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Stochastic
    }

    fn stash(&self) {
        if self.core.is_touched() {
            return;
        }
        self.recalculate();
        self.stored_ln_prob.set(Some(self.ln_prob.get()));
        self.core.set_touched(true);
    }

    fn invalidate(&self) {
        self.needs_recalculation.set(true);
    }

    fn accept(&self) {
        self.stored_value.borrow_mut().take();
        self.stored_ln_prob.set(None);
        self.core.set_touched(false);
    }

    fn revert(&self) {
        if !self.core.is_touched() {
            return;
        }
        if let Some(previous) = self.stored_value.borrow_mut().take() {
            *self.value.borrow_mut() = previous;
        }
        match self.stored_ln_prob.take() {
            Some(ln_prob) => {
                self.ln_prob.set(ln_prob);
                self.needs_recalculation.set(false);
            }
            None => self.needs_recalculation.set(true),
        }
        self.core.set_touched(false);
    }

    fn is_dirty(&self) -> bool {
        self.needs_recalculation.get()
    }

    fn ln_probability(&self) -> f64 {
        self.recalculate();
        self.ln_prob.get()
    }

    fn stored_ln_probability(&self) -> Option<f64> {
        self.stored_ln_prob.get()
    }

    fn is_clamped(&self) -> bool {
        self.clamped.get()
    }

    fn value_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.value.borrow()).unwrap_or(serde_json::Value::Null)
    }

    fn replace_parameter(&self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        self.distribution.borrow_mut().swap_parameter(old, new)
    }

    fn owner_reads(&self, parent: NodeId) -> bool {
        self.distribution.borrow().parameters().iter().any(|p| p.id() == parent)
    }
}

impl<T: NodeValue> TypedNode<T> for StochasticNode<T> {
    fn value(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    fn into_dag_node(self: Rc<Self>) -> DagNodeRef {
        self
    }
}
