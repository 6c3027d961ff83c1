use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::{DagNode, DagNodeRef, NodeCore, NodeId, NodeKind, NodeValue, ParameterHandle, TypedNode, WeakDagNode};
use crate::error::GraphError;
use crate::functions::Function;

/// A node whose value is a pure function of its parameters.
///
/// The value is recomputed lazily: touching a parameter marks the node stale
/// and the next read refreshes it.
pub struct DeterministicNode<T: NodeValue> {
    core: NodeCore,
    function: RefCell<Box<dyn Function<T>>>,
    value: RefCell<T>,
    stored_value: RefCell<Option<T>>,
    dirty: Cell<bool>,
}

impl<T: NodeValue> DeterministicNode<T> {
    /// Creates the node and computes its initial value.
    #[must_use]
    pub fn new(name: impl Into<String>, function: Box<dyn Function<T>>) -> Rc<Self> {
        let name = name.into();
        let value = function.compute();
        let parents = function.parameters();
        Rc::new_cyclic(|weak| Self {
            core: NodeCore::new(name, weak.clone() as WeakDagNode, parents),
            function: RefCell::new(function),
            value: RefCell::new(value),
            stored_value: RefCell::new(None),
            dirty: Cell::new(false),
        })
    }

    /// The owned function.
    pub fn function(&self) -> Ref<'_, Box<dyn Function<T>>> {
        self.function.borrow()
    }

    fn refresh(&self) {
        if self.dirty.get() {
            let fresh = self.function.borrow().compute();
            *self.value.borrow_mut() = fresh;
            self.dirty.set(false);
        }
    }
}

impl<T: NodeValue> fmt::Debug for DeterministicNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeterministicNode")
            .field("core", &self.core)
            .field("function", &self.function.borrow())
            .field("dirty", &self.dirty.get())
            .finish_non_exhaustive()
    }
}

impl<T: NodeValue> DagNode for DeterministicNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Deterministic
    }

    fn stash(&self) {
        if self.core.is_touched() {
            return;
        }
        let snapshot = if self.dirty.get() {
            None
        } else {
            Some(self.value.borrow().clone())
        };
        *self.stored_value.borrow_mut() = snapshot;
        self.core.set_touched(true);
    }

    fn invalidate(&self) {
        self.dirty.set(true);
    }

    fn accept(&self) {
        self.stored_value.borrow_mut().take();
        self.core.set_touched(false);
    }

    fn revert(&self) {
        if !self.core.is_touched() {
            return;
        }
        match self.stored_value.borrow_mut().take() {
            Some(previous) => {
                *self.value.borrow_mut() = previous;
                self.dirty.set(false);
            }
            None => self.dirty.set(true),
        }
        self.core.set_touched(false);
    }

    fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    fn value_json(&self) -> serde_json::Value {
        serde_json::to_value(&*self.value()).unwrap_or(serde_json::Value::Null)
    }

    fn replace_parameter(&self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        self.function.borrow_mut().swap_parameter(old, new)
    }

    fn owner_reads(&self, parent: NodeId) -> bool {
        self.function.borrow().parameters().iter().any(|p| p.id() == parent)
    }
}

impl<T: NodeValue> TypedNode<T> for DeterministicNode<T> {
    fn value(&self) -> Ref<'_, T> {
        self.refresh();
        self.value.borrow()
    }

    fn into_dag_node(self: Rc<Self>) -> DagNodeRef {
        self
    }
}
