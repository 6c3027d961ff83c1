use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use super::{DagNode, DagNodeRef, NodeCore, NodeId, NodeKind, NodeValue, ParameterHandle, TypedNode, WeakDagNode};
use crate::error::GraphError;

/// A node holding a fixed value. It has no parameters and is never touched.
pub struct ConstantNode<T: NodeValue> {
    core: NodeCore,
    value: RefCell<T>,
}

impl<T: NodeValue> ConstantNode<T> {
    #[must_use]
    pub fn new(name: impl Into<String>, value: T) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|weak| Self {
            core: NodeCore::new(name, weak.clone() as WeakDagNode, Vec::new()),
            value: RefCell::new(value),
        })
    }
}

impl<T: NodeValue> fmt::Debug for ConstantNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantNode")
            .field("name", &self.core.name())
            .field("value", &*self.value.borrow())
            .finish()
    }
}

impl<T: NodeValue> DagNode for ConstantNode<T> {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Constant
    }

    fn stash(&self) {}

    fn invalidate(&self) {}

    fn accept(&self) {}

    fn revert(&self) {}

    fn is_dirty(&self) -> bool {
        false
    }

    fn value_json(&self) -> serde_json::Value {
        // Values JSON cannot represent (non-finite reals) show up as null.
        serde_json::to_value(&*self.value.borrow()).unwrap_or(serde_json::Value::Null)
    }

    fn replace_parameter(&self, old: NodeId, _new: &ParameterHandle) -> Result<(), GraphError> {
        Err(GraphError::ParameterNotFound {
            node: self.core.name().to_string(),
            parent: old.to_string(),
        })
    }
}

impl<T: NodeValue> TypedNode<T> for ConstantNode<T> {
    fn value(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    fn into_dag_node(self: Rc<Self>) -> DagNodeRef {
        self
    }
}
