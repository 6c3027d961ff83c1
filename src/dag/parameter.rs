//! Typed parameter handles passed to `swap_parameter`.

use std::fmt;

use super::{erase, DagNodeRef, NodeId, NodeValue, TypedDagNode};
use crate::error::GraphError;
use crate::tree::Tree;

/// A typed handle to a node that can stand in as a distribution or function
/// parameter.
#[derive(Clone)]
pub enum ParameterHandle {
    Real(TypedDagNode<f64>),
    RealVector(TypedDagNode<Vec<f64>>),
    Tree(TypedDagNode<Tree>),
}

impl ParameterHandle {
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::Real(n) => n.id(),
            Self::RealVector(n) => n.id(),
            Self::Tree(n) => n.id(),
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Real(n) => n.name().to_string(),
            Self::RealVector(n) => n.name().to_string(),
            Self::Tree(n) => n.name().to_string(),
        }
    }

    /// The same node as an untyped handle.
    #[must_use]
    pub fn erased(&self) -> DagNodeRef {
        match self {
            Self::Real(n) => erase(n),
            Self::RealVector(n) => erase(n),
            Self::Tree(n) => erase(n),
        }
    }
}

impl fmt::Debug for ParameterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Real(_) => "Real",
            Self::RealVector(_) => "RealVector",
            Self::Tree(_) => "Tree",
        };
        write!(f, "{kind}({})", self.name())
    }
}

/// Value types that can be wrapped in a [`ParameterHandle`].
pub trait ParameterValue: NodeValue {
    /// Human-readable type name for error messages.
    const KIND: &'static str;

    fn from_handle(handle: &ParameterHandle) -> Option<TypedDagNode<Self>>;

    fn into_handle(node: TypedDagNode<Self>) -> ParameterHandle;
}

impl ParameterValue for f64 {
    const KIND: &'static str = "real";

    fn from_handle(handle: &ParameterHandle) -> Option<TypedDagNode<Self>> {
        match handle {
            ParameterHandle::Real(n) => Some(n.clone()),
            _ => None,
        }
    }

    fn into_handle(node: TypedDagNode<Self>) -> ParameterHandle {
        ParameterHandle::Real(node)
    }
}

impl ParameterValue for Vec<f64> {
    const KIND: &'static str = "real vector";

    fn from_handle(handle: &ParameterHandle) -> Option<TypedDagNode<Self>> {
        match handle {
            ParameterHandle::RealVector(n) => Some(n.clone()),
            _ => None,
        }
    }

    fn into_handle(node: TypedDagNode<Self>) -> ParameterHandle {
        ParameterHandle::RealVector(node)
    }
}

impl ParameterValue for Tree {
    const KIND: &'static str = "tree";

    fn from_handle(handle: &ParameterHandle) -> Option<TypedDagNode<Self>> {
        match handle {
            ParameterHandle::Tree(n) => Some(n.clone()),
            _ => None,
        }
    }

    fn into_handle(node: TypedDagNode<Self>) -> ParameterHandle {
        ParameterHandle::Tree(node)
    }
}

/// Replaces `slot` with `new` if it currently points at `old`.
///
/// Returns whether the slot matched.
///
/// # Errors
///
/// Returns `GraphError::ParameterTypeMismatch` if the slot matched but `new`
/// holds a different value type.
pub fn swap_slot<T: ParameterValue>(
    owner: &str,
    slot: &mut TypedDagNode<T>,
    old: NodeId,
    new: &ParameterHandle,
) -> Result<bool, GraphError> {
    if slot.id() != old {
        return Ok(false);
    }
    let replacement = T::from_handle(new).ok_or_else(|| GraphError::ParameterTypeMismatch {
        node: owner.to_string(),
        parent: new.name(),
        expected: T::KIND,
    })?;
    *slot = replacement;
    Ok(true)
}

/// Turns "no slot matched" into `GraphError::ParameterNotFound`.
///
/// # Errors
///
/// Returns `GraphError::ParameterNotFound` when `found` is false.
pub fn ensure_swapped(owner: &str, found: bool, old: NodeId) -> Result<(), GraphError> {
    if found {
        Ok(())
    } else {
        Err(GraphError::ParameterNotFound {
            node: owner.to_string(),
            parent: old.to_string(),
        })
    }
}
