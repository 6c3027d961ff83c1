//! Pure functions owned by deterministic nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dag::{ensure_swapped, erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode, TypedNode};
use crate::error::GraphError;
use crate::tree::Tree;

/// A pure function of parameter nodes.
pub trait Function<T>: fmt::Debug {
    /// Evaluates the function on the current parameter values.
    fn compute(&self) -> T;

    /// Current parameter nodes.
    fn parameters(&self) -> Vec<DagNodeRef>;

    /// Replaces the handle to `old` with `new`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ParameterNotFound` if no handle points at `old`,
    /// or `GraphError::ParameterTypeMismatch` if `new` has the wrong type.
    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError>;

    fn clone_box(&self) -> Box<dyn Function<T>>;
}

impl<T> Clone for Box<dyn Function<T>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    #[must_use]
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        };
        f.write_str(symbol)
    }
}

/// `lhs <op> rhs` on two real nodes.
#[derive(Debug, Clone)]
pub struct Arithmetic {
    operator: Operator,
    lhs: TypedDagNode<f64>,
    rhs: TypedDagNode<f64>,
}

impl Arithmetic {
    #[must_use]
    pub fn new(operator: Operator, lhs: TypedDagNode<f64>, rhs: TypedDagNode<f64>) -> Self {
        Self { operator, lhs, rhs }
    }
}

impl Function<f64> for Arithmetic {
    fn compute(&self) -> f64 {
        let lhs = *self.lhs.value();
        let rhs = *self.rhs.value();
        self.operator.apply(lhs, rhs)
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.lhs), erase(&self.rhs)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let owner = format!("arithmetic {}", self.operator);
        let lhs = swap_slot(&owner, &mut self.lhs, old, new)?;
        let rhs = swap_slot(&owner, &mut self.rhs, old, new)?;
        ensure_swapped(&owner, lhs || rhs, old)
    }

    fn clone_box(&self) -> Box<dyn Function<f64>> {
        Box::new(self.clone())
    }
}

/// Assembles a vector from real nodes, in order.
#[derive(Debug, Clone)]
pub struct RealVector {
    elements: Vec<TypedDagNode<f64>>,
}

impl RealVector {
    #[must_use]
    pub fn new(elements: Vec<TypedDagNode<f64>>) -> Self {
        Self { elements }
    }
}

impl Function<Vec<f64>> for RealVector {
    fn compute(&self) -> Vec<f64> {
        self.elements.iter().map(|e| *e.value()).collect()
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        self.elements.iter().map(erase).collect()
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let mut found = false;
        for element in &mut self.elements {
            found |= swap_slot("real vector", element, old, new)?;
        }
        ensure_swapped("real vector", found, old)
    }

    fn clone_box(&self) -> Box<dyn Function<Vec<f64>>> {
        Box::new(self.clone())
    }
}

/// Root age of a tree node.
#[derive(Debug, Clone)]
pub struct TreeAge {
    tree: TypedDagNode<Tree>,
}

impl TreeAge {
    #[must_use]
    pub fn new(tree: TypedDagNode<Tree>) -> Self {
        Self { tree }
    }
}

impl Function<f64> for TreeAge {
    fn compute(&self) -> f64 {
        self.tree.value().root_age()
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.tree)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let found = swap_slot("tree age", &mut self.tree, old, new)?;
        ensure_swapped("tree age", found, old)
    }

    fn clone_box(&self) -> Box<dyn Function<f64>> {
        Box::new(self.clone())
    }
}
