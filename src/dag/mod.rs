//! The model graph: constant, deterministic and stochastic nodes.
//!
//! Parameter edges are owning (`Rc`); affected (child) edges are weak and
//! only used for propagation. Edges are added through [`DagNode::add_parameter`]
//! and friends, which refuse any edge that would close a cycle.
//!
//! # The touch/keep/restore protocol
//!
//! A proposal calls `touch` on the node it is about to change, mutates it,
//! reads the new log-probabilities, and then calls either `keep` (accept) or
//! `restore` (reject). `touch` records a restore point on every node it
//! reaches for the first time in the proposal, then marks them all stale.
//! Restore points are taken before anything is marked stale, so a stale
//! deterministic node is never refreshed from an already mutated parent.
//!
//! The engine does not isolate overlapping proposals; the driver must finish
//! one proposal with `keep` or `restore` before starting the next.

mod constant;
mod deterministic;
mod parameter;
mod stochastic;

use std::cell::{Cell, Ref, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GraphError;

pub use constant::ConstantNode;
pub use deterministic::DeterministicNode;
pub use parameter::{ensure_swapped, swap_slot, ParameterHandle, ParameterValue};
pub use stochastic::StochasticNode;

/// Shared handle to any node.
pub type DagNodeRef = Rc<dyn DagNode>;

/// Non-owning handle used for affected (child) edges.
pub type WeakDagNode = Weak<dyn DagNode>;

/// Shared handle to a node whose value has type `T`.
pub type TypedDagNode<T> = Rc<dyn TypedNode<T>>;

/// Values a node can hold.
pub trait NodeValue: Clone + fmt::Debug + Serialize + 'static {}

impl<T: Clone + fmt::Debug + Serialize + 'static> NodeValue for T {}

/// Stable node identifier.
///
/// # Examples
///
/// ```
/// use phylodag::NodeId;
///
/// let id = NodeId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil node ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three node variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Constant,
    Deterministic,
    Stochastic,
}

/// Identity, edges and the touched flag shared by every node variant.
pub struct NodeCore {
    id: NodeId,
    name: String,
    parents: RefCell<Vec<DagNodeRef>>,
    children: RefCell<Vec<WeakDagNode>>,
    touched: Cell<bool>,
    weak_self: WeakDagNode,
}

impl NodeCore {
    /// Creates the core of a node under construction and registers it as a
    /// child of each (deduplicated) parent.
    pub(crate) fn new(name: impl Into<String>, weak_self: WeakDagNode, parents: Vec<DagNodeRef>) -> Self {
        let mut unique: Vec<DagNodeRef> = Vec::with_capacity(parents.len());
        for parent in parents {
            if !unique.iter().any(|p| p.id() == parent.id()) {
                parent.core().add_child(weak_self.clone());
                unique.push(parent);
            }
        }
        Self {
            id: NodeId::new(),
            name: name.into(),
            parents: RefCell::new(unique),
            children: RefCell::new(Vec::new()),
            touched: Cell::new(false),
            weak_self,
        }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_touched(&self) -> bool {
        self.touched.get()
    }

    pub(crate) fn set_touched(&self, touched: bool) {
        self.touched.set(touched);
    }

    fn add_child(&self, child: WeakDagNode) {
        self.children.borrow_mut().push(child);
    }

    fn remove_child(&self, id: NodeId) {
        self.children
            .borrow_mut()
            .retain(|c| c.upgrade().is_some_and(|c| c.id() != id));
    }

    fn has_child(&self, id: NodeId) -> bool {
        self.children
            .borrow()
            .iter()
            .any(|c| c.upgrade().is_some_and(|c| c.id() == id))
    }

    fn live_children(&self) -> Vec<DagNodeRef> {
        self.children.borrow().iter().filter_map(Weak::upgrade).collect()
    }

    fn parents(&self) -> Ref<'_, Vec<DagNodeRef>> {
        self.parents.borrow()
    }
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parents: Vec<String> = self.parents.borrow().iter().map(|p| p.name().to_string()).collect();
        f.debug_struct("NodeCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parents", &parents)
            .field("touched", &self.touched.get())
            .finish()
    }
}

/// A variable of the model graph.
///
/// Variants implement the per-node hooks (`stash`, `invalidate`, `accept`,
/// `revert`); the protocol and edge operations are provided on top of them
/// and work the same for every variant.
pub trait DagNode: fmt::Debug {
    /// Identity and edges.
    fn core(&self) -> &NodeCore;

    fn kind(&self) -> NodeKind;

    /// Records a restore point the first time the node is touched in a
    /// proposal.
    fn stash(&self);

    /// Marks the cached value or log-probability stale.
    fn invalidate(&self);

    /// Drops the restore point.
    fn accept(&self);

    /// Returns to the restore point, if any.
    fn revert(&self);

    /// True while the cached value or log-probability is stale.
    fn is_dirty(&self) -> bool;

    /// Log-probability contribution; zero for non-stochastic nodes.
    fn ln_probability(&self) -> f64 {
        0.0
    }

    /// Log-probability recorded at the last touch.
    fn stored_ln_probability(&self) -> Option<f64> {
        None
    }

    fn is_clamped(&self) -> bool {
        false
    }

    /// JSON rendering of the current value for monitors.
    fn value_json(&self) -> serde_json::Value;

    /// Lets the owned distribution or function replace its handle to `old`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ParameterNotFound` if the owner does not use
    /// `old`, or `GraphError::ParameterTypeMismatch` if `new` has the wrong
    /// value type.
    fn replace_parameter(&self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError>;

    /// True when the owned distribution or function reads `parent`.
    fn owner_reads(&self, _parent: NodeId) -> bool {
        false
    }

    fn id(&self) -> NodeId {
        self.core().id()
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn is_touched(&self) -> bool {
        self.core().is_touched()
    }

    fn is_stochastic(&self) -> bool {
        self.kind() == NodeKind::Stochastic
    }

    /// Current parameters.
    fn parents(&self) -> Vec<DagNodeRef> {
        self.core().parents().clone()
    }

    /// Current direct affected nodes.
    fn children(&self) -> Vec<DagNodeRef> {
        self.core().live_children()
    }

    /// Every node reachable through affected edges, each once, excluding
    /// this node.
    fn affected_nodes(&self) -> Vec<DagNodeRef> {
        let mut seen = HashSet::from([self.id()]);
        let mut queue: VecDeque<DagNodeRef> = self.children().into();
        let mut affected = Vec::new();
        while let Some(node) = queue.pop_front() {
            if seen.insert(node.id()) {
                queue.extend(node.children());
                affected.push(node);
            }
        }
        affected
    }

    /// Marks this node and everything it affects as stale, recording restore
    /// points on first touch.
    fn touch(&self) {
        let affected = self.affected_nodes();
        self.stash();
        for node in &affected {
            node.stash();
        }
        self.invalidate();
        for node in &affected {
            node.invalidate();
        }
    }

    /// Accepts the current state of this node and everything it affects.
    fn keep(&self) {
        self.accept();
        for node in self.affected_nodes() {
            node.accept();
        }
    }

    /// Reverts this node and everything it affects to the last touch.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ProtocolViolation` if the node was not touched
    /// since the last `keep` or `restore`.
    fn restore(&self) -> Result<(), GraphError> {
        if !self.is_touched() {
            return Err(GraphError::ProtocolViolation {
                node: self.name().to_string(),
                reason: "restore called outside a touch window".to_string(),
            });
        }
        self.revert();
        for node in self.affected_nodes() {
            node.revert();
        }
        Ok(())
    }

    /// Marks this node and everything it affects stale without recording
    /// restore points. Used after structural edits.
    fn invalidate_downstream(&self) {
        self.invalidate();
        for node in self.affected_nodes() {
            node.invalidate();
        }
    }

    /// Adds `parent` as a parameter of this node.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ConstantNode` for constants and
    /// `GraphError::CycleDetected` if `parent` depends on this node; the
    /// graph is unchanged in both cases.
    fn add_parameter(&self, parent: &DagNodeRef) -> Result<(), GraphError> {
        if self.kind() == NodeKind::Constant {
            return Err(GraphError::ConstantNode {
                node: self.name().to_string(),
            });
        }
        if depends_on(parent, self.id()) {
            return Err(GraphError::CycleDetected {
                node: self.name().to_string(),
                parent: parent.name().to_string(),
            });
        }
        if self.core().parents().iter().any(|p| p.id() == parent.id()) {
            return Ok(());
        }
        self.core().parents.borrow_mut().push(Rc::clone(parent));
        parent.core().add_child(self.core().weak_self.clone());
        self.invalidate_downstream();
        Ok(())
    }

    /// Removes `parent` from this node's parameters.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ParameterNotFound` if `parent` is not a parameter,
    /// or `GraphError::ParameterInUse` while the owned distribution or
    /// function still reads it; use `swap_parameter` for those edges.
    fn remove_parameter(&self, parent: &DagNodeRef) -> Result<(), GraphError> {
        let position = self
            .core()
            .parents()
            .iter()
            .position(|p| p.id() == parent.id())
            .ok_or_else(|| GraphError::ParameterNotFound {
                node: self.name().to_string(),
                parent: parent.name().to_string(),
            })?;
        if self.owner_reads(parent.id()) {
            return Err(GraphError::ParameterInUse {
                node: self.name().to_string(),
                parent: parent.name().to_string(),
            });
        }
        self.core().parents.borrow_mut().remove(position);
        parent.core().remove_child(self.id());
        self.invalidate_downstream();
        Ok(())
    }

    /// Replaces parameter `old` by `new`, notifying the owned distribution or
    /// function so it updates its typed handle.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ParameterNotFound` if `old` is not a parameter,
    /// `GraphError::CycleDetected` if `new` depends on this node, or the
    /// owner's type mismatch error. The graph is unchanged on error.
    fn swap_parameter(&self, old: &DagNodeRef, new: &ParameterHandle) -> Result<(), GraphError> {
        let Some(position) = self.core().parents().iter().position(|p| p.id() == old.id()) else {
            return Err(GraphError::ParameterNotFound {
                node: self.name().to_string(),
                parent: old.name().to_string(),
            });
        };
        let replacement = new.erased();
        if replacement.id() != old.id() && depends_on(&replacement, self.id()) {
            return Err(GraphError::CycleDetected {
                node: self.name().to_string(),
                parent: replacement.name().to_string(),
            });
        }
        self.replace_parameter(old.id(), new)?;
        {
            let mut parents = self.core().parents.borrow_mut();
            if parents.iter().any(|p| p.id() == replacement.id()) {
                parents.remove(position);
            } else {
                parents[position] = Rc::clone(&replacement);
            }
        }
        if !self.core().parents().iter().any(|p| p.id() == old.id()) {
            old.core().remove_child(self.id());
        }
        if !replacement.core().has_child(self.id()) {
            replacement.core().add_child(self.core().weak_self.clone());
        }
        self.invalidate_downstream();
        Ok(())
    }
}

/// Typed access to a node's value.
pub trait TypedNode<T: NodeValue>: DagNode {
    /// Current value, refreshed first if stale.
    fn value(&self) -> Ref<'_, T>;

    /// Converts a typed handle into an untyped one.
    fn into_dag_node(self: Rc<Self>) -> DagNodeRef;
}

/// Untyped handle to a typed node.
#[must_use]
pub fn erase<T: NodeValue>(node: &TypedDagNode<T>) -> DagNodeRef {
    Rc::clone(node).into_dag_node()
}

/// True when `node` is `target` or depends on it through parameter edges.
fn depends_on(node: &DagNodeRef, target: NodeId) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![Rc::clone(node)];
    while let Some(current) = stack.pop() {
        if current.id() == target {
            return true;
        }
        if seen.insert(current.id()) {
            stack.extend(current.parents());
        }
    }
    false
}

/// Sum of (current − recorded) log-probabilities over `node` and every
/// stochastic node it affects.
///
/// Meant to be read between `touch` and `keep`/`restore`.
#[must_use]
pub fn affected_ln_probability_ratio(node: &dyn DagNode) -> f64 {
    let mut ratio = 0.0;
    let mut add = |n: &dyn DagNode| {
        if n.is_stochastic() {
            let stored = n.stored_ln_probability().unwrap_or(f64::NEG_INFINITY);
            let current = n.ln_probability();
            if current != stored {
                ratio += current - stored;
            }
        }
    };
    add(node);
    for affected in node.affected_nodes() {
        add(affected.as_ref());
    }
    ratio
}
