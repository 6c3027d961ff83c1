//! Rooted time trees.
//!
//! A `Tree` owns its nodes in an array; nodes refer to their parent and
//! children by index. Ages grow from the tips toward the root. Tips older
//! than the present are fossils; a node with one child that carries a taxon is
//! a sampled ancestor.
//!
//! Any change to the branching structure bumps the tree's topology version,
//! which invalidates cached MRCA lookups.

mod clades;
mod newick;
pub mod simulate;
mod triplets;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::taxon::Taxon;

pub(crate) use clades::MrcaCache;
pub use triplets::RootedTriplet;

/// A node of a [`Tree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNode {
    index: usize,
    age: f64,
    taxon: Option<Taxon>,
    parent: Option<usize>,
    children: Vec<usize>,
}

impl TopologyNode {
    /// Position in the owning tree's node array.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn age(&self) -> f64 {
        self.age
    }

    /// Taxon name for tips and sampled ancestors.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.taxon.as_ref().map(Taxon::name)
    }

    #[must_use]
    pub const fn taxon(&self) -> Option<&Taxon> {
        self.taxon.as_ref()
    }

    #[must_use]
    pub const fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    #[must_use]
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// A one-child node carrying a taxon: a fossil sampled on a lineage that
    /// continued to evolve.
    #[must_use]
    pub fn is_sampled_ancestor(&self) -> bool {
        self.children.len() == 1 && self.taxon.is_some()
    }

    /// A bifurcation.
    #[must_use]
    pub fn is_speciation(&self) -> bool {
        self.children.len() == 2
    }
}

/// A rooted tree with node ages.
///
/// # Examples
///
/// ```
/// use phylodag::{Clade, Taxon, Tree};
///
/// let mut tree = Tree::new();
/// let a = tree.add_tip(Taxon::new("A"));
/// let b = tree.add_tip(Taxon::new("B"));
/// let c = tree.add_tip(Taxon::new("C"));
/// let ab = tree.add_internal(a, b, 1.0).unwrap();
/// let root = tree.add_internal(ab, c, 2.0).unwrap();
///
/// assert_eq!(tree.root(), Some(root));
/// assert!(tree.is_monophyletic(&Clade::new(["A", "B"]).unwrap()));
/// assert_eq!(tree.tmrca(&Clade::new(["A", "C"]).unwrap()), Some(2.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<TopologyNode>,
    root: Option<usize>,
    rooted: bool,
    topology_version: u64,
    #[serde(skip)]
    mrca_cache: MrcaCache,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.rooted == other.rooted && self.nodes == other.nodes
    }
}

impl Tree {
    /// Creates an empty rooted tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            rooted: true,
            topology_version: 0,
            mrca_cache: MrcaCache::default(),
        }
    }

    /// A tree made of a single tip.
    #[must_use]
    pub fn single_tip(taxon: Taxon) -> Self {
        let mut tree = Self::new();
        tree.add_tip(taxon);
        tree
    }

    /// Adds a tip at the taxon's sampling age and returns its index.
    pub fn add_tip(&mut self, taxon: Taxon) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TopologyNode {
            index,
            age: taxon.age(),
            taxon: Some(taxon),
            parent: None,
            children: Vec::new(),
        });
        if self.root.is_none() {
            self.root = Some(index);
        }
        self.bump_version();
        index
    }

    /// Joins two parentless nodes under a new node of the given age, which
    /// becomes the root.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTree` if either child is unknown, already
    /// attached, identical to the other, or older than `age`.
    pub fn add_internal(&mut self, left: usize, right: usize, age: f64) -> Result<usize, ModelError> {
        if left == right {
            return Err(invalid_tree(format!("node {left} cannot be joined with itself")));
        }
        self.check_attachable(left, age)?;
        self.check_attachable(right, age)?;
        Ok(self.push_parent(vec![left, right], age, None))
    }

    /// Places a sampled ancestor directly above `child`; the new node becomes
    /// the root.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTree` if `child` is unknown, attached, or
    /// older than the taxon's sampling age.
    pub fn add_sampled_ancestor(&mut self, child: usize, taxon: Taxon) -> Result<usize, ModelError> {
        let age = taxon.age();
        self.check_attachable(child, age)?;
        Ok(self.push_parent(vec![child], age, Some(taxon)))
    }

    /// Declares which parentless node is the root.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTree` if the node is unknown or has a parent.
    pub fn set_root(&mut self, index: usize) -> Result<(), ModelError> {
        let node = self.node(index).ok_or_else(|| invalid_tree(format!("no node {index}")))?;
        if node.parent.is_some() {
            return Err(invalid_tree(format!("node {index} has a parent and cannot be the root")));
        }
        self.root = Some(index);
        self.bump_version();
        Ok(())
    }

    fn check_attachable(&self, index: usize, age: f64) -> Result<(), ModelError> {
        let node = self.node(index).ok_or_else(|| invalid_tree(format!("no node {index}")))?;
        if node.parent.is_some() {
            return Err(invalid_tree(format!("node {index} already has a parent")));
        }
        if !age.is_finite() || age < node.age {
            return Err(invalid_tree(format!(
                "parent age {age} is younger than child {index} of age {}",
                node.age
            )));
        }
        Ok(())
    }

    fn push_parent(&mut self, children: Vec<usize>, age: f64, taxon: Option<Taxon>) -> usize {
        let index = self.nodes.len();
        for &child in &children {
            self.nodes[child].parent = Some(index);
        }
        self.nodes.push(TopologyNode {
            index,
            age,
            taxon,
            parent: None,
            children,
        });
        self.root = Some(index);
        self.bump_version();
        index
    }

    fn bump_version(&mut self) {
        self.topology_version = self.topology_version.wrapping_add(1);
    }

    /// Counter incremented by every topology change.
    #[must_use]
    pub const fn topology_version(&self) -> u64 {
        self.topology_version
    }

    #[must_use]
    pub const fn is_rooted(&self) -> bool {
        self.rooted
    }

    pub fn set_rooted(&mut self, rooted: bool) {
        self.rooted = rooted;
    }

    #[must_use]
    pub const fn root(&self) -> Option<usize> {
        self.root
    }

    /// Age of the root, or 0 for an empty tree.
    #[must_use]
    pub fn root_age(&self) -> f64 {
        self.root.map_or(0.0, |r| self.nodes[r].age)
    }

    #[must_use]
    pub fn node(&self, index: usize) -> Option<&TopologyNode> {
        self.nodes.get(index)
    }

    #[must_use]
    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn tips(&self) -> impl Iterator<Item = &TopologyNode> {
        self.nodes.iter().filter(|n| n.is_tip())
    }

    #[must_use]
    pub fn num_tips(&self) -> usize {
        self.tips().count()
    }

    /// Every node carrying a taxon: tips and sampled ancestors.
    pub fn sampled_nodes(&self) -> impl Iterator<Item = &TopologyNode> {
        self.nodes.iter().filter(|n| n.taxon.is_some())
    }

    /// Bifurcating nodes.
    pub fn speciation_nodes(&self) -> impl Iterator<Item = &TopologyNode> {
        self.nodes.iter().filter(|n| n.is_speciation())
    }

    /// Ages of all bifurcations, sorted ascending.
    #[must_use]
    pub fn speciation_ages(&self) -> Vec<f64> {
        let mut ages: Vec<f64> = self.speciation_nodes().map(TopologyNode::age).collect();
        ages.sort_by(f64::total_cmp);
        ages
    }

    /// Index of the node carrying the named taxon.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name() == Some(name))
    }

    /// All taxon names in the tree.
    #[must_use]
    pub fn taxon_names(&self) -> BTreeSet<String> {
        self.sampled_nodes()
            .filter_map(|n| n.name().map(str::to_string))
            .collect()
    }

    /// Taxon names subtended by `index`, including sampled ancestors.
    #[must_use]
    pub fn subtended_names(&self, index: usize) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            let Some(node) = self.nodes.get(i) else { continue };
            if let Some(name) = node.name() {
                names.insert(name.to_string());
            }
            stack.extend_from_slice(&node.children);
        }
        names
    }

    /// Branch length above `index` (0 for the root).
    #[must_use]
    pub fn branch_length(&self, index: usize) -> f64 {
        let node = &self.nodes[index];
        node.parent.map_or(0.0, |p| self.nodes[p].age - node.age)
    }

    /// Sets a node age without checking its neighbours.
    ///
    /// Proposals may produce trees that violate the age ordering; densities
    /// report those as negative infinity.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTree` for an unknown node or a negative or
    /// non-finite age.
    pub fn set_age(&mut self, index: usize, age: f64) -> Result<(), ModelError> {
        if !age.is_finite() || age < 0.0 {
            return Err(invalid_tree(format!("age {age} is not a non-negative finite number")));
        }
        let node = self
            .nodes
            .get_mut(index)
            .ok_or_else(|| invalid_tree(format!("no node {index}")))?;
        node.age = age;
        Ok(())
    }

    /// Multiplies every node age by `factor`.
    pub fn rescale(&mut self, factor: f64) {
        for node in &mut self.nodes {
            node.age *= factor;
        }
    }

    /// True when no node is older than its parent.
    #[must_use]
    pub fn has_consistent_ages(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.parent.map_or(true, |p| n.age <= self.nodes[p].age) && n.age >= 0.0)
    }

    /// True when all tips are within `tolerance` of age 0.
    #[must_use]
    pub fn is_ultrametric(&self, tolerance: f64) -> bool {
        self.tips().all(|n| n.age.abs() <= tolerance)
    }

    /// Checks the structural invariants: one parentless node which is the
    /// root, binary or sampled-ancestor branching, unique taxon names and
    /// consistent ages.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTree` describing the first violation.
    pub fn validate(&self) -> Result<(), ModelError> {
        let parentless: Vec<usize> = self
            .nodes
            .iter()
            .filter(|n| n.parent.is_none())
            .map(TopologyNode::index)
            .collect();
        match (parentless.as_slice(), self.root) {
            ([only], Some(root)) if *only == root => {}
            _ => {
                return Err(invalid_tree(format!(
                    "expected exactly one parentless node equal to the root, found {parentless:?}"
                )))
            }
        }
        let mut seen = HashMap::new();
        for node in &self.nodes {
            match node.children.len() {
                0 | 2 => {}
                1 if node.taxon.is_some() => {}
                n => {
                    return Err(invalid_tree(format!(
                        "node {} has {n} children",
                        node.index
                    )))
                }
            }
            if node.is_tip() && node.taxon.is_none() {
                return Err(invalid_tree(format!("tip {} has no taxon", node.index)));
            }
            if let Some(name) = node.name() {
                if let Some(previous) = seen.insert(name.to_string(), node.index) {
                    return Err(invalid_tree(format!(
                        "taxon '{name}' labels nodes {previous} and {}",
                        node.index
                    )));
                }
            }
        }
        if !self.has_consistent_ages() {
            return Err(invalid_tree("a node is older than its parent".to_string()));
        }
        Ok(())
    }

    /// Node indices in post-order (children before parents).
    #[must_use]
    pub fn postorder(&self) -> Vec<usize> {
        let Some(root) = self.root else {
            return Vec::new();
        };
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(root, false)];
        while let Some((index, expanded)) = stack.pop() {
            if expanded {
                order.push(index);
            } else {
                stack.push((index, true));
                for &child in self.nodes[index].children.iter().rev() {
                    stack.push((child, false));
                }
            }
        }
        order
    }

    /// True when `ancestor` lies on the path from `index` to the root.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        let mut current = self.nodes.get(index).and_then(|n| n.parent);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes[i].parent;
        }
        false
    }

    /// Swaps the subtrees rooted at `a` and `b` between their parents.
    ///
    /// This is the rearrangement behind narrow and wide exchange moves. The
    /// topology version is bumped.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidTree` if either node is the root, they share
    /// a parent, or one is an ancestor of the other.
    pub fn exchange_subtrees(&mut self, a: usize, b: usize) -> Result<(), ModelError> {
        let (Some(pa), Some(pb)) = (
            self.node(a).and_then(TopologyNode::parent),
            self.node(b).and_then(TopologyNode::parent),
        ) else {
            return Err(invalid_tree(format!("nodes {a} and {b} must both have parents")));
        };
        if pa == pb || self.is_ancestor(a, b) || self.is_ancestor(b, a) {
            return Err(invalid_tree(format!("nodes {a} and {b} cannot be exchanged")));
        }
        for child in &mut self.nodes[pa].children {
            if *child == a {
                *child = b;
            }
        }
        for child in &mut self.nodes[pb].children {
            if *child == b {
                *child = a;
            }
        }
        self.nodes[a].parent = Some(pb);
        self.nodes[b].parent = Some(pa);
        self.bump_version();
        Ok(())
    }
}

fn invalid_tree(reason: impl Into<String>) -> ModelError {
    ModelError::InvalidTree {
        reason: reason.into(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// ((A:1,B:1):1,C:2) with root age 2.
    pub(crate) fn three_taxon_tree() -> Tree {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A"));
        let b = tree.add_tip(Taxon::new("B"));
        let c = tree.add_tip(Taxon::new("C"));
        let ab = tree.add_internal(a, b, 1.0).unwrap();
        tree.add_internal(ab, c, 2.0).unwrap();
        tree
    }

    #[test]
    fn builder_sets_root_and_parents() {
        let tree = three_taxon_tree();
        assert_eq!(tree.root(), Some(4));
        assert_eq!(tree.node(0).unwrap().parent(), Some(3));
        assert_eq!(tree.num_tips(), 3);
        assert_eq!(tree.speciation_ages(), vec![1.0, 2.0]);
        tree.validate().unwrap();
    }

    #[test]
    fn parent_younger_than_child_is_rejected() {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A").with_age(3.0).unwrap());
        let b = tree.add_tip(Taxon::new("B"));
        assert!(tree.add_internal(a, b, 2.0).is_err());
    }

    #[test]
    fn attached_nodes_cannot_be_reattached() {
        let mut tree = three_taxon_tree();
        assert!(tree.add_internal(0, 2, 5.0).is_err());
        assert!(tree.add_internal(4, 4, 5.0).is_err());
    }

    #[test]
    fn branch_lengths_follow_ages() {
        let tree = three_taxon_tree();
        assert_eq!(tree.branch_length(0), 1.0);
        assert_eq!(tree.branch_length(3), 1.0);
        assert_eq!(tree.branch_length(2), 2.0);
        assert_eq!(tree.branch_length(4), 0.0);
    }

    #[test]
    fn postorder_visits_children_first() {
        let tree = three_taxon_tree();
        let order = tree.postorder();
        assert_eq!(order.len(), 5);
        assert_eq!(*order.last().unwrap(), 4);
        let pos = |i: usize| order.iter().position(|&x| x == i).unwrap();
        assert!(pos(0) < pos(3));
        assert!(pos(3) < pos(4));
    }

    #[test]
    fn exchange_bumps_version_and_moves_subtrees() {
        let mut tree = three_taxon_tree();
        let before = tree.topology_version();
        tree.exchange_subtrees(0, 2).unwrap();
        assert!(tree.topology_version() > before);
        assert_eq!(tree.node(2).unwrap().parent(), Some(3));
        assert_eq!(tree.node(0).unwrap().parent(), Some(4));
        // C and B are now siblings.
        assert!(tree.exchange_subtrees(2, 1).is_err());
        assert!(tree.exchange_subtrees(4, 1).is_err());
    }

    #[test]
    fn set_age_does_not_change_version() {
        let mut tree = three_taxon_tree();
        let before = tree.topology_version();
        tree.set_age(3, 1.5).unwrap();
        assert_eq!(tree.topology_version(), before);
        assert!(tree.set_age(3, -1.0).is_err());
        tree.set_age(3, 2.5).unwrap();
        assert!(!tree.has_consistent_ages());
    }

    #[test]
    fn sampled_ancestor_has_one_child() {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A"));
        let sa = tree
            .add_sampled_ancestor(a, Taxon::new("F").with_age(1.0).unwrap())
            .unwrap();
        let b = tree.add_tip(Taxon::new("B"));
        tree.add_internal(sa, b, 2.0).unwrap();
        tree.validate().unwrap();
        assert!(tree.node(sa).unwrap().is_sampled_ancestor());
        assert_eq!(tree.speciation_ages(), vec![2.0]);
        assert!(tree.subtended_names(sa).contains("F"));
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A"));
        let b = tree.add_tip(Taxon::new("A"));
        tree.add_internal(a, b, 1.0).unwrap();
        assert!(tree.validate().is_err());
    }

    #[test]
    fn equality_ignores_version() {
        let tree = three_taxon_tree();
        let mut other = tree.clone();
        other.set_root(4).unwrap();
        assert_eq!(tree, other);
    }
}
