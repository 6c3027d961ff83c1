//! Clade containment, monophyly and MRCA queries.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::Tree;
use crate::clade::Clade;

/// Per-tree cache of MRCA lookups, keyed by clade fingerprint and
/// invalidated by the tree's topology version.
#[derive(Debug, Clone, Default)]
pub(crate) struct MrcaCache {
    entries: RefCell<HashMap<blake3::Hash, (u64, Option<usize>)>>,
}

impl MrcaCache {
    fn get(&self, key: &blake3::Hash, version: u64) -> Option<Option<usize>> {
        self.entries
            .borrow()
            .get(key)
            .filter(|(cached_version, _)| *cached_version == version)
            .map(|(_, index)| *index)
    }

    fn insert(&self, key: blake3::Hash, version: u64, index: Option<usize>) {
        self.entries.borrow_mut().insert(key, (version, index));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Per-node tallies for one clade: clade members below the node and all
/// sampled taxa below the node.
struct CladeCounts {
    members: Vec<usize>,
    sizes: Vec<usize>,
}

impl Tree {
    fn clade_counts(&self, clade: &Clade) -> CladeCounts {
        let n = self.nodes.len();
        let mut members = vec![0; n];
        let mut sizes = vec![0; n];
        for index in self.postorder() {
            let node = &self.nodes[index];
            let (mut m, mut s) = match node.name() {
                Some(name) => (usize::from(clade.contains(name)), 1),
                None => (0, 0),
            };
            for &child in &node.children {
                m += members[child];
                s += sizes[child];
            }
            members[index] = m;
            sizes[index] = s;
        }
        CladeCounts { members, sizes }
    }

    fn subtree_counts(&self, index: usize, clade: &Clade) -> (usize, usize) {
        let mut members = 0;
        let mut size = 0;
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            let Some(node) = self.nodes.get(i) else { continue };
            if let Some(name) = node.name() {
                size += 1;
                if clade.contains(name) {
                    members += 1;
                }
            }
            stack.extend_from_slice(&node.children);
        }
        (members, size)
    }

    /// True iff the taxa below `index` equal the clade (`strict`) or include
    /// it (not `strict`).
    #[must_use]
    pub fn contains_clade(&self, index: usize, clade: &Clade, strict: bool) -> bool {
        let (members, size) = self.subtree_counts(index, clade);
        members == clade.len() && (!strict || size == clade.len())
    }

    /// True iff some node subtends exactly the clade's taxa.
    #[must_use]
    pub fn is_monophyletic(&self, clade: &Clade) -> bool {
        self.mrca(clade)
            .is_some_and(|index| self.subtree_counts(index, clade).1 == clade.len())
    }

    /// True iff every clade is monophyletic.
    #[must_use]
    pub fn satisfies_constraints(&self, clades: &[Clade]) -> bool {
        clades.iter().all(|clade| self.is_monophyletic(clade))
    }

    /// Index of the tightest node subtending every member of the clade.
    ///
    /// Among the nodes containing the clade the one with the fewest sampled
    /// taxa wins; ties go to the lowest index. Returns `None` when a member is
    /// absent from the tree. Results are cached until the topology changes.
    #[must_use]
    pub fn mrca(&self, clade: &Clade) -> Option<usize> {
        let key = clade.fingerprint();
        if let Some(hit) = self.mrca_cache.get(&key, self.topology_version) {
            return hit;
        }
        let counts = self.clade_counts(clade);
        let mut best: Option<usize> = None;
        for index in 0..self.nodes.len() {
            if counts.members[index] != clade.len() {
                continue;
            }
            if best.map_or(true, |b| counts.sizes[index] < counts.sizes[b]) {
                best = Some(index);
            }
        }
        self.mrca_cache.insert(key, self.topology_version, best);
        best
    }

    /// Age of the clade's MRCA.
    #[must_use]
    pub fn tmrca(&self, clade: &Clade) -> Option<f64> {
        self.mrca(clade).map(|index| self.nodes[index].age)
    }

    /// MRCA of two taxa given by name.
    #[must_use]
    pub fn mrca_of(&self, a: &str, b: &str) -> Option<usize> {
        let a = self.index_of(a)?;
        let b = self.index_of(b)?;
        let mut path = HashSet::new();
        let mut current = Some(a);
        while let Some(i) = current {
            path.insert(i);
            current = self.nodes[i].parent;
        }
        let mut current = Some(b);
        while let Some(i) = current {
            if path.contains(&i) {
                return Some(i);
            }
            current = self.nodes[i].parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::clade::Clade;
    use crate::taxon::Taxon;
    use crate::tree::tests::three_taxon_tree;
    use crate::tree::Tree;

    fn clade(names: &[&str]) -> Clade {
        Clade::new(names.iter().copied()).unwrap()
    }

    #[test]
    fn strict_containment_needs_exact_set() {
        let tree = three_taxon_tree();
        assert!(tree.contains_clade(3, &clade(&["A", "B"]), true));
        assert!(!tree.contains_clade(4, &clade(&["A", "B"]), true));
        assert!(tree.contains_clade(4, &clade(&["A", "B"]), false));
        assert!(!tree.contains_clade(3, &clade(&["A", "C"]), false));
    }

    #[test]
    fn monophyly() {
        let tree = three_taxon_tree();
        assert!(tree.is_monophyletic(&clade(&["A", "B"])));
        assert!(!tree.is_monophyletic(&clade(&["A", "C"])));
        assert!(tree.is_monophyletic(&clade(&["A", "B", "C"])));
        assert!(tree.is_monophyletic(&clade(&["C"])));
        assert!(!tree.is_monophyletic(&clade(&["A", "Z"])));
    }

    #[test]
    fn mrca_is_tightest_enclosing_node() {
        let tree = three_taxon_tree();
        assert_eq!(tree.mrca(&clade(&["A", "B"])), Some(3));
        assert_eq!(tree.mrca(&clade(&["B", "C"])), Some(4));
        assert_eq!(tree.mrca(&clade(&["A"])), Some(0));
        assert_eq!(tree.mrca(&clade(&["A", "missing"])), None);
        assert_eq!(tree.tmrca(&clade(&["A", "B"])), Some(1.0));
    }

    #[test]
    fn mrca_cache_is_invalidated_by_topology_changes() {
        let mut tree = three_taxon_tree();
        let ab = clade(&["A", "B"]);
        assert_eq!(tree.mrca(&ab), Some(3));
        assert_eq!(tree.mrca(&ab), Some(3));
        assert_eq!(tree.mrca_cache.len(), 1);

        // Move C next to B: A and B now only meet at the root.
        tree.exchange_subtrees(0, 2).unwrap();
        assert_eq!(tree.mrca(&ab), Some(4));
        assert_eq!(tree.mrca(&clade(&["B", "C"])), Some(3));
    }

    #[test]
    fn mrca_of_pair() {
        let tree = three_taxon_tree();
        assert_eq!(tree.mrca_of("A", "B"), Some(3));
        assert_eq!(tree.mrca_of("A", "C"), Some(4));
        assert_eq!(tree.mrca_of("A", "A"), Some(0));
        assert_eq!(tree.mrca_of("A", "Z"), None);
    }

    #[test]
    fn sampled_ancestor_counts_as_member() {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A"));
        let sa = tree
            .add_sampled_ancestor(a, Taxon::new("F").with_age(0.5).unwrap())
            .unwrap();
        let b = tree.add_tip(Taxon::new("B"));
        tree.add_internal(sa, b, 1.0).unwrap();
        assert!(tree.is_monophyletic(&clade(&["A", "F"])));
        assert!(!tree.is_monophyletic(&clade(&["A", "B"])));
    }
}
