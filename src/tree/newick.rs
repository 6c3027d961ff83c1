//! Newick rendering with branch lengths.

use std::fmt::Write as _;

use super::Tree;

impl Tree {
    /// Renders the tree as a Newick string with branch lengths.
    ///
    /// A sampled ancestor is written as a zero-length leaf beside its child,
    /// the usual convention for fossilized trees.
    #[must_use]
    pub fn to_newick(&self) -> String {
        let Some(root) = self.root else {
            return ";".to_string();
        };
        let mut out = String::new();
        self.write_node(root, &mut out);
        out.push(';');
        out
    }

    fn write_node(&self, index: usize, out: &mut String) {
        let node = &self.nodes[index];
        if !node.children.is_empty() {
            out.push('(');
            for (i, &child) in node.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                self.write_node(child, out);
            }
            if let (true, Some(name)) = (node.is_sampled_ancestor(), node.name()) {
                let _ = write!(out, ",{name}:0");
            }
            out.push(')');
        } else if let Some(name) = node.name() {
            out.push_str(name);
        }
        if node.parent.is_some() {
            let _ = write!(out, ":{}", self.branch_length(index));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::taxon::Taxon;
    use crate::tree::tests::three_taxon_tree;
    use crate::tree::Tree;

    #[test]
    fn renders_branch_lengths() {
        assert_eq!(three_taxon_tree().to_newick(), "((A:1,B:1):1,C:2);");
    }

    #[test]
    fn renders_single_tip_and_empty() {
        assert_eq!(Tree::single_tip(Taxon::new("A")).to_newick(), "A;");
        assert_eq!(Tree::new().to_newick(), ";");
    }

    #[test]
    fn renders_sampled_ancestor_as_zero_length_leaf() {
        let mut tree = Tree::new();
        let a = tree.add_tip(Taxon::new("A"));
        let sa = tree
            .add_sampled_ancestor(a, Taxon::new("F").with_age(0.5).unwrap())
            .unwrap();
        let b = tree.add_tip(Taxon::new("B"));
        tree.add_internal(sa, b, 1.5).unwrap();
        assert_eq!(tree.to_newick(), "((A:0.5,F:0):1,B:1.5);");
    }
}
