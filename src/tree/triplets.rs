//! Rooted triplets: the resolution a tree induces on three of its taxa.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Tree;

/// The rooted topology `((a, b), outgroup)`; the pair is stored sorted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RootedTriplet {
    pair: [String; 2],
    outgroup: String,
}

impl RootedTriplet {
    #[must_use]
    pub fn new(a: impl Into<String>, b: impl Into<String>, outgroup: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        let pair = if a <= b { [a, b] } else { [b, a] };
        Self {
            pair,
            outgroup: outgroup.into(),
        }
    }

    #[must_use]
    pub const fn pair(&self) -> &[String; 2] {
        &self.pair
    }

    #[must_use]
    pub fn outgroup(&self) -> &str {
        &self.outgroup
    }

    /// The three taxon names, sorted. Two triplets over the same taxa share
    /// this key whatever their resolution.
    #[must_use]
    pub fn taxa(&self) -> [&str; 3] {
        let mut names = [self.pair[0].as_str(), self.pair[1].as_str(), self.outgroup.as_str()];
        names.sort_unstable();
        names
    }
}

impl fmt::Display for RootedTriplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(({},{}),{})", self.pair[0], self.pair[1], self.outgroup)
    }
}

impl Tree {
    /// Resolution of three named taxa and the length of the internal branch
    /// separating the pair's MRCA from the MRCA of all three.
    ///
    /// Returns `None` if a name is missing or two names coincide.
    #[must_use]
    pub fn rooted_triplet(&self, a: &str, b: &str, c: &str) -> Option<(RootedTriplet, f64)> {
        if a == b || b == c || a == c {
            return None;
        }
        let ab = self.mrca_of(a, b)?;
        let ac = self.mrca_of(a, c)?;
        let bc = self.mrca_of(b, c)?;
        let (pair_mrca, top, triplet) = if ab != ac && ac == bc {
            (ab, ac, RootedTriplet::new(a, b, c))
        } else if ac != ab && ab == bc {
            (ac, ab, RootedTriplet::new(a, c, b))
        } else if bc != ab && ab == ac {
            (bc, ab, RootedTriplet::new(b, c, a))
        } else {
            return None;
        };
        Some((triplet, self.nodes[top].age - self.nodes[pair_mrca].age))
    }

    /// Every rooted triplet over the tree's tips, in name order.
    #[must_use]
    pub fn rooted_triplets(&self) -> Vec<RootedTriplet> {
        let mut names: Vec<&str> = self.tips().filter_map(|n| n.name()).collect();
        names.sort_unstable();
        let mut triplets = Vec::new();
        for i in 0..names.len() {
            for j in i + 1..names.len() {
                for k in j + 1..names.len() {
                    if let Some((triplet, _)) = self.rooted_triplet(names[i], names[j], names[k]) {
                        triplets.push(triplet);
                    }
                }
            }
        }
        triplets
    }
}
