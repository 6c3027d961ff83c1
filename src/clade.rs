//! Clades: unordered sets of taxon names.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::taxon::Taxon;

/// An unordered set of taxon names.
///
/// Equality and hashing only look at the name set. A clade may additionally
/// record how many of its members are missing from the tree; birth-death
/// processes account for those unsampled species.
///
/// # Examples
///
/// ```
/// use phylodag::Clade;
///
/// let a = Clade::new(["A", "B", "C"]).unwrap();
/// let b = Clade::new(["C", "A", "B"]).unwrap();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clade {
    names: BTreeSet<String>,
    #[serde(default)]
    num_missing: usize,
}

impl Clade {
    /// Creates a clade from taxon names.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` if the set is empty or a name
    /// occurs twice.
    pub fn new<I, S>(names: I) -> Result<Self, ModelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.into();
            if !set.insert(name.clone()) {
                return Err(ModelError::InvalidParameter {
                    name: "clade".to_string(),
                    reason: format!("taxon '{name}' occurs more than once"),
                });
            }
        }
        if set.is_empty() {
            return Err(ModelError::InvalidParameter {
                name: "clade".to_string(),
                reason: "a clade needs at least one taxon".to_string(),
            });
        }
        Ok(Self {
            names: set,
            num_missing: 0,
        })
    }

    /// Creates a clade from taxon records.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Clade::new`].
    pub fn from_taxa(taxa: &[Taxon]) -> Result<Self, ModelError> {
        Self::new(taxa.iter().map(Taxon::name))
    }

    /// Returns a copy recording `missing` unsampled members.
    #[must_use]
    pub fn with_missing(mut self, missing: usize) -> Self {
        self.num_missing = missing;
        self
    }

    /// Number of named members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false; clades are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Number of members absent from the tree.
    #[must_use]
    pub const fn num_missing(&self) -> usize {
        self.num_missing
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Member names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// The member name set.
    #[must_use]
    pub const fn name_set(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Stable content hash of the sorted member names.
    #[must_use]
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
        }
        hasher.finalize()
    }
}

impl PartialEq for Clade {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for Clade {}

impl Hash for Clade {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.names.hash(state);
    }
}

impl fmt::Display for Clade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.names().collect();
        write!(f, "{{{}}}", names.join(","))
    }
}
