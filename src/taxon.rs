//! Taxa: named leaves with a species label and a sampling age.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A sampled leaf.
///
/// Immutable once built. The species label defaults to the taxon name and the
/// sampling age defaults to the present (0).
///
/// # Examples
///
/// ```
/// use phylodag::Taxon;
///
/// let taxon: Taxon = "g1 sp1 0.5".parse().unwrap();
/// assert_eq!(taxon.species(), "sp1");
/// assert_eq!(taxon.age(), 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    name: String,
    species: String,
    age: f64,
}

impl Taxon {
    /// Creates an extant taxon that is its own species.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            species: name.clone(),
            name,
            age: 0.0,
        }
    }

    /// Returns a copy with the given species label.
    #[must_use]
    pub fn with_species(mut self, species: impl Into<String>) -> Self {
        self.species = species.into();
        self
    }

    /// Returns a copy sampled at the given age.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidParameter` if the age is negative or not finite.
    pub fn with_age(mut self, age: f64) -> Result<Self, ModelError> {
        if !age.is_finite() || age < 0.0 {
            return Err(ModelError::InvalidParameter {
                name: format!("age of taxon '{}'", self.name),
                reason: format!("{age} is not a non-negative finite number"),
            });
        }
        self.age = age;
        Ok(self)
    }

    /// Taxon name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Species label.
    #[must_use]
    pub fn species(&self) -> &str {
        &self.species
    }

    /// Sampling age (0 is the present).
    #[must_use]
    pub const fn age(&self) -> f64 {
        self.age
    }

    /// True when sampled at the present.
    #[must_use]
    pub fn is_extant(&self) -> bool {
        self.age == 0.0
    }

    /// Parses a whitespace-separated `name [species [age]]` record.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::MalformedState` for empty records, extra fields or
    /// a non-numeric age.
    pub fn parse_record(record: &str) -> Result<Self, ModelError> {
        let fields: Vec<&str> = record.split_whitespace().collect();
        let malformed = |reason: &str| ModelError::MalformedState {
            record: record.to_string(),
            reason: reason.to_string(),
        };
        match fields.as_slice() {
            [] => Err(malformed("empty taxon record")),
            [name] => Ok(Self::new(*name)),
            [name, species] => Ok(Self::new(*name).with_species(*species)),
            [name, species, age] => {
                let age: f64 = age
                    .parse()
                    .map_err(|_| malformed("age is not a number"))?;
                Self::new(*name).with_species(*species).with_age(age)
            }
            _ => Err(malformed("expected at most three fields")),
        }
    }
}

impl FromStr for Taxon {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_record(s)
    }
}

impl fmt::Display for Taxon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_taxon_is_own_species_and_extant() {
        let taxon = Taxon::new("A");
        assert_eq!(taxon.name(), "A");
        assert_eq!(taxon.species(), "A");
        assert!(taxon.is_extant());
    }

    #[test]
    fn negative_age_is_rejected() {
        assert!(Taxon::new("A").with_age(-1.0).is_err());
        assert!(Taxon::new("A").with_age(f64::NAN).is_err());
    }

    #[test]
    fn records_parse() {
        let taxon = Taxon::parse_record("g1 sp1").unwrap();
        assert_eq!(taxon.species(), "sp1");
        assert!(taxon.is_extant());

        let fossil = Taxon::parse_record("f1\tsp2\t3.25").unwrap();
        assert_eq!(fossil.age(), 3.25);
    }

    #[test]
    fn non_numeric_age_is_malformed() {
        let err = Taxon::parse_record("g1 sp1 old").unwrap_err();
        assert!(matches!(err, ModelError::MalformedState { .. }));
        assert!(Taxon::parse_record("   ").is_err());
        assert!(Taxon::parse_record("a b 1 extra").is_err());
    }
}
