//! Piecewise-constant rates and mass-extinction events.
//!
//! Change times are ages, strictly increasing away from the present. With
//! `k` change times a rate has `k + 1` values: value 0 applies between the
//! present and the first change time, value `k` beyond the last one. An age
//! that falls exactly on a change time belongs to the younger segment.

use serde::{Deserialize, Serialize};

use crate::dag::{erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode};
use crate::error::{GraphError, ModelError};

/// A rate function of age that is constant between change times.
///
/// # Examples
///
/// ```
/// use phylodag::birthdeath::PiecewiseRate;
///
/// let rate = PiecewiseRate::new("speciation", vec![1.0, 2.0, 3.0], vec![2.0, 5.0]).unwrap();
/// assert_eq!(rate.index_of(2.0), 0);
/// assert_eq!(rate.index_of(2.0001), 1);
/// assert_eq!(rate.at(7.0), 3.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseRate {
    values: Vec<f64>,
    change_times: Vec<f64>,
}

impl PiecewiseRate {
    /// A rate without change times.
    #[must_use]
    pub fn constant(value: f64) -> Self {
        Self {
            values: vec![value],
            change_times: Vec::new(),
        }
    }

    /// Creates a piecewise rate.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::LengthMismatch` unless there is one more value
    /// than change times, `ModelError::UnsortedChangeTimes` if the change
    /// times are not strictly increasing non-negative numbers, and
    /// `ModelError::InvalidParameter` for negative or non-finite values.
    pub fn new(name: &str, values: Vec<f64>, change_times: Vec<f64>) -> Result<Self, ModelError> {
        if values.len() != change_times.len() + 1 {
            return Err(ModelError::LengthMismatch {
                name: name.to_string(),
                expected: change_times.len() + 1,
                actual: values.len(),
            });
        }
        let increasing = change_times.windows(2).all(|w| w[0] < w[1]);
        if !increasing || change_times.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ModelError::UnsortedChangeTimes { name: name.to_string() });
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(ModelError::InvalidParameter {
                name: name.to_string(),
                reason: format!("rate {bad} is not a non-negative finite number"),
            });
        }
        Ok(Self { values, change_times })
    }

    /// Segment index of `age`: the number of change times strictly younger
    /// than `age`.
    #[must_use]
    pub fn index_of(&self, age: f64) -> usize {
        self.change_times.partition_point(|&c| c < age)
    }

    /// Rate at `age`.
    #[must_use]
    pub fn at(&self, age: f64) -> f64 {
        self.values[self.index_of(age)]
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn change_times(&self) -> &[f64] {
        &self.change_times
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.change_times.is_empty()
    }
}

/// A rate parameter of a birth-death process, read from graph nodes.
#[derive(Debug, Clone)]
pub enum Rate {
    Constant(TypedDagNode<f64>),
    Episodic {
        values: TypedDagNode<Vec<f64>>,
        change_times: TypedDagNode<Vec<f64>>,
    },
}

impl Rate {
    #[must_use]
    pub fn constant(value: TypedDagNode<f64>) -> Self {
        Self::Constant(value)
    }

    #[must_use]
    pub fn episodic(values: TypedDagNode<Vec<f64>>, change_times: TypedDagNode<Vec<f64>>) -> Self {
        Self::Episodic { values, change_times }
    }

    /// Current values as a numeric rate function.
    ///
    /// # Errors
    ///
    /// Returns the validation error of [`PiecewiseRate::new`].
    pub fn snapshot(&self, name: &str) -> Result<PiecewiseRate, ModelError> {
        match self {
            Self::Constant(value) => PiecewiseRate::new(name, vec![*value.value()], Vec::new()),
            Self::Episodic { values, change_times } => {
                PiecewiseRate::new(name, values.value().clone(), change_times.value().clone())
            }
        }
    }

    pub(crate) fn parameters(&self) -> Vec<DagNodeRef> {
        match self {
            Self::Constant(value) => vec![erase(value)],
            Self::Episodic { values, change_times } => vec![erase(values), erase(change_times)],
        }
    }

    pub(crate) fn swap(&mut self, owner: &str, old: NodeId, new: &ParameterHandle) -> Result<bool, GraphError> {
        match self {
            Self::Constant(value) => swap_slot(owner, value, old, new),
            Self::Episodic { values, change_times } => {
                let a = swap_slot(owner, values, old, new)?;
                let b = swap_slot(owner, change_times, old, new)?;
                Ok(a || b)
            }
        }
    }
}

/// An instantaneous event at `age` that each lineage survives with
/// probability `survival`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassExtinction {
    pub age: f64,
    pub survival: f64,
}

/// Mass-extinction ages and survival probabilities read from graph nodes.
#[derive(Debug, Clone)]
pub struct MassExtinctions {
    ages: TypedDagNode<Vec<f64>>,
    survival: TypedDagNode<Vec<f64>>,
}

impl MassExtinctions {
    #[must_use]
    pub fn new(ages: TypedDagNode<Vec<f64>>, survival: TypedDagNode<Vec<f64>>) -> Self {
        Self { ages, survival }
    }

    /// Current events, validated.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::LengthMismatch` if the vectors differ in length,
    /// `ModelError::UnsortedChangeTimes` for unsorted or negative ages, and
    /// `ModelError::InvalidParameter` for a survival probability outside
    /// `(0, 1]`.
    pub fn snapshot(&self) -> Result<Vec<MassExtinction>, ModelError> {
        let ages = self.ages.value();
        let survival = self.survival.value();
        if ages.len() != survival.len() {
            return Err(ModelError::LengthMismatch {
                name: "mass extinction survival".to_string(),
                expected: ages.len(),
                actual: survival.len(),
            });
        }
        let increasing = ages.windows(2).all(|w| w[0] < w[1]);
        if !increasing || ages.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ModelError::UnsortedChangeTimes {
                name: "mass extinction ages".to_string(),
            });
        }
        if let Some(bad) = survival.iter().find(|p| !(**p > 0.0 && **p <= 1.0)) {
            return Err(ModelError::InvalidParameter {
                name: "mass extinction survival".to_string(),
                reason: format!("probability {bad} is outside (0, 1]"),
            });
        }
        Ok(ages
            .iter()
            .zip(survival.iter())
            .map(|(&age, &survival)| MassExtinction { age, survival })
            .collect())
    }

    pub(crate) fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.ages), erase(&self.survival)]
    }

    pub(crate) fn swap(&mut self, owner: &str, old: NodeId, new: &ParameterHandle) -> Result<bool, GraphError> {
        let a = swap_slot(owner, &mut self.ages, old, new)?;
        let b = swap_slot(owner, &mut self.survival, old, new)?;
        Ok(a || b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ConstantNode;

    #[test]
    fn boundary_belongs_to_younger_segment() {
        let rate = PiecewiseRate::new("lambda", vec![1.0, 2.0, 3.0], vec![2.0, 5.0]).unwrap();
        assert_eq!(rate.index_of(0.0), 0);
        assert_eq!(rate.index_of(2.0), 0);
        assert_eq!(rate.index_of(2.0001), 1);
        assert_eq!(rate.index_of(5.0), 1);
        assert_eq!(rate.index_of(5.5), 2);
        assert_eq!(rate.at(3.0), 2.0);
    }

    #[test]
    fn lengths_must_match() {
        let err = PiecewiseRate::new("lambda", vec![1.0, 2.0], vec![2.0, 5.0]).unwrap_err();
        assert!(matches!(err, ModelError::LengthMismatch { expected: 3, actual: 2, .. }));
    }

    #[test]
    fn change_times_must_increase() {
        let err = PiecewiseRate::new("mu", vec![1.0, 2.0, 3.0], vec![5.0, 2.0]).unwrap_err();
        assert!(matches!(err, ModelError::UnsortedChangeTimes { .. }));
        assert!(PiecewiseRate::new("mu", vec![1.0, 2.0], vec![-1.0]).is_err());
        assert!(PiecewiseRate::new("mu", vec![-1.0], Vec::new()).is_err());
    }

    #[test]
    fn rates_read_current_node_values() {
        let values = ConstantNode::new("values", vec![0.5, 1.5]);
        let times = ConstantNode::new("times", vec![3.0]);
        let rate = Rate::episodic(values, times);
        let snapshot = rate.snapshot("lambda").unwrap();
        assert_eq!(snapshot.at(1.0), 0.5);
        assert_eq!(snapshot.at(4.0), 1.5);
        assert_eq!(rate.parameters().len(), 2);
    }

    #[test]
    fn mass_extinctions_validate_probabilities() {
        let ok = MassExtinctions::new(ConstantNode::new("t", vec![1.0, 2.0]), ConstantNode::new("p", vec![0.5, 1.0]));
        assert_eq!(ok.snapshot().unwrap().len(), 2);
        let short = MassExtinctions::new(ConstantNode::new("t", vec![1.0, 2.0]), ConstantNode::new("p", vec![0.5]));
        assert!(matches!(short.snapshot(), Err(ModelError::LengthMismatch { .. })));
        let zero = MassExtinctions::new(ConstantNode::new("t", vec![1.0]), ConstantNode::new("p", vec![0.0]));
        assert!(matches!(zero.snapshot(), Err(ModelError::InvalidParameter { .. })));
    }
}
