use std::f64::consts::PI;

use crate::dag::{ensure_swapped, erase, swap_slot, DagNodeRef, NodeId, ParameterHandle, TypedDagNode, TypedNode};
use crate::distribution::Distribution;
use crate::error::GraphError;
use crate::rng::RandomSource;

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

fn normal_ln_density(x: f64, mean: f64, sd: f64) -> f64 {
    if sd <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let z = (x - mean) / sd;
    -0.5 * z * z - sd.ln() - LN_SQRT_2PI
}

/// Exponential distribution on the non-negative reals.
#[derive(Debug, Clone)]
pub struct Exponential {
    rate: TypedDagNode<f64>,
}

impl Exponential {
    #[must_use]
    pub fn new(rate: TypedDagNode<f64>) -> Self {
        Self { rate }
    }
}

impl Distribution<f64> for Exponential {
    fn compute_ln_probability(&self, value: &f64) -> f64 {
        let rate = *self.rate.value();
        if *value < 0.0 || rate <= 0.0 {
            return f64::NEG_INFINITY;
        }
        rate.ln() - rate * value
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<f64, GraphError> {
        Ok(rng.sample_exponential(*self.rate.value()))
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.rate)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let found = swap_slot("exponential", &mut self.rate, old, new)?;
        ensure_swapped("exponential", found, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<f64>> {
        Box::new(self.clone())
    }
}

/// Uniform distribution on `[lower, upper]`.
#[derive(Debug, Clone)]
pub struct UniformReal {
    lower: TypedDagNode<f64>,
    upper: TypedDagNode<f64>,
}

impl UniformReal {
    #[must_use]
    pub fn new(lower: TypedDagNode<f64>, upper: TypedDagNode<f64>) -> Self {
        Self { lower, upper }
    }
}

impl Distribution<f64> for UniformReal {
    fn compute_ln_probability(&self, value: &f64) -> f64 {
        let lower = *self.lower.value();
        let upper = *self.upper.value();
        if upper <= lower || *value < lower || *value > upper {
            return f64::NEG_INFINITY;
        }
        -(upper - lower).ln()
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<f64, GraphError> {
        let lower = *self.lower.value();
        let upper = *self.upper.value();
        Ok(lower + (upper - lower) * rng.uniform01())
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.lower), erase(&self.upper)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let lower = swap_slot("uniform", &mut self.lower, old, new)?;
        let upper = swap_slot("uniform", &mut self.upper, old, new)?;
        ensure_swapped("uniform", lower || upper, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<f64>> {
        Box::new(self.clone())
    }
}

/// Normal distribution with mean and standard deviation.
#[derive(Debug, Clone)]
pub struct Normal {
    mean: TypedDagNode<f64>,
    sd: TypedDagNode<f64>,
}

impl Normal {
    #[must_use]
    pub fn new(mean: TypedDagNode<f64>, sd: TypedDagNode<f64>) -> Self {
        Self { mean, sd }
    }
}

impl Distribution<f64> for Normal {
    fn compute_ln_probability(&self, value: &f64) -> f64 {
        normal_ln_density(*value, *self.mean.value(), *self.sd.value())
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<f64, GraphError> {
        Ok(rng.sample_normal(*self.mean.value(), *self.sd.value()))
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.mean), erase(&self.sd)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let mean = swap_slot("normal", &mut self.mean, old, new)?;
        let sd = swap_slot("normal", &mut self.sd, old, new)?;
        ensure_swapped("normal", mean || sd, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<f64>> {
        Box::new(self.clone())
    }
}

/// Log-normal distribution: `ln x` is normal with mean `mu` and sd `sigma`.
#[derive(Debug, Clone)]
pub struct LogNormal {
    mu: TypedDagNode<f64>,
    sigma: TypedDagNode<f64>,
}

impl LogNormal {
    #[must_use]
    pub fn new(mu: TypedDagNode<f64>, sigma: TypedDagNode<f64>) -> Self {
        Self { mu, sigma }
    }
}

impl Distribution<f64> for LogNormal {
    fn compute_ln_probability(&self, value: &f64) -> f64 {
        if *value <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let ln_x = value.ln();
        normal_ln_density(ln_x, *self.mu.value(), *self.sigma.value()) - ln_x
    }

    fn redraw_value(&self, rng: &mut dyn RandomSource) -> Result<f64, GraphError> {
        Ok(rng.sample_normal(*self.mu.value(), *self.sigma.value()).exp())
    }

    fn parameters(&self) -> Vec<DagNodeRef> {
        vec![erase(&self.mu), erase(&self.sigma)]
    }

    fn swap_parameter(&mut self, old: NodeId, new: &ParameterHandle) -> Result<(), GraphError> {
        let mu = swap_slot("lognormal", &mut self.mu, old, new)?;
        let sigma = swap_slot("lognormal", &mut self.sigma, old, new)?;
        ensure_swapped("lognormal", mu || sigma, old)
    }

    fn clone_box(&self) -> Box<dyn Distribution<f64>> {
        Box::new(self.clone())
    }
}
