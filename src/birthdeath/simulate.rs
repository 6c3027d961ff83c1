//! Node ages of reconstructed birth-death trees.
//!
//! Conditioned on the number of sampled taxa and the start age, the
//! speciation ages of a reconstructed tree are independent draws from the
//! density proportional to `lambda(a) P1(a)` on `(0, start)`. The density is
//! tabulated on a grid and inverted by linear interpolation.

use super::numerics::ProcessRates;
use crate::error::GraphError;
use crate::rng::RandomSource;

#[derive(Debug, Clone)]
pub(crate) struct NodeAgeSampler {
    grid: Vec<f64>,
    cumulative: Vec<f64>,
    start_age: f64,
}

impl NodeAgeSampler {
    pub(crate) fn new(
        rates: &ProcessRates,
        sampling: f64,
        start_age: f64,
        points: usize,
    ) -> Result<Self, GraphError> {
        if !(start_age.is_finite() && start_age > 0.0) {
            return Err(GraphError::SimulationFailed {
                reason: format!("start age {start_age} is not a positive finite number"),
            });
        }
        let points = points.max(2);
        #[allow(clippy::cast_precision_loss)]
        let step = start_age / (points - 1) as f64;
        #[allow(clippy::cast_precision_loss)]
        let grid: Vec<f64> = (0..points).map(|i| step * i as f64).collect();
        let density: Vec<f64> = grid
            .iter()
            .map(|&age| {
                let d = rates.speciation.at(age) * rates.ln_p1(age, sampling).exp();
                if d.is_finite() {
                    d
                } else {
                    0.0
                }
            })
            .collect();
        let mut cumulative = Vec::with_capacity(points);
        cumulative.push(0.0);
        for i in 1..points {
            let area = 0.5 * (density[i - 1] + density[i]) * step;
            cumulative.push(cumulative[i - 1] + area);
        }
        let total = cumulative[points - 1];
        if !(total.is_finite() && total > 0.0) {
            return Err(GraphError::SimulationFailed {
                reason: "node-age density vanishes on the whole interval".to_string(),
            });
        }
        Ok(Self {
            grid,
            cumulative,
            start_age,
        })
    }

    pub(crate) fn sample(&self, rng: &mut dyn RandomSource) -> f64 {
        let total = self.cumulative[self.cumulative.len() - 1];
        let target = rng.uniform_open01() * total;
        let j = self
            .cumulative
            .partition_point(|&c| c < target)
            .clamp(1, self.grid.len() - 1);
        let (c0, c1) = (self.cumulative[j - 1], self.cumulative[j]);
        let (a0, a1) = (self.grid[j - 1], self.grid[j]);
        let age = if c1 > c0 {
            a0 + (a1 - a0) * (target - c0) / (c1 - c0)
        } else {
            a0
        };
        age.clamp(f64::MIN_POSITIVE, self.start_age * (1.0 - f64::EPSILON))
    }

    /// `count` ages, oldest first.
    pub(crate) fn sample_sorted(&self, count: usize, rng: &mut dyn RandomSource) -> Vec<f64> {
        let mut ages: Vec<f64> = (0..count).map(|_| self.sample(rng)).collect();
        ages.sort_by(|a, b| b.total_cmp(a));
        ages
    }
}
