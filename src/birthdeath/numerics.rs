//! Survival probabilities and lineage densities of birth-death processes
//! with piecewise-constant rates, mass extinctions and sampling at the
//! present.
//!
//! All quantities are computed for a lineage alive at age `a` and followed
//! toward the present. Writing `r(a)` for the integral of `mu - lambda` from
//! `a` down to 0, with each event of survival probability `phi` (mass
//! extinctions and the final sampling) subtracting `ln phi`, the survival
//! probability is
//!
//! ```text
//! 1 / Ps(a) = 1 + integral of mu(s) e^{r(a, s)} ds + sum of (1 - phi) e^{r(a, event)}
//! ```
//!
//! and the probability of exactly one sampled descendant is
//! `P1(a) = Ps(a)^2 e^{r(a)}`.

use serde::{Deserialize, Serialize};

use super::rates::{MassExtinction, PiecewiseRate};

/// Numeric snapshot of a process' rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRates {
    pub speciation: PiecewiseRate,
    pub extinction: PiecewiseRate,
    pub mass_extinctions: Vec<MassExtinction>,
}

/// `ln Ps(a)` together with the integrated rate `r(a)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Survival {
    pub ln_survival: f64,
    pub rate_integral: f64,
}

impl ProcessRates {
    /// Constant speciation and extinction rates.
    #[must_use]
    pub fn constant(speciation: f64, extinction: f64) -> Self {
        Self {
            speciation: PiecewiseRate::constant(speciation),
            extinction: PiecewiseRate::constant(extinction),
            mass_extinctions: Vec::new(),
        }
    }

    fn event_survival(&self, age: f64) -> f64 {
        self.mass_extinctions
            .iter()
            .filter(|e| e.age == age)
            .map(|e| e.survival)
            .product()
    }

    /// Ages where a rate changes or an event happens, strictly between the
    /// present and `age`, oldest first and framed by `age` and 0.
    fn breakpoints(&self, age: f64) -> Vec<f64> {
        let mut interior: Vec<f64> = self
            .speciation
            .change_times()
            .iter()
            .chain(self.extinction.change_times())
            .copied()
            .chain(self.mass_extinctions.iter().map(|e| e.age))
            .filter(|&t| t > 0.0 && t < age)
            .collect();
        interior.sort_by(|a, b| b.total_cmp(a));
        interior.dedup();
        let mut points = Vec::with_capacity(interior.len() + 2);
        points.push(age);
        points.extend(interior);
        points.push(0.0);
        points
    }

    /// Survival of a lineage alive at `age` to a sample taken with
    /// probability `sampling` at the present.
    #[must_use]
    pub fn survival(&self, age: f64, sampling: f64) -> Survival {
        let mut rate_integral = 0.0;
        let mut extinction_integral = 0.0;
        let mut event_sum = 0.0;
        for segment in self.breakpoints(age).windows(2) {
            let (older, younger) = (segment[0], segment[1]);
            let length = older - younger;
            let lambda = self.speciation.at(older);
            let mu = self.extinction.at(older);
            let d = mu - lambda;
            let growth = if d.abs() < 1e-12 {
                length
            } else {
                (d * length).exp_m1() / d
            };
            extinction_integral += mu * f64::exp(rate_integral) * growth;
            rate_integral += d * length;

            let phi = if younger == 0.0 {
                sampling
            } else {
                self.event_survival(younger)
            };
            if phi != 1.0 {
                rate_integral -= phi.ln();
                event_sum += (1.0 - phi) * f64::exp(rate_integral);
            }
        }
        Survival {
            ln_survival: -(1.0 + extinction_integral + event_sum).ln(),
            rate_integral,
        }
    }

    /// `ln P1(age)`: log-probability that a lineage alive at `age` leaves
    /// exactly one sampled descendant.
    #[must_use]
    pub fn ln_p1(&self, age: f64, sampling: f64) -> f64 {
        let s = self.survival(age, sampling);
        2.0 * s.ln_survival + s.rate_integral
    }

    /// Log-probability of observing `n` sampled taxa from a process started
    /// at `start_age`, from one lineage (`mrca == false`) or from two
    /// lineages that both survive (`mrca == true`).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ln_probability_num_taxa(&self, n: usize, start_age: f64, sampling: f64, mrca: bool) -> f64 {
        let s = self.survival(start_age, sampling);
        let ln_ps = s.ln_survival;
        let rate = s.rate_integral;
        let e = (ln_ps + rate).exp();
        let ln_not_e = (-e).ln_1p();
        let n_f = n as f64;
        if mrca {
            if n < 2 {
                return 0.0;
            }
            (n_f - 1.0).ln() + 4.0 * ln_ps + 2.0 * rate + (n_f - 2.0) * ln_not_e
        } else {
            if n == 0 {
                return f64::NEG_INFINITY;
            }
            2.0 * ln_ps + rate + (n_f - 1.0) * ln_not_e
        }
    }

    /// Probability that a lineage alive at `age` has no descendant at the
    /// present under complete sampling.
    #[must_use]
    pub fn extinction_probability(&self, age: f64) -> f64 {
        let s = self.survival(age, 1.0);
        -f64::exp_m1(s.ln_survival + s.rate_integral)
    }

    /// `ln F(age)`: log-probability that a lineage born at `age` is missing
    /// from a tree started at `start_age`, relative to the whole process.
    #[must_use]
    pub fn ln_unsampled_fraction(&self, age: f64, start_age: f64) -> f64 {
        self.extinction_probability(age).ln() - self.extinction_probability(start_age).ln()
    }
}
