//! Small numeric helpers shared by the process densities.

use std::f64::consts::PI;

/// Natural log of the gamma function for positive arguments.
///
/// Shifts the argument above 10 by recurrence, then applies Stirling's series.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x <= 0.0 {
        return f64::INFINITY;
    }

    let mut x = x;
    let mut result = 0.0;
    while x < 10.0 {
        result -= x.ln();
        x += 1.0;
    }

    let inv_x = 1.0 / x;
    let inv_x2 = inv_x * inv_x;
    let correction = inv_x * (1.0 / 12.0 - inv_x2 * (1.0 / 360.0 - inv_x2 / 1260.0));

    result + (x - 0.5) * x.ln() - x + 0.5 * (2.0 * PI).ln() + correction
}

/// `ln(n!)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn ln_factorial(n: usize) -> f64 {
    if n < 2 {
        0.0
    } else if n < 32 {
        (2..=n).map(|k| (k as f64).ln()).sum()
    } else {
        ln_gamma(n as f64 + 1.0)
    }
}

/// `ln(n choose k)`; negative infinity when `k > n`.
#[must_use]
pub fn ln_choose(n: usize, k: usize) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k)
}

/// Number of lineage pairs among `k` lineages, `k choose 2`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pairs(k: usize) -> f64 {
    if k < 2 {
        0.0
    } else {
        (k * (k - 1) / 2) as f64
    }
}

/// Maps NaN to negative infinity; every other value passes through.
#[must_use]
pub fn finite_or_neg_inf(x: f64) -> f64 {
    if x.is_nan() {
        f64::NEG_INFINITY
    } else {
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ln_factorial_matches_direct_product() {
        assert!((ln_factorial(5) - 120f64.ln()).abs() < 1e-12);
        assert!((ln_factorial(40) - (1..=40).map(|k| f64::from(k).ln()).sum::<f64>()).abs() < 1e-8);
    }

    #[test]
    fn ln_choose_small_values() {
        assert!((ln_choose(5, 2) - 10f64.ln()).abs() < 1e-12);
        assert_eq!(ln_choose(4, 0), 0.0);
        assert_eq!(ln_choose(2, 3), f64::NEG_INFINITY);
    }

    #[test]
    fn pairs_counts() {
        assert_eq!(pairs(0), 0.0);
        assert_eq!(pairs(1), 0.0);
        assert_eq!(pairs(2), 1.0);
        assert_eq!(pairs(4), 6.0);
    }

    #[test]
    fn nan_maps_to_negative_infinity() {
        assert_eq!(finite_or_neg_inf(f64::NAN), f64::NEG_INFINITY);
        assert_eq!(finite_or_neg_inf(-2.5), -2.5);
    }
}
