//! Random sources for simulation and proposals.
//!
//! Every simulating or proposing call takes an explicit `&mut dyn RandomSource`.
//! Any `rand::RngCore` is a source; the default generator is ChaCha8.
//! A thread-local default instance exists for convenience and can be reseeded
//! for deterministic runs.

use std::cell::RefCell;

use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as _, Exp1, OpenClosed01, StandardNormal};

/// A pseudo-random source with the sampling helpers used by simulators and moves.
pub trait RandomSource: RngCore {
    /// Uniform draw from `[0, 1)`.
    fn uniform01(&mut self) -> f64 {
        self.gen::<f64>()
    }

    /// Uniform draw from `(0, 1]`, safe to take the logarithm of.
    fn uniform_open01(&mut self) -> f64 {
        OpenClosed01.sample(self)
    }

    /// Uniform index in `0..length`. Returns 0 for an empty range.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    #[allow(clippy::cast_precision_loss)]
    fn sample_index(&mut self, length: usize) -> usize {
        let index = (self.uniform01() * length as f64).floor() as usize;
        index.min(length.saturating_sub(1))
    }

    /// Exponential waiting time with the given rate.
    ///
    /// A non-positive rate never fires and yields positive infinity.
    fn sample_exponential(&mut self, rate: f64) -> f64 {
        if rate > 0.0 {
            let unit: f64 = Exp1.sample(self);
            unit / rate
        } else {
            f64::INFINITY
        }
    }

    /// Normal draw with the given mean and standard deviation.
    fn sample_normal(&mut self, mean: f64, sd: f64) -> f64 {
        let z: f64 = StandardNormal.sample(self);
        mean + sd * z
    }

    /// Bernoulli trial with success probability `p`.
    fn sample_event(&mut self, p: f64) -> bool {
        self.uniform01() < p
    }
}

impl<R: RngCore> RandomSource for R {}

/// Shuffles `items` in place.
pub fn shuffle<T>(rng: &mut dyn RandomSource, items: &mut [T]) {
    items.shuffle(rng);
}

/// Creates the default generator seeded deterministically.
#[must_use]
pub fn seeded_source(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

thread_local! {
    static DEFAULT_SOURCE: RefCell<ChaCha8Rng> = RefCell::new(ChaCha8Rng::from_entropy());
}

/// Runs `f` with this thread's default random source.
pub fn with_default_source<T>(f: impl FnOnce(&mut dyn RandomSource) -> T) -> T {
    DEFAULT_SOURCE.with(|source| f(&mut *source.borrow_mut()))
}

/// Replaces this thread's default random source with a seeded one.
pub fn reseed_default_source(seed: u64) {
    DEFAULT_SOURCE.with(|source| *source.borrow_mut() = seeded_source(seed));
}
