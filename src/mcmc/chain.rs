//! A single Metropolis-Hastings chain.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::moves::Move;
use crate::config::McmcConfig;
use crate::dag::affected_ln_probability_ratio;
use crate::error::{ModelError, PhyloResult};
use crate::model::Model;
use crate::rng::{seeded_source, RandomSource};
use crate::snapshot::MonitorSnapshot;

/// Acceptance counts of one move.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveStats {
    pub name: String,
    pub proposed: u64,
    pub accepted: u64,
}

impl MoveStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub chain: Option<usize>,
    pub generations: u64,
    pub ln_posterior: f64,
    pub moves: Vec<MoveStats>,
}

impl ChainSummary {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn acceptance_rate(&self) -> f64 {
        let proposed: u64 = self.moves.iter().map(|m| m.proposed).sum();
        let accepted: u64 = self.moves.iter().map(|m| m.accepted).sum();
        if proposed == 0 {
            0.0
        } else {
            accepted as f64 / proposed as f64
        }
    }
}

/// A chain over one model.
///
/// Each step picks a move with probability proportional to its weight, lets
/// it propose, and accepts with probability `min(1, exp(ratio + hastings))`
/// where the ratio is read from the touched node and everything it affects.
#[derive(Debug)]
pub struct Mcmc {
    model: Model,
    moves: Vec<Box<dyn Move>>,
    stats: Vec<MoveStats>,
    config: McmcConfig,
    rng: ChaCha8Rng,
    generation: u64,
    chain: Option<usize>,
}

impl Mcmc {
    /// Creates a chain; seeded from `config.seed` or from entropy.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` for an invalid config, no moves, a
    /// non-positive weight, or a move on a node outside the model.
    pub fn new(model: Model, moves: Vec<Box<dyn Move>>, config: McmcConfig) -> Result<Self, ModelError> {
        config.validate()?;
        if moves.is_empty() {
            return Err(ModelError::InvalidConfig {
                reason: "a chain needs at least one move".to_string(),
            });
        }
        for mv in &moves {
            let weight = mv.weight();
            if !(weight.is_finite() && weight > 0.0) {
                return Err(ModelError::InvalidConfig {
                    reason: format!("move '{}' has weight {weight}", mv.name()),
                });
            }
            if !model.contains(&mv.touched()) {
                return Err(ModelError::InvalidConfig {
                    reason: format!("move '{}' acts on a node outside the model", mv.name()),
                });
            }
        }
        let stats = moves
            .iter()
            .map(|m| MoveStats {
                name: m.name().to_string(),
                ..MoveStats::default()
            })
            .collect();
        let rng = config.seed.map_or_else(ChaCha8Rng::from_entropy, seeded_source);
        Ok(Self {
            model,
            moves,
            stats,
            config,
            rng,
            generation: 0,
            chain: None,
        })
    }

    /// Labels the chain's snapshots and summary with `index`.
    #[must_use]
    pub fn with_chain_index(mut self, index: usize) -> Self {
        self.chain = Some(index);
        self
    }

    #[must_use]
    pub const fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn move_stats(&self) -> &[MoveStats] {
        &self.stats
    }

    fn choose_move(&mut self) -> usize {
        let total: f64 = self.moves.iter().map(|m| m.weight()).sum();
        let mut target = self.rng.uniform01() * total;
        for (index, mv) in self.moves.iter().enumerate() {
            target -= mv.weight();
            if target < 0.0 {
                return index;
            }
        }
        self.moves.len() - 1
    }

    /// Runs one proposal and returns whether it was accepted.
    ///
    /// # Errors
    ///
    /// Propagates structural errors from the move or from `restore`.
    pub fn step(&mut self) -> PhyloResult<bool> {
        let index = self.choose_move();
        let mv = &mut self.moves[index];
        let ln_hastings = mv.propose(&mut self.rng)?;
        let ratio = affected_ln_probability_ratio(mv.touched().as_ref());
        let ln_alpha = ratio + ln_hastings;
        let accepted = if ln_alpha.is_nan() {
            false
        } else {
            ln_alpha >= 0.0 || self.rng.uniform_open01().ln() < ln_alpha
        };
        if accepted {
            mv.accept();
        } else {
            mv.reject()?;
        }
        log::trace!(
            "generation {}: {} {} (ln alpha {ln_alpha:.4})",
            self.generation,
            mv.name(),
            if accepted { "accepted" } else { "rejected" }
        );
        let stats = &mut self.stats[index];
        stats.proposed += 1;
        stats.accepted += u64::from(accepted);
        self.generation += 1;
        Ok(accepted)
    }

    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        let mut snapshot = self.model.snapshot(self.generation);
        snapshot.chain = self.chain;
        snapshot
    }

    /// Runs the configured number of generations, handing a snapshot to
    /// `monitor` at the start and every `sample_every` generations.
    ///
    /// # Errors
    ///
    /// Stops at the first structural error.
    pub fn run(&mut self, mut monitor: impl FnMut(MonitorSnapshot)) -> PhyloResult<ChainSummary> {
        log::debug!(
            "chain {:?} starting at generation {} for {} generations",
            self.chain,
            self.generation,
            self.config.generations
        );
        monitor(self.snapshot());
        for _ in 0..self.config.generations {
            self.step()?;
            if self.generation % self.config.sample_every == 0 {
                monitor(self.snapshot());
            }
        }
        let summary = ChainSummary {
            chain: self.chain,
            generations: self.generation,
            ln_posterior: self.model.ln_posterior(),
            moves: self.stats.clone(),
        };
        log::debug!(
            "chain {:?} finished: ln posterior {:.4}, acceptance {:.3}",
            self.chain,
            summary.ln_posterior,
            summary.acceptance_rate()
        );
        Ok(summary)
    }
}
