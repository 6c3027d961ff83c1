//! Run and simulation settings.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Settings of an MCMC run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct McmcConfig {
    /// Number of proposals per chain.
    pub generations: u64,
    /// A snapshot is taken every `sample_every` generations.
    pub sample_every: u64,
    /// Seed of the first chain; chain `i` uses `seed + i`. Entropy if absent.
    pub seed: Option<u64>,
    /// Number of independent chains.
    pub chains: usize,
    /// Capacity of the channel carrying snapshots out of chain threads.
    pub channel_capacity: usize,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            generations: 10_000,
            sample_every: 100,
            seed: None,
            chains: 1,
            channel_capacity: 256,
        }
    }
}

impl McmcConfig {
    /// Parses a config from JSON; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` for malformed JSON or invalid
    /// values.
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ModelError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate settings.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.generations == 0 {
            return Err(invalid("generations must be > 0"));
        }
        if self.sample_every == 0 {
            return Err(invalid("sample_every must be > 0"));
        }
        if self.chains == 0 {
            return Err(invalid("chains must be > 0"));
        }
        if self.channel_capacity == 0 {
            return Err(invalid("channel_capacity must be > 0"));
        }
        Ok(())
    }

    /// Seed of chain `index`, if the run is seeded.
    #[must_use]
    pub fn chain_seed(&self, index: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(index as u64))
    }
}

/// Limits of the tree simulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSimulationConfig {
    /// Attempts before a rejection sampler gives up.
    pub max_rejection_attempts: usize,
    /// Grid size used to invert node-age distributions numerically.
    pub time_grid_points: usize,
}

impl Default for TreeSimulationConfig {
    fn default() -> Self {
        Self {
            max_rejection_attempts: 10_000,
            time_grid_points: 1_000,
        }
    }
}

impl TreeSimulationConfig {
    /// Validate settings.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.max_rejection_attempts == 0 {
            return Err(invalid("max_rejection_attempts must be > 0"));
        }
        if self.time_grid_points < 2 {
            return Err(invalid("time_grid_points must be >= 2"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ModelError {
    ModelError::InvalidConfig {
        reason: reason.to_string(),
    }
}
