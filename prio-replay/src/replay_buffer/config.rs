//! Configuration of the prioritized replay buffer.
//!
//! This module provides configuration structures for the replay buffer, including:
//! - Basic buffer configuration (capacity, seed)
//! - Prioritization and importance weight parameters
//! - Loading and saving in YAML
use crate::{
    error::{ReplayError, Result as ReplayResult},
    priority_index::{WeightNormalizer, WeightNormalizer::Batch},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    default::Default,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration for prioritized sampling.
///
/// The priority stored for a record is `|p|^alpha + epsilon`, where `p` is the
/// value passed to
/// [`update_priorities`](super::PrioritizedReplayBuffer::update_priorities).
///
/// # Examples
///
/// ```rust
/// use prio_replay::{PerConfig, WeightNormalizer};
///
/// let config = PerConfig::default()
///     .alpha(0.6)
///     .epsilon(1e-5)
///     .beta_0(0.4)
///     .beta_final(1.0)
///     .n_opts_final(500_000)
///     .normalize(WeightNormalizer::Batch);
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PerConfig {
    /// Exponent for prioritization. A value of 0 results in uniform sampling.
    pub alpha: f64,

    /// Small positive floor added to every updated priority, so that no record
    /// ends up with zero sampling probability.
    pub epsilon: f64,

    /// Initial value of the importance sampling exponent.
    pub beta_0: f64,

    /// Final value of the importance sampling exponent. Typically set to 1.0
    /// to fully compensate for the non-uniform sampling.
    pub beta_final: f64,

    /// Number of optimization steps after which `beta` reaches its final value.
    pub n_opts_final: usize,

    /// Method for normalizing importance sampling weights.
    pub normalize: WeightNormalizer,
}

impl Default for PerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            epsilon: 1e-6,
            beta_0: 0.4,
            beta_final: 1.0,
            n_opts_final: 500_000,
            normalize: Batch,
        }
    }
}

impl PerConfig {
    /// Sets the prioritization exponent `alpha`.
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Sets the priority floor `epsilon`.
    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the initial importance sampling exponent `beta_0`.
    pub fn beta_0(mut self, beta_0: f64) -> Self {
        self.beta_0 = beta_0;
        self
    }

    /// Sets the final importance sampling exponent `beta_final`.
    pub fn beta_final(mut self, beta_final: f64) -> Self {
        self.beta_final = beta_final;
        self
    }

    /// Sets the number of optimization steps to reach the final beta value.
    pub fn n_opts_final(mut self, n_opts_final: usize) -> Self {
        self.n_opts_final = n_opts_final;
        self
    }

    /// Sets the method for normalizing importance weights.
    pub fn normalize(mut self, normalize: WeightNormalizer) -> Self {
        self.normalize = normalize;
        self
    }

    /// Checks that all parameters are in range.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] if `alpha` or `epsilon` is negative
    /// or not finite, or if a beta value is outside `[0, 1]`.
    pub fn validate(&self) -> ReplayResult<()> {
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(ReplayError::InvalidConfig(format!(
                    "{} must be finite and non-negative, got {}",
                    name, v
                )))
            }
        };
        non_negative("alpha", self.alpha)?;
        non_negative("epsilon", self.epsilon)?;
        check_beta(self.beta_0)?;
        check_beta(self.beta_final)
    }
}

/// Checks that an importance sampling exponent is in `[0, 1]`.
pub(crate) fn check_beta(beta: f64) -> ReplayResult<()> {
    if (0.0..=1.0).contains(&beta) {
        Ok(())
    } else {
        Err(ReplayError::InvalidConfig(format!(
            "beta must be in [0, 1], got {}",
            beta
        )))
    }
}

/// Configuration of [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
///
/// # Examples
///
/// ```rust
/// use prio_replay::{PerConfig, ReplayBufferConfig};
///
/// let config = ReplayBufferConfig::default()
///     .capacity(10000)
///     .seed(42)
///     .per_config(PerConfig::default().alpha(0.7));
/// ```
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ReplayBufferConfig {
    /// Maximum number of records in the buffer.
    /// When the buffer is full, new records replace the oldest ones.
    pub capacity: usize,

    /// Seed of the random number generator owned by the buffer.
    pub seed: u64,

    /// Prioritization parameters.
    pub per_config: PerConfig,
}

impl Default for ReplayBufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10000,
            seed: 42,
            per_config: PerConfig::default(),
        }
    }
}

impl ReplayBufferConfig {
    /// Sets the capacity of the replay buffer.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the random seed for sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the prioritization parameters.
    pub fn per_config(mut self, per_config: PerConfig) -> Self {
        self.per_config = per_config;
        self
    }

    /// Loads the configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves the configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
