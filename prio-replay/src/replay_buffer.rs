//! Prioritized experience replay.
//!
//! This module provides a replay buffer that stores records of arbitrary type
//! and samples them proportionally to their priorities.
//!
//! # Key Components
//!
//! - [`PrioritizedReplayBuffer`]: The buffer, composed of a ring store and a sum tree
//! - [`SampleBatch`]: Records, logical indices and importance weights of a draw
//! - [`ReplayBufferConfig`], [`PerConfig`]: Configuration, loadable from YAML
//! - [`IwScheduler`]: Annealing of the importance sampling exponent
//!
//! # Examples
//!
//! ```rust
//! use prio_replay::{
//!     PerConfig, PrioritizedReplayBuffer, ReplayBufferConfig, WeightNormalizer,
//! };
//!
//! # fn main() -> prio_replay::Result<()> {
//! let config = ReplayBufferConfig::default()
//!     .capacity(1000)
//!     .seed(42)
//!     .per_config(PerConfig::default()
//!         .alpha(0.6)
//!         .beta_0(0.4)
//!         .normalize(WeightNormalizer::Batch));
//!
//! let mut buffer = PrioritizedReplayBuffer::<(Vec<f32>, i64, f32)>::build(&config)?;
//! buffer.add((vec![0.0; 4], 1, 0.5));
//!
//! let blob = buffer.snapshot()?;
//! let mut restored = PrioritizedReplayBuffer::<(Vec<f32>, i64, f32)>::build(&config)?;
//! restored.restore(&blob)?;
//! assert_eq!(restored.get(0), buffer.get(0));
//! # Ok(())
//! # }
//! ```
mod base;
mod batch;
mod config;
mod snapshot;
pub use base::{IwScheduler, PrioritizedReplayBuffer};
pub use batch::SampleBatch;
pub use config::{PerConfig, ReplayBufferConfig};
