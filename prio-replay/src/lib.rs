#![warn(missing_docs)]
//! A fixed-capacity replay buffer with prioritized sampling.
//!
//! Records are stored in a ring of fixed capacity ([`RingStore`]) and their
//! priorities in a sum tree over the same slots ([`PriorityIndex`]).
//! [`PrioritizedReplayBuffer`] composes the two: adding a record evicts the
//! oldest one when full, sampling draws records proportionally to priority
//! together with importance sampling weights, and priorities can be updated
//! after each learning step in `O(log n)`.
pub mod error;
pub mod priority_index;
pub mod replay_buffer;
pub mod ring_store;
pub mod shared;

mod base;
pub use base::{ExperienceBufferBase, ReplayBufferBase};
pub use error::{ReplayError, Result};
pub use priority_index::{PriorityIndex, WeightNormalizer};
pub use replay_buffer::{
    IwScheduler, PerConfig, PrioritizedReplayBuffer, ReplayBufferConfig, SampleBatch,
};
pub use ring_store::RingStore;
pub use shared::SharedReplayBuffer;
