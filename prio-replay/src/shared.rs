//! Shared handle to a replay buffer.
//!
//! [`PrioritizedReplayBuffer`] has no internal synchronization. A
//! [`SharedReplayBuffer`] wraps it in `Arc<Mutex<_>>`, so that each operation
//! runs to completion before another handle can observe the sum tree.
use crate::{
    error::{ReplayError, Result},
    PrioritizedReplayBuffer, ReplayBufferConfig, SampleBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// A cloneable handle to a replay buffer shared between threads.
///
/// Cloning the handle does not clone the buffer.
#[derive(Debug)]
pub struct SharedReplayBuffer<R> {
    inner: Arc<Mutex<PrioritizedReplayBuffer<R>>>,
}

impl<R> Clone for SharedReplayBuffer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> From<PrioritizedReplayBuffer<R>> for SharedReplayBuffer<R> {
    fn from(buffer: PrioritizedReplayBuffer<R>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }
}

impl<R> SharedReplayBuffer<R> {
    /// Builds a buffer and wraps it.
    pub fn build(config: &ReplayBufferConfig) -> Result<Self> {
        Ok(PrioritizedReplayBuffer::build(config)?.into())
    }

    fn lock(&self) -> Result<MutexGuard<'_, PrioritizedReplayBuffer<R>>> {
        self.inner.lock().map_err(|_| ReplayError::PoisonedLock)
    }

    /// Runs `f` with exclusive access to the buffer.
    pub fn with_buffer<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PrioritizedReplayBuffer<R>) -> T,
    {
        let mut buffer = self.lock()?;
        Ok(f(&mut buffer))
    }

    /// See [`PrioritizedReplayBuffer::add`].
    pub fn add(&self, record: R) -> Result<u64> {
        Ok(self.lock()?.add(record))
    }

    /// See [`PrioritizedReplayBuffer::update_priorities`].
    pub fn update_priorities(&self, indices: &[u64], priorities: &[f64]) -> Result<()> {
        self.lock()?.update_priorities(indices, priorities)
    }

    /// Number of records in the buffer.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Returns `true` if no record has been added.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }
}

impl<R: Clone> SharedReplayBuffer<R> {
    /// See [`PrioritizedReplayBuffer::sample`].
    pub fn sample(&self, n: usize, beta: f64) -> Result<SampleBatch<R>> {
        self.lock()?.sample(n, beta)
    }
}

impl<R: Serialize> SharedReplayBuffer<R> {
    /// See [`PrioritizedReplayBuffer::snapshot`].
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        self.lock()?.snapshot()
    }
}

impl<R: DeserializeOwned> SharedReplayBuffer<R> {
    /// See [`PrioritizedReplayBuffer::restore`].
    pub fn restore(&self, blob: &[u8]) -> Result<()> {
        self.lock()?.restore(blob)
    }
}
