//! Batch of sampled records.

/// Records drawn from a [`PrioritizedReplayBuffer`](super::PrioritizedReplayBuffer).
///
/// The `i`-th element of each vector belongs to the `i`-th draw. The same
/// record can appear more than once in a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch<R> {
    /// Sampled records.
    pub records: Vec<R>,

    /// Logical indices of the sampled records, to be passed back to
    /// [`update_priorities`](super::PrioritizedReplayBuffer::update_priorities).
    pub indices: Vec<u64>,

    /// Normalized importance sampling weights.
    pub weights: Vec<f64>,

    /// Sampling probabilities.
    pub probabilities: Vec<f64>,
}

impl<R> SampleBatch<R> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            indices: Vec::with_capacity(capacity),
            weights: Vec::with_capacity(capacity),
            probabilities: Vec::with_capacity(capacity),
        }
    }

    /// Number of draws in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the batch has no draws.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decomposes the batch into records, logical indices and weights.
    pub fn unpack(self) -> (Vec<R>, Vec<u64>, Vec<f64>) {
        (self.records, self.indices, self.weights)
    }
}
