//! Prioritized replay buffer.
//!
//! This module composes a [`RingStore`] and a [`PriorityIndex`] over the same
//! slot range. It supports:
//! - Insertion with eviction of the oldest record
//! - Priority-weighted sampling with importance sampling weights
//! - Priority updates after learning steps
//! - Snapshot and restore of the full state
mod iw_scheduler;
use super::{
    config::{check_beta, ReplayBufferConfig},
    snapshot, SampleBatch,
};
use crate::{
    error::{ReplayError, Result},
    priority_index::{PriorityIndex, WeightNormalizer},
    ring_store::RingStore,
    ExperienceBufferBase, ReplayBufferBase,
};
pub use iw_scheduler::IwScheduler;
use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};

/// A fixed-capacity replay buffer with prioritized sampling.
///
/// Every added record gets a logical index that is never reused. Newly added
/// records receive the largest priority seen so far, so that they are likely
/// to be sampled at least once before their actual priority is known.
///
/// # Type Parameters
///
/// * `R` - The type of records. Sampling returns clones of stored records.
///
/// # Examples
///
/// ```rust
/// use prio_replay::{PerConfig, PrioritizedReplayBuffer, ReplayBufferConfig};
///
/// # fn main() -> prio_replay::Result<()> {
/// let config = ReplayBufferConfig::default()
///     .capacity(100)
///     .per_config(PerConfig::default().alpha(0.6));
/// let mut buffer = PrioritizedReplayBuffer::<[f32; 4]>::build(&config)?;
///
/// for i in 0..10 {
///     buffer.add([i as f32; 4]);
/// }
///
/// let batch = buffer.sample(4, 0.4)?;
/// let td_errs = vec![0.5, -1.2, 0.1, 2.0];
/// buffer.update_priorities(&batch.indices, &td_errs)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PrioritizedReplayBuffer<R> {
    /// Storage of records.
    ring: RingStore<R>,

    /// Priorities over physical slots of `ring`.
    priority_index: PriorityIndex,

    /// Exponent for prioritization.
    alpha: f64,

    /// Floor added to updated priorities.
    epsilon: f64,

    /// Normalization of importance weights.
    normalize: WeightNormalizer,

    /// Scheduler of beta used by [`ReplayBufferBase::batch`].
    iw_scheduler: IwScheduler,

    /// Random number generator for sampling.
    rng: StdRng,
}

impl<R> PrioritizedReplayBuffer<R> {
    /// Creates an empty buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidCapacity`] if the capacity is zero and
    /// [`ReplayError::InvalidConfig`] if a prioritization parameter is out of range.
    pub fn build(config: &ReplayBufferConfig) -> Result<Self> {
        let per_config = &config.per_config;
        per_config.validate()?;
        let ring = RingStore::new(config.capacity)?;
        let priority_index = PriorityIndex::new(config.capacity)?;
        debug!(
            "Built replay buffer with capacity {}, alpha {}, epsilon {}",
            config.capacity, per_config.alpha, per_config.epsilon
        );

        Ok(Self {
            ring,
            priority_index,
            alpha: per_config.alpha,
            epsilon: per_config.epsilon,
            normalize: per_config.normalize,
            iw_scheduler: IwScheduler::new(
                per_config.beta_0,
                per_config.beta_final,
                per_config.n_opts_final,
            ),
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Adds a record and returns its logical index.
    ///
    /// The record gets the largest priority seen so far. When the buffer is
    /// full, the oldest record is dropped; its slot is reused by this record
    /// and its priority is overwritten in the same call.
    pub fn add(&mut self, record: R) -> u64 {
        let ix = self.ring.push(record);
        let slot = self.ring.physical_slot(ix);
        let p = self.priority_index.default_priority();
        self.priority_index.write(slot, p);
        ix
    }

    /// Updates priorities of the records at the given logical indices.
    ///
    /// The stored priority is `|p|^alpha + epsilon`. Indices of records that
    /// have been evicted (or never added) are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::LengthMismatch`] if the slices differ in length and
    /// [`ReplayError::InvalidPriority`] if a priority is NaN or infinite. No
    /// priority is updated when an error is returned.
    pub fn update_priorities(&mut self, indices: &[u64], priorities: &[f64]) -> Result<()> {
        if indices.len() != priorities.len() {
            return Err(ReplayError::LengthMismatch {
                indices: indices.len(),
                priorities: priorities.len(),
            });
        }

        let ps = priorities
            .iter()
            .map(|&p| {
                // `NaN.powf(0.0)` is 1, so the raw value is checked first.
                if !p.is_finite() {
                    return Err(ReplayError::InvalidPriority(p));
                }
                let q = p.abs().powf(self.alpha) + self.epsilon;
                if q.is_finite() {
                    Ok(q)
                } else {
                    Err(ReplayError::InvalidPriority(p))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        for (&ix, p) in indices.iter().zip(ps.into_iter()) {
            if self.ring.is_live(ix) {
                self.priority_index.write(self.ring.physical_slot(ix), p);
            } else {
                trace!("Skipped priority update of stale index {}", ix);
            }
        }

        Ok(())
    }

    /// Returns the record at `logical_index` if it is still in the buffer.
    pub fn get(&self, logical_index: u64) -> Option<&R> {
        self.ring.get(logical_index)
    }

    /// Returns the priority of the record at `logical_index`.
    pub fn priority(&self, logical_index: u64) -> Option<f64> {
        if self.ring.is_live(logical_index) {
            Some(
                self.priority_index
                    .get(self.ring.physical_slot(logical_index)),
            )
        } else {
            None
        }
    }

    /// Iterates over live records with their logical indices, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &R)> + '_ {
        self.ring.iter()
    }

    /// Number of records in the buffer.
    pub fn len(&self) -> usize {
        self.ring.size()
    }

    /// Returns `true` if no record has been added.
    pub fn is_empty(&self) -> bool {
        self.ring.size() == 0
    }

    /// Maximum number of records.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Sum of priorities of all records.
    pub fn total_priority(&self) -> f64 {
        self.priority_index.total()
    }

    /// The underlying ring store.
    pub fn ring(&self) -> &RingStore<R> {
        &self.ring
    }

    /// The underlying sum tree.
    pub fn priority_index(&self) -> &PriorityIndex {
        &self.priority_index
    }

    /// Exponent for prioritization.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Floor added to updated priorities.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Current value of the scheduled importance sampling exponent.
    pub fn beta(&self) -> f64 {
        self.iw_scheduler.beta()
    }
}

impl<R: Clone> PrioritizedReplayBuffer<R> {
    /// Samples `n` records with the random number generator owned by the buffer.
    ///
    /// See [`PrioritizedReplayBuffer::sample_with`].
    pub fn sample(&mut self, n: usize, beta: f64) -> Result<SampleBatch<R>> {
        Self::draw(
            &self.ring,
            &self.priority_index,
            self.normalize,
            n,
            beta,
            &mut self.rng,
        )
    }

    /// Samples `n` records proportionally to their priorities.
    ///
    /// The importance sampling weight of a draw with probability $P(i)$ is
    /// $w_i = \left(N^{-1}P(i)^{-1}\right)^{\beta}$, where $N$ is the number of
    /// records, normalized by the largest weight in the batch (or over all
    /// records with [`WeightNormalizer::All`]).
    ///
    /// # Errors
    ///
    /// * [`ReplayError::InvalidBatchSize`] if `n` is zero.
    /// * [`ReplayError::InvalidConfig`] if `beta` is outside `[0, 1]`.
    /// * [`ReplayError::InsufficientData`] if fewer than `n` records are stored.
    /// * [`ReplayError::EmptyIndex`] if all priorities are zero.
    pub fn sample_with<G: Rng + ?Sized>(
        &self,
        n: usize,
        beta: f64,
        rng: &mut G,
    ) -> Result<SampleBatch<R>> {
        Self::draw(&self.ring, &self.priority_index, self.normalize, n, beta, rng)
    }

    fn draw<G: Rng + ?Sized>(
        ring: &RingStore<R>,
        priority_index: &PriorityIndex,
        normalize: WeightNormalizer,
        n: usize,
        beta: f64,
        rng: &mut G,
    ) -> Result<SampleBatch<R>> {
        if n == 0 {
            return Err(ReplayError::InvalidBatchSize);
        }
        check_beta(beta)?;
        if ring.size() < n {
            return Err(ReplayError::InsufficientData {
                requested: n,
                available: ring.size(),
            });
        }

        let draws = priority_index.sample_batch(n, rng)?;
        let n_live = ring.size() as f64;
        let mut batch = SampleBatch::with_capacity(n);

        for (slot, _, prob) in draws {
            // Only slots holding a live record have positive priority.
            let ix = ring.logical_index(slot).ok_or(ReplayError::EmptyIndex)?;
            let record = ring.get(ix).ok_or(ReplayError::EmptyIndex)?;
            batch.records.push(record.clone());
            batch.indices.push(ix);
            batch.probabilities.push(prob);
            batch.weights.push((1.0 / (n_live * prob)).powf(beta));
        }

        let w_max = match normalize {
            WeightNormalizer::Batch => batch.weights.iter().cloned().fold(0.0, f64::max),
            WeightNormalizer::All => match priority_index.min_positive() {
                Some(p_min) => (1.0 / (n_live * p_min / priority_index.total())).powf(beta),
                None => return Err(ReplayError::EmptyIndex),
            },
        };
        batch.weights.iter_mut().for_each(|w| *w /= w_max);

        Ok(batch)
    }
}

impl<R: Serialize> PrioritizedReplayBuffer<R> {
    /// Serializes the full state of the buffer.
    ///
    /// The random number generator and the beta schedule are not included.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Snapshot`] if a record cannot be encoded.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let blob = snapshot::encode(&self.ring, &self.priority_index, self.alpha, self.epsilon)?;
        debug!(
            "Took snapshot of {} records ({} bytes)",
            self.ring.size(),
            blob.len()
        );
        Ok(blob)
    }
}

impl<R: DeserializeOwned> PrioritizedReplayBuffer<R> {
    /// Replaces the state of the buffer with the one stored in `blob`.
    ///
    /// Capacity, records, priorities, `alpha` and `epsilon` are taken from the
    /// blob. The random number generator and the beta schedule are kept.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Snapshot`] or [`ReplayError::CorruptSnapshot`] if
    /// the blob cannot be decoded. The buffer is not modified in that case.
    pub fn restore(&mut self, blob: &[u8]) -> Result<()> {
        let restored = snapshot::decode(blob)?;
        self.ring = restored.ring;
        self.priority_index = restored.priority_index;
        self.alpha = restored.alpha;
        self.epsilon = restored.epsilon;
        debug!(
            "Restored {} records, next logical index {}",
            self.ring.size(),
            self.ring.next_logical_index()
        );
        Ok(())
    }
}

impl<R> ExperienceBufferBase for PrioritizedReplayBuffer<R> {
    type Item = R;

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.add(tr);
        Ok(())
    }

    fn len(&self) -> usize {
        self.ring.size()
    }
}

impl<R: Clone> ReplayBufferBase for PrioritizedReplayBuffer<R> {
    type Config = ReplayBufferConfig;
    type Batch = SampleBatch<R>;

    fn build(config: &Self::Config) -> Result<Self> {
        Self::build(config)
    }

    /// Samples a batch with the scheduled beta.
    fn batch(&mut self, size: usize) -> Result<Self::Batch> {
        let beta = self.iw_scheduler.beta();
        trace!("Sampling {} records with beta {}", size, beta);
        self.sample(size, beta)
    }

    /// Updates priorities and counts one optimization step of the beta schedule.
    fn update_priority(&mut self, ixs: &[u64], td_errs: &[f64]) -> Result<()> {
        self.update_priorities(ixs, td_errs)?;
        self.iw_scheduler.add_n_opts();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay_buffer::PerConfig;
    use test_log::test;

    fn config(capacity: usize) -> ReplayBufferConfig {
        ReplayBufferConfig::default()
            .capacity(capacity)
            .seed(1)
            .per_config(PerConfig::default().alpha(1.0).epsilon(0.0))
    }

    #[test]
    fn test_build_invalid() {
        assert!(matches!(
            PrioritizedReplayBuffer::<u8>::build(&config(0)),
            Err(ReplayError::InvalidCapacity)
        ));
        let bad = config(4).per_config(PerConfig::default().beta_0(-0.5));
        assert!(matches!(
            PrioritizedReplayBuffer::<u8>::build(&bad),
            Err(ReplayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_add_uses_max_priority() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(4)).unwrap();
        let i0 = buffer.add("a");
        assert_eq!(buffer.priority(i0), Some(1.0));

        buffer.update_priorities(&[i0], &[3.0]).unwrap();
        let i1 = buffer.add("b");
        assert_eq!(buffer.priority(i1), Some(3.0));
        assert_eq!(buffer.total_priority(), 6.0);
    }

    #[test]
    fn test_eviction_overwrites_priority() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(2)).unwrap();
        let i0 = buffer.add(0);
        let i1 = buffer.add(1);
        buffer.update_priorities(&[i0, i1], &[0.5, 0.25]).unwrap();
        assert_eq!(buffer.total_priority(), 0.75);

        // Index 2 reuses the slot of index 0 with the default priority 1.0.
        let i2 = buffer.add(2);
        assert_eq!(buffer.priority(i0), None);
        assert_eq!(buffer.priority(i2), Some(1.0));
        assert_eq!(buffer.total_priority(), 1.25);
    }

    #[test]
    fn test_concrete_scenario() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(5)).unwrap();
        for i in 0..7 {
            assert_eq!(buffer.add(i * 100), i);
        }
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.get(0), None);
        assert_eq!(buffer.get(1), None);
        for i in 2..7 {
            assert_eq!(buffer.get(i), Some(&(i * 100)));
        }

        buffer
            .update_priorities(&[2, 3, 4, 5, 6], &[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        let index = buffer.priority_index();
        assert_eq!(index.total(), 15.0);

        // Slots 0..5 hold indices 5, 6, 2, 3, 4 with priorities 4, 5, 1, 2, 3,
        // so the last cumulative interval [12, 15) belongs to slot 4.
        let ring = buffer.ring();
        assert_eq!(index.sample_one(14.9).unwrap(), ring.physical_slot(4));
        // Index 6, the highest priority, owns [4, 9).
        assert_eq!(index.sample_one(4.0).unwrap(), ring.physical_slot(6));
        assert_eq!(index.sample_one(8.99).unwrap(), ring.physical_slot(6));
    }

    #[test]
    fn test_length_mismatch_leaves_priorities() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(8)).unwrap();
        for i in 0..5 {
            buffer.add(i);
        }
        buffer.update_priorities(&[0, 1], &[2.0, 3.0]).unwrap();
        let total = buffer.total_priority();

        let res = buffer.update_priorities(&[2, 3, 4], &[5.0, 6.0]);
        assert!(matches!(
            res,
            Err(ReplayError::LengthMismatch {
                indices: 3,
                priorities: 2
            })
        ));
        assert_eq!(buffer.total_priority(), total);
    }

    #[test]
    fn test_invalid_priority_is_all_or_nothing() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(4)).unwrap();
        for i in 0..4 {
            buffer.add(i);
        }
        let res = buffer.update_priorities(&[0, 1], &[2.0, f64::NAN]);
        assert!(matches!(res, Err(ReplayError::InvalidPriority(_))));
        assert_eq!(buffer.priority(0), Some(1.0));
        assert_eq!(buffer.total_priority(), 4.0);
    }

    #[test]
    fn test_non_finite_priority_with_zero_alpha() {
        let per_config = PerConfig::default().alpha(0.0).epsilon(1e-6);
        let mut buffer = PrioritizedReplayBuffer::build(&config(4).per_config(per_config)).unwrap();
        for i in 0..4 {
            buffer.add(i);
        }
        buffer.update_priorities(&[2], &[0.3]).unwrap();
        let before = (0..4).map(|ix| buffer.priority(ix)).collect::<Vec<_>>();
        let total = buffer.total_priority();

        for &bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY].iter() {
            let res = buffer.update_priorities(&[0, 1], &[0.5, bad]);
            assert!(matches!(res, Err(ReplayError::InvalidPriority(_))));
            assert_eq!(buffer.total_priority(), total);
            assert_eq!((0..4).map(|ix| buffer.priority(ix)).collect::<Vec<_>>(), before);
        }
    }

    #[test]
    fn test_priority_overflow_after_transform() {
        let per_config = PerConfig::default().alpha(2.0).epsilon(0.0);
        let mut buffer = PrioritizedReplayBuffer::build(&config(4).per_config(per_config)).unwrap();
        for i in 0..4 {
            buffer.add(i);
        }
        let res = buffer.update_priorities(&[0, 1], &[0.5, 1e300]);
        assert!(matches!(res, Err(ReplayError::InvalidPriority(p)) if p == 1e300));
        assert_eq!(buffer.priority(0), Some(1.0));
        assert_eq!(buffer.total_priority(), 4.0);
    }

    #[test]
    fn test_stale_index_skipped() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(2)).unwrap();
        for i in 0..3 {
            buffer.add(i);
        }
        // Index 0 was evicted; its slot now holds index 2.
        buffer.update_priorities(&[0, 1], &[9.0, 2.0]).unwrap();
        assert_eq!(buffer.priority(2), Some(1.0));
        assert_eq!(buffer.priority(1), Some(2.0));
        assert_eq!(buffer.total_priority(), 3.0);
    }

    #[test]
    fn test_priority_transform() {
        let config = config(4).per_config(PerConfig::default().alpha(0.5).epsilon(0.01));
        let mut buffer = PrioritizedReplayBuffer::build(&config).unwrap();
        let ix = buffer.add(());
        buffer.update_priorities(&[ix], &[-4.0]).unwrap();
        let p = buffer.priority(ix).unwrap();
        assert!((p - 2.01).abs() < 1e-12);
    }

    #[test]
    fn test_sample_errors() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(4)).unwrap();
        assert!(matches!(
            buffer.sample(0, 0.5),
            Err(ReplayError::InvalidBatchSize)
        ));
        assert!(matches!(
            buffer.sample(1, 0.5),
            Err(ReplayError::InsufficientData {
                requested: 1,
                available: 0
            })
        ));

        buffer.add(1);
        buffer.add(2);
        assert!(matches!(
            buffer.sample(3, 0.5),
            Err(ReplayError::InsufficientData {
                requested: 3,
                available: 2
            })
        ));
        assert!(matches!(
            buffer.sample(2, 1.5),
            Err(ReplayError::InvalidConfig(_))
        ));

        // Zero priorities are possible with epsilon = 0.
        buffer.update_priorities(&[0, 1], &[0.0, 0.0]).unwrap();
        assert!(matches!(buffer.sample(2, 0.5), Err(ReplayError::EmptyIndex)));
    }

    #[test]
    fn test_importance_weights_full_correction() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(16)).unwrap();
        for i in 0..16 {
            buffer.add(i);
        }
        let ixs = (0..16).collect::<Vec<u64>>();
        let ps = (0..16).map(|i| 0.5 + i as f64).collect::<Vec<_>>();
        buffer.update_priorities(&ixs, &ps).unwrap();

        let batch = buffer.sample(8, 1.0).unwrap();
        assert_eq!(batch.len(), 8);
        let n = buffer.len() as f64;
        let w_max = batch.weights.iter().cloned().fold(0.0, f64::max);
        assert_eq!(w_max, 1.0);

        let c = batch.weights[0] * batch.probabilities[0] * n;
        for (w, p) in batch.weights.iter().zip(batch.probabilities.iter()) {
            assert!((w * p * n - c).abs() < 1e-12);
        }

        for (ix, record) in batch.indices.iter().zip(batch.records.iter()) {
            assert_eq!(*ix as i32, *record);
        }
    }

    #[test]
    fn test_importance_weights_no_correction() {
        let mut buffer = PrioritizedReplayBuffer::build(&config(8)).unwrap();
        for i in 0..8 {
            buffer.add(i);
        }
        buffer
            .update_priorities(&[0, 1, 2], &[5.0, 0.1, 3.0])
            .unwrap();
        let batch = buffer.sample(4, 0.0).unwrap();
        assert!(batch.weights.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_weight_normalizer_all() {
        let per_config = PerConfig::default()
            .alpha(1.0)
            .epsilon(0.0)
            .normalize(WeightNormalizer::All);
        let config = config(4).per_config(per_config);
        let mut buffer = PrioritizedReplayBuffer::build(&config).unwrap();
        for i in 0..4 {
            buffer.add(i);
        }
        buffer
            .update_priorities(&[0, 1, 2, 3], &[1.0, 2.0, 4.0, 8.0])
            .unwrap();

        // The largest possible weight belongs to index 0, p = 1 / 15.
        let batch = buffer.sample(1, 1.0).unwrap();
        let expected = 1.0 / (batch.probabilities[0] * 15.0);
        assert!((batch.weights[0] - expected).abs() < 1e-12);
        assert!(batch.weights[0] <= 1.0);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let mut b1 = PrioritizedReplayBuffer::build(&config(32)).unwrap();
        let mut b2 = PrioritizedReplayBuffer::build(&config(32)).unwrap();
        for i in 0..40 {
            b1.add(i);
            b2.add(i);
        }
        let ps = (8..40).map(|i| (i % 7) as f64 + 0.5).collect::<Vec<_>>();
        let ixs = (8..40).collect::<Vec<u64>>();
        b1.update_priorities(&ixs, &ps).unwrap();
        b2.update_priorities(&ixs, &ps).unwrap();

        for _ in 0..5 {
            assert_eq!(b1.sample(8, 0.6).unwrap(), b2.sample(8, 0.6).unwrap());
        }
    }

    #[test]
    fn test_beta_schedule_through_trait() {
        let per_config = PerConfig::default()
            .beta_0(0.2)
            .beta_final(0.6)
            .n_opts_final(2);
        let mut buffer =
            <PrioritizedReplayBuffer<u8> as ReplayBufferBase>::build(&config(4).per_config(per_config))
                .unwrap();
        for i in 0..4 {
            ExperienceBufferBase::push(&mut buffer, i).unwrap();
        }
        assert_eq!(buffer.beta(), 0.2);

        let batch = buffer.batch(2).unwrap();
        buffer.update_priority(&batch.indices, &[1.0, 1.0]).unwrap();
        assert!((buffer.beta() - 0.4).abs() < 1e-12);
        buffer.update_priority(&[], &[]).unwrap();
        assert_eq!(buffer.beta(), 0.6);
    }
}
