//! Fixed-capacity circular storage of records.
//!
//! Every pushed record gets a logical index from a monotonically increasing
//! counter. The record is stored in the physical slot `logical_index % capacity`,
//! so once the store is full each push silently drops the oldest record.
use crate::error::{ReplayError, Result};
use log::trace;

/// Circular storage addressed by logical indices.
///
/// A logical index `i` is live when it has been written and not yet
/// overwritten, i.e., `next_logical_index - capacity <= i < next_logical_index`.
#[derive(Debug, Clone)]
pub struct RingStore<R> {
    /// Maximum number of live records.
    capacity: usize,

    /// Physical storage. `None` until the slot is first written.
    slots: Vec<Option<R>>,

    /// Logical index of the next record to be written.
    next_logical_index: u64,

    /// Number of occupied slots.
    size: usize,
}

impl<R> RingStore<R> {
    /// Creates an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ReplayError::InvalidCapacity);
        }

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Ok(Self {
            capacity,
            slots,
            next_logical_index: 0,
            size: 0,
        })
    }

    /// Rebuilds a store from the live records in logical order.
    ///
    /// `records` must hold exactly `min(next_logical_index, capacity)` records,
    /// the oldest first.
    pub(crate) fn from_parts(
        capacity: usize,
        next_logical_index: u64,
        records: Vec<R>,
    ) -> Result<Self> {
        let mut store = Self::new(capacity)?;
        let expected = next_logical_index.min(capacity as u64) as usize;
        if records.len() != expected {
            return Err(ReplayError::CorruptSnapshot(format!(
                "expected {} records for next index {}, found {}",
                expected,
                next_logical_index,
                records.len()
            )));
        }

        let first = next_logical_index - expected as u64;
        for (i, record) in (first..).zip(records.into_iter()) {
            let slot = store.physical_slot(i);
            store.slots[slot] = Some(record);
        }
        store.next_logical_index = next_logical_index;
        store.size = expected;

        Ok(store)
    }

    /// Writes a record and returns its logical index.
    ///
    /// Once the store is full, the record overwrites the oldest one.
    pub fn push(&mut self, record: R) -> u64 {
        let ix = self.next_logical_index;
        let slot = self.physical_slot(ix);

        if self.slots[slot].replace(record).is_some() {
            trace!(
                "Evicted logical index {} from slot {}",
                ix - self.capacity as u64,
                slot
            );
        }

        self.next_logical_index += 1;
        self.size = (self.size + 1).min(self.capacity);
        ix
    }

    /// Returns the record at `logical_index` if it is still live.
    pub fn get(&self, logical_index: u64) -> Option<&R> {
        if !self.is_live(logical_index) {
            return None;
        }
        self.slots[self.physical_slot(logical_index)].as_ref()
    }

    /// Returns `true` if `logical_index` was written and has not been evicted.
    pub fn is_live(&self, logical_index: u64) -> bool {
        logical_index < self.next_logical_index && logical_index >= self.oldest_logical_index()
    }

    /// Physical slot of `logical_index`.
    ///
    /// The result is meaningless for indices that were never pushed; check
    /// [`RingStore::is_live`] first.
    #[inline]
    pub fn physical_slot(&self, logical_index: u64) -> usize {
        (logical_index % self.capacity as u64) as usize
    }

    /// Logical index of the live record stored in `slot`, if any.
    pub fn logical_index(&self, slot: usize) -> Option<u64> {
        if slot >= self.capacity {
            return None;
        }
        let capacity = self.capacity as u64;
        let oldest = self.oldest_logical_index();
        let offset = (slot as u64 + capacity - oldest % capacity) % capacity;
        let ix = oldest + offset;

        if ix < self.next_logical_index {
            Some(ix)
        } else {
            None
        }
    }

    /// Logical index of the oldest live record, or of the next record if empty.
    pub fn oldest_logical_index(&self) -> u64 {
        self.next_logical_index.saturating_sub(self.capacity as u64)
    }

    /// Logical index to be assigned to the next pushed record.
    pub fn next_logical_index(&self) -> u64 {
        self.next_logical_index
    }

    /// Number of live records.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Maximum number of live records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates over live records in logical order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &R)> + '_ {
        (self.oldest_logical_index()..self.next_logical_index)
            .filter_map(move |ix| self.get(ix).map(|r| (ix, r)))
    }
}
