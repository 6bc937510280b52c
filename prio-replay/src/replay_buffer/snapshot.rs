//! Binary snapshot of the buffer state.
//!
//! The blob is the `bincode` encoding of a fixed header
//! (`capacity`, `next_logical_index`, `alpha`, `epsilon`, `max_priority_seen`),
//! the live records in logical order and the leaf priorities in slot order.
//! Internal nodes of the sum tree are not stored; they are rebuilt from the
//! leaves on restore.
use crate::{
    error::{ReplayError, Result},
    priority_index::PriorityIndex,
    ring_store::RingStore,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::TryFrom;

/// Borrowed view of the state, used for encoding.
#[derive(Serialize)]
struct SnapshotRef<'a, R> {
    capacity: u64,
    next_logical_index: u64,
    alpha: f64,
    epsilon: f64,
    max_priority_seen: f64,
    records: Vec<&'a R>,
    priorities: &'a [f64],
}

/// Owned state, used for decoding.
#[derive(Deserialize)]
struct Snapshot<R> {
    capacity: u64,
    next_logical_index: u64,
    alpha: f64,
    epsilon: f64,
    max_priority_seen: f64,
    records: Vec<R>,
    priorities: Vec<f64>,
}

/// State restored from a blob.
pub(super) struct Restored<R> {
    pub ring: RingStore<R>,
    pub priority_index: PriorityIndex,
    pub alpha: f64,
    pub epsilon: f64,
}

pub(super) fn encode<R: Serialize>(
    ring: &RingStore<R>,
    priority_index: &PriorityIndex,
    alpha: f64,
    epsilon: f64,
) -> Result<Vec<u8>> {
    let snapshot = SnapshotRef {
        capacity: ring.capacity() as u64,
        next_logical_index: ring.next_logical_index(),
        alpha,
        epsilon,
        max_priority_seen: priority_index.default_priority(),
        records: ring.iter().map(|(_, r)| r).collect(),
        priorities: priority_index.leaves(),
    };
    Ok(bincode::serialize(&snapshot)?)
}

pub(super) fn decode<R: DeserializeOwned>(blob: &[u8]) -> Result<Restored<R>> {
    let snapshot: Snapshot<R> = bincode::deserialize(blob)?;

    let capacity = usize::try_from(snapshot.capacity).map_err(|_| {
        ReplayError::CorruptSnapshot(format!("capacity {} overflows", snapshot.capacity))
    })?;
    if snapshot.priorities.len() != capacity {
        return Err(ReplayError::CorruptSnapshot(format!(
            "expected {} priorities, found {}",
            capacity,
            snapshot.priorities.len()
        )));
    }
    for (name, v) in [("alpha", snapshot.alpha), ("epsilon", snapshot.epsilon)].iter() {
        if !v.is_finite() || *v < 0.0 {
            return Err(ReplayError::CorruptSnapshot(format!("invalid {} {}", name, v)));
        }
    }

    // Slots never written must not be sampled.
    let written = snapshot.next_logical_index.min(snapshot.capacity) as usize;
    if snapshot.priorities[written..].iter().any(|&p| p != 0.0) {
        return Err(ReplayError::CorruptSnapshot(
            "positive priority on an unwritten slot".to_string(),
        ));
    }

    let ring = RingStore::from_parts(capacity, snapshot.next_logical_index, snapshot.records)?;
    let priority_index =
        PriorityIndex::from_leaves(snapshot.priorities, snapshot.max_priority_seen)?;

    Ok(Restored {
        ring,
        priority_index,
        alpha: snapshot.alpha,
        epsilon: snapshot.epsilon,
    })
}
