//! Errors in the library.
use thiserror::Error;

/// Errors returned by the replay buffer and its components.
///
/// None of these errors indicate corruption of internal state: a call that
/// fails leaves the buffer exactly as it was before the call.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The buffer was constructed with zero capacity.
    #[error("Capacity must be positive")]
    InvalidCapacity,

    /// A priority was negative, NaN or infinite.
    #[error("Invalid priority: {0}")]
    InvalidPriority(f64),

    /// Sampling was attempted while the total priority is zero.
    #[error("Cannot sample from a priority index with zero total priority")]
    EmptyIndex,

    /// Fewer live records than the requested batch size.
    #[error("Requested {requested} samples but only {available} records are stored")]
    InsufficientData {
        /// Requested batch size.
        requested: usize,

        /// Number of live records.
        available: usize,
    },

    /// Indices and priorities of different lengths were given.
    #[error("Length mismatch: {indices} indices and {priorities} priorities")]
    LengthMismatch {
        /// Number of indices.
        indices: usize,

        /// Number of priorities.
        priorities: usize,
    },

    /// A batch of zero samples was requested.
    #[error("Batch size must be positive")]
    InvalidBatchSize,

    /// Out-of-range parameter in the buffer configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot blob could not be encoded or decoded.
    #[error("Snapshot codec error: {0}")]
    Snapshot(#[from] bincode::Error),

    /// Snapshot blob was decoded but its content is inconsistent.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// The lock of a shared buffer was poisoned by a panicking holder.
    #[error("Lock of the shared replay buffer is poisoned")]
    PoisonedLock,
}

/// Result type of the library.
pub type Result<T> = std::result::Result<T, ReplayError>;
