/// Errors from key-value store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// A range query with `start > end`.
    #[error("invalid range: start {start:?} is after end {end:?}")]
    InvalidRange { start: String, end: String },

    /// The store lock was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),

    /// A stored value could not be decoded by a caller.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
