//! Error types for collection operations.

use thiserror::Error;
use vos_marshal::MarshalError;
use vos_slots::SlotError;
use vos_store::StoreError;
use vos_types::{Slot, TypeError};

/// Errors that can occur during collection operations.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// `init` on a key that is already present.
    #[error("key {key} already present in collection {collection:?}")]
    KeyAlreadyExists { collection: String, key: String },

    /// `set` or `delete` on a key that is not present.
    #[error("key {key} not found in collection {collection:?}")]
    KeyNotFound { collection: String, key: String },

    /// The value cannot be used as a collection key.
    #[error("invalid collection key: {0}")]
    InvalidKey(String),

    /// The slot does not name a collection.
    #[error("slot {slot} is not a collection")]
    NotACollection { slot: Slot },

    /// A persisted entry or descriptor could not be decoded.
    #[error("corrupt collection record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// The host that resolves slots has been dropped.
    #[error("collection manager environment is no longer available")]
    EnvironmentGone,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience type alias for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;
