//! Error types for slot registry operations.

use thiserror::Error;
use vos_store::StoreError;
use vos_types::{KindTag, Slot, TypeError};

/// Errors that can occur during registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    /// The slot is already bound to a different live value.
    #[error("slot {slot} is already bound to another value")]
    AlreadyBound { slot: Slot },

    /// The value is already bound to a different slot.
    #[error("value is already bound to slot {existing}, cannot bind to {requested}")]
    ValueAlreadyBound { existing: Slot, requested: Slot },

    /// The kind tag allocates bare ids, not slots.
    #[error("kind tag {0} does not allocate slots")]
    NotSlotBearing(KindTag),

    /// A persisted allocation counter could not be parsed.
    #[error("corrupt allocation counter {name}: {value:?}")]
    CorruptCounter { name: String, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience type alias for registry operations.
pub type SlotResult<T> = std::result::Result<T, SlotError>;
