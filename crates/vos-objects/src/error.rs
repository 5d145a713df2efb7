//! Error types for the virtual object manager.

use thiserror::Error;
use vos_marshal::MarshalError;
use vos_slots::SlotError;
use vos_store::StoreError;
use vos_types::{Slot, TypeError};

/// Errors that can occur during virtual object operations.
#[derive(Debug, Error)]
pub enum VomError {
    /// The field was not created by the kind's initializer.
    #[error("object {slot} has no field {field:?}")]
    UnknownField { slot: Slot, field: String },

    #[error("kind {kind:?} has no method {method:?}")]
    UnknownMethod { kind: String, method: String },

    /// No persisted record exists for the slot.
    #[error("no virtual object at {0}")]
    UnknownObject(Slot),

    /// The slot does not belong to any kind registered with this manager.
    #[error("slot {0} is not a virtual object of a known kind")]
    NotVirtual(Slot),

    /// The remotable has never been given a slot.
    #[error("{0} has no slot")]
    Unbound(String),

    /// A durable kind with this tag is already registered in this manager.
    #[error("durable kind {0:?} is already defined")]
    KindAlreadyDefined(String),

    /// The object's state is already borrowed by a running method.
    #[error("object {0} is busy")]
    Reentrant(Slot),

    /// A persisted record could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    /// Raised by kind code.
    #[error("{0}")]
    Method(String),

    /// The host that resolves slots has been dropped.
    #[error("virtual object manager environment is no longer available")]
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

/// Convenience type alias for virtual object operations.
pub type VomResult<T> = std::result::Result<T, VomError>;
