use thiserror::Error;
use vos_collections::CollectionError;
use vos_marshal::MarshalError;
use vos_objects::VomError;
use vos_slots::SlotError;
use vos_store::StoreError;

/// Errors surfaced by the runtime facade.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Vom(#[from] VomError),
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
