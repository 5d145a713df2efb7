use thiserror::Error;
use vos_types::TypeError;

/// Errors from marshaling values to and from capdata.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarshalError {
    /// The JSON body or envelope could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The body refers to a slot index the slot table does not have.
    #[error("slot index {index} out of range for {len} slots")]
    SlotIndexOutOfRange { index: usize, len: usize },

    /// The converter could not map between a slot and a value.
    #[error("slot conversion failed: {0}")]
    Conversion(String),

    /// The reference tracker could not record a change.
    #[error("reference tracking failed: {0}")]
    Tracking(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for marshal operations.
pub type MarshalResult<T> = Result<T, MarshalError>;
