use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid slot {slot:?}: {reason}")]
    InvalidSlot { slot: String, reason: String },

    #[error("reclaim hook already registered for remotable {0}")]
    HookAlreadyRegistered(u64),

    #[error("expected {expected}, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}
