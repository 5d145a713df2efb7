//! Slot registry for the Virtual Object Store.
//!
//! The registry is the single place where in-memory identity meets persisted
//! identity. It hands out fresh slots, binds them to
//! [`Remotable`](vos_types::Remotable)s, and answers lookups in both
//! directions.
//!
//! # Modules
//!
//! - [`config`] — Retention mode and registry configuration
//! - [`registry`] — The [`SlotRegistry`] itself
//! - [`reclaim`] — [`ReclaimQueue`], which turns "last handle dropped" into
//!   an explicit hint the managers drain
//! - [`error`] — Error types for registry operations

pub mod config;
pub mod error;
pub mod reclaim;
pub mod registry;

pub use config::{RegistryConfig, Retention};
pub use error::{SlotError, SlotResult};
pub use reclaim::ReclaimQueue;
pub use registry::SlotRegistry;
