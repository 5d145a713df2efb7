//! Virtual object manager for the Virtual Object Store.
//!
//! A virtual object is a record in the store plus, while anyone holds it,
//! an in-memory representative. Behavior comes from its *kind*: an
//! initializer that fixes the object's fields and a table of named methods
//! that read and write them.
//!
//! # Memory model
//!
//! Representatives carry identity only. Object state lives in a bounded LRU
//! table of resident states; touching an object that is not resident reads
//! its record back, evicting the least recently used state first and
//! writing it back if it changed. Dropping the last handle to a
//! representative does not delete anything: it queues a liveness hint, and
//! [`VirtualObjectManager::collect_garbage`] later deletes only records that
//! no representative, no persisted record, and no export still reaches.
//!
//! # Modules
//!
//! - [`kind`] — [`KindDefinition`] and [`KindHandle`]
//! - [`object`] — The [`VirtualObject`] representative handle
//! - [`state`] — [`StateView`], the field accessor given to methods
//! - [`manager`] — The [`VirtualObjectManager`]
//! - [`status`] — [`ExportStatus`]
//! - [`config`] — [`VomConfig`]
//! - [`error`] — Error types

mod cache;
pub mod config;
pub mod error;
pub mod kind;
pub mod manager;
pub mod object;
pub mod state;
pub mod status;

pub use cache::CacheStats;
pub use config::VomConfig;
pub use error::{VomError, VomResult};
pub use kind::{KindDefinition, KindHandle};
pub use manager::VirtualObjectManager;
pub use object::VirtualObject;
pub use state::StateView;
pub use status::ExportStatus;
