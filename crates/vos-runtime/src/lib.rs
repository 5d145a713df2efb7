//! # vos-runtime
//!
//! Wires a [`KvStore`](vos_store::KvStore), a
//! [`SlotRegistry`](vos_slots::SlotRegistry), the virtual object manager and
//! the collection manager into one [`Runtime`]. The runtime is the slot
//! converter both managers marshal through: virtual instances resolve to
//! their representatives, collection slots to their collections, and
//! everything else to ordinary exports or imported presences.
//!
//! ```ignore
//! let rt = Runtime::new(RuntimeConfig::default())?;
//! let index = rt.collections().make_map_store("index")?;
//! index.init("answer", 42i64)?;
//! ```

pub mod config;
pub mod error;
pub mod runtime;

pub use config::{RuntimeConfig, StoreConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use runtime::Runtime;
