//! Ordered key-value substrate for the Virtual Object Store.
//!
//! Both managers persist everything through the [`KvStore`] trait: a plain
//! string-to-string map with one ordered range primitive, `get_after`. The
//! store never interprets keys or values.
//!
//! # Storage Backends
//!
//! - [`InMemoryKvStore`] -- `HashMap` plus a lazily sorted key snapshot, for
//!   tests and embedding. Records an optional operation log.
//!
//! # Design Rules
//!
//! 1. Keys compare by ordinary byte-wise string ordering.
//! 2. `get_after` ranges are `start`-inclusive and `end`-exclusive.
//! 3. A sorted snapshot is never served across an insert or delete.
//! 4. Repeating the previous `prior_key` resumes instead of rescanning.
//! 5. All lock failures are propagated, never silently ignored.

pub mod error;
pub mod log;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use log::{StoreOp, StoreStats};
pub use memory::InMemoryKvStore;
pub use traits::{check_range, KvStore, ScanCursor};
