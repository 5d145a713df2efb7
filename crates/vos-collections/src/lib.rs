//! Persisted ordered maps and sets for the Virtual Object Store.
//!
//! Every collection is a namespace of store keys, `vc.<id>.<encodedKey>`.
//! Keys are encoded so that plain string order of the store keys equals the
//! logical order of the collection keys, which turns iteration into a walk
//! of the store's `get_after` primitive.
//!
//! # Architecture
//!
//! - [`CollectionManager`] creates collections and finds them again by slot.
//! - [`MapStore`] / [`SetStore`] are iterable, counted, and hold persisted
//!   references to everything they contain.
//! - [`WeakMapStore`] / [`WeakSetStore`] support lookups only; their keys are
//!   not counted as references.
//! - [`Entries`] walks a key range with its own cursor, so two iterations
//!   over one collection never disturb each other.
//!
//! # Modules
//!
//! - [`keys`] — Order-preserving key encoding
//! - [`descriptor`] — Variants and the persisted collection descriptor
//! - [`collection`] — Collection handles and their operations
//! - [`iter`] — Range iteration
//! - [`manager`] — The [`CollectionManager`]
//! - [`error`] — Error types

pub mod collection;
pub mod descriptor;
pub mod error;
pub mod iter;
pub mod keys;
pub mod manager;

pub use collection::{AnyCollection, MapStore, SetStore, WeakMapStore, WeakSetStore};
pub use descriptor::{CollectionDescriptor, CollectionVariant};
pub use error::{CollectionError, Result};
pub use iter::{Entries, KeyRange};
pub use manager::{CollectionKinds, CollectionManager};
