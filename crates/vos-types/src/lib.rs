//! Foundation types for the Virtual Object Store (VOS).
//!
//! This crate provides the identity and value types shared by every other VOS
//! crate. Nothing here touches storage; it only describes what gets stored and
//! how in-memory identity is represented.
//!
//! # Key Types
//!
//! - [`Slot`] — Stable string identifier for a persisted object or import
//! - [`KindTag`] — Allocation namespace a slot is drawn from
//! - [`Value`] — The value graph that gets marshaled into the store
//! - [`Remotable`] — Identity-bearing in-memory handle (pointer identity)
//! - [`WeakRemotable`] — Non-owning back-reference to a [`Remotable`]

pub mod error;
pub mod remotable;
pub mod slot;
pub mod value;

pub use error::TypeError;
pub use remotable::{Remotable, RemotableId, WeakRemotable};
pub use slot::{Allocator, KindTag, Slot, SlotType};
pub use value::Value;
