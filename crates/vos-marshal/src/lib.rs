//! Serialization boundary for the Virtual Object Store.
//!
//! Turns a [`Value`](vos_types::Value) graph into [`CapData`]: a JSON body in
//! which every remotable is replaced by an index into a slot table. Going
//! through a [`SlotConverter`] keeps identity intact in both directions --
//! serializing asks the converter for each remotable's slot, unserializing
//! asks it for the remotable behind each slot.

pub mod capdata;
pub mod error;
pub mod marshal;
pub mod tracker;

pub use capdata::CapData;
pub use error::{MarshalError, MarshalResult};
pub use marshal::{serialize, unserialize, SlotConverter};
pub use tracker::{swap_references, weak_key_index, weak_key_index_range, MarshalEnv, ReferenceTracker};
