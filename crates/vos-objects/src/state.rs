//! Resident object state.
//!
//! State is kept in marshaled form, one [`CapData`] per field, exactly as it
//! is persisted. Reads unserialize on demand; writes serialize immediately
//! and adjust persisted reference counts, so the counts always describe the
//! newest state whether or not it has been written back yet.

use std::cell::RefCell;
use std::collections::BTreeMap;

use vos_marshal::{serialize, unserialize, CapData};
use vos_types::{Slot, Value};

use crate::error::{VomError, VomResult};
use crate::manager::VirtualObjectManager;

/// Field values of one object, plus whether they differ from the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct StateData {
    pub(crate) fields: BTreeMap<String, CapData>,
    pub(crate) dirty: bool,
}

/// Cache entry for one slot.
#[derive(Debug)]
pub(crate) struct InnerSelf {
    pub(crate) slot: Slot,
    pub(crate) state: RefCell<StateData>,
}

impl InnerSelf {
    pub(crate) fn new(slot: Slot, fields: BTreeMap<String, CapData>) -> Self {
        Self {
            slot,
            state: RefCell::new(StateData {
                fields,
                dirty: false,
            }),
        }
    }
}

/// Mutable access to one object's fields, handed to kind methods.
pub struct StateView<'a> {
    vom: &'a VirtualObjectManager,
    slot: Slot,
    state: &'a mut StateData,
}

impl<'a> StateView<'a> {
    pub(crate) fn new(vom: &'a VirtualObjectManager, slot: Slot, state: &'a mut StateData) -> Self {
        Self { vom, slot, state }
    }

    /// The slot of the object being operated on.
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.state.fields.keys().map(String::as_str)
    }

    fn unknown(&self, field: &str) -> VomError {
        VomError::UnknownField {
            slot: self.slot,
            field: field.to_string(),
        }
    }

    pub fn get(&self, field: &str) -> VomResult<Value> {
        let data = self
            .state
            .fields
            .get(field)
            .ok_or_else(|| self.unknown(field))?;
        let env = self.vom.env()?;
        Ok(unserialize(data, env.converter())?)
    }

    /// Replace a field's value. Only fields created at initialization exist.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> VomResult<()> {
        if !self.state.fields.contains_key(field) {
            return Err(self.unknown(field));
        }
        let env = self.vom.env()?;
        let data = serialize(&value.into(), env.converter())?;
        self.vom.swap_refs(self.state.fields.get(field), Some(&data))?;
        self.state.fields.insert(field.to_string(), data);
        self.state.dirty = true;
        Ok(())
    }
}

impl std::fmt::Debug for StateView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateView")
            .field("slot", &self.slot)
            .field("dirty", &self.state.dirty)
            .finish()
    }
}
