use std::fmt;

use vos_types::{Remotable, Slot, Value};

use crate::error::VomResult;
use crate::manager::VirtualObjectManager;

/// A representative of one virtual object.
///
/// Clones share one identity. While any clone is alive, looking the slot up
/// again yields the same [`Remotable`]. Dropping the last clone only hints
/// that the object may be dead; its record stays until a liveness check
/// agrees.
#[derive(Clone)]
pub struct VirtualObject {
    vom: VirtualObjectManager,
    rep: Remotable,
    slot: Slot,
}

impl VirtualObject {
    pub(crate) fn new(vom: VirtualObjectManager, rep: Remotable, slot: Slot) -> Self {
        Self { vom, rep, slot }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn remotable(&self) -> &Remotable {
        &self.rep
    }

    pub fn as_value(&self) -> Value {
        Value::Remotable(self.rep.clone())
    }

    pub fn invoke(&self, method: &str, args: &[Value]) -> VomResult<Value> {
        self.vom.invoke(&self.slot, method, args)
    }

    pub fn get(&self, field: &str) -> VomResult<Value> {
        self.vom.get_field(&self.slot, field)
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) -> VomResult<()> {
        self.vom.set_field(&self.slot, field, value.into())
    }
}

impl PartialEq for VirtualObject {
    fn eq(&self, other: &Self) -> bool {
        self.rep == other.rep
    }
}

impl Eq for VirtualObject {}

impl From<VirtualObject> for Value {
    fn from(object: VirtualObject) -> Self {
        Value::Remotable(object.rep)
    }
}

impl fmt::Debug for VirtualObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualObject")
            .field("slot", &self.slot)
            .field("kind", &self.rep.label())
            .finish()
    }
}
