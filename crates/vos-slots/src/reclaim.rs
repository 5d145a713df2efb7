//! Explicit reclamation hints.
//!
//! Representatives are plain reference-counted handles. Registering one with
//! a [`ReclaimQueue`] arranges for its slot to be queued when the last
//! handle drops. Nothing else happens at drop time: the owning manager
//! drains the queue at the start of its next operation and decides what the
//! hint means.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;
use vos_types::{Remotable, Slot};

use crate::error::SlotResult;

/// Queue of slots whose in-memory handle has been dropped.
#[derive(Clone, Default)]
pub struct ReclaimQueue {
    pending: Rc<RefCell<Vec<Slot>>>,
}

impl ReclaimQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `slot` once every handle to `value` has dropped.
    ///
    /// If the queue itself is gone by then, the hint is discarded.
    pub fn register(&self, value: &Remotable, slot: Slot) -> SlotResult<()> {
        let pending = Rc::downgrade(&self.pending);
        value.on_reclaim(move || {
            let Some(pending) = pending.upgrade() else {
                return;
            };
            match pending.try_borrow_mut() {
                Ok(mut queue) => queue.push(slot),
                Err(_) => warn!(%slot, "reclaim queue busy; dropping hint"),
            };
        })?;
        Ok(())
    }

    /// Take every pending hint, oldest first.
    pub fn drain(&self) -> Vec<Slot> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }
}

impl std::fmt::Debug for ReclaimQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReclaimQueue")
            .field("pending", &self.len())
            .finish()
    }
}
