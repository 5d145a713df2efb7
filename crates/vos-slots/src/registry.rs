use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use vos_store::KvStore;
use vos_types::{KindTag, Remotable, RemotableId, Slot, WeakRemotable};

use crate::config::{RegistryConfig, Retention};
use crate::error::{SlotError, SlotResult};

const COUNTER_PREFIX: &str = "slots.next.";

/// Bindings tolerated before the first sweep for reclaimed values.
const PRUNE_FLOOR: usize = 64;

enum Held {
    Strong(Remotable),
    Weak(WeakRemotable),
}

impl Held {
    fn id(&self) -> RemotableId {
        match self {
            Self::Strong(r) => r.id(),
            Self::Weak(w) => w.id(),
        }
    }

    fn get(&self) -> Option<Remotable> {
        match self {
            Self::Strong(r) => Some(r.clone()),
            Self::Weak(w) => w.upgrade(),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Self::Strong(_) => true,
            Self::Weak(w) => w.is_live(),
        }
    }
}

/// Bidirectional map between slots and in-memory values.
///
/// Slots are allocated from per-[`KindTag`] counters that only move forward.
/// When built with [`SlotRegistry::with_store`] the counters are persisted,
/// so a fresh process over the same store keeps counting where the last one
/// stopped.
pub struct SlotRegistry {
    retention: Retention,
    slot_to_val: RefCell<HashMap<Slot, Held>>,
    val_to_slot: RefCell<HashMap<RemotableId, Slot>>,
    counters: RefCell<HashMap<String, u64>>,
    store: Option<Arc<dyn KvStore>>,
    /// Table size at which `bind` sweeps out reclaimed values.
    prune_at: Cell<usize>,
}

impl SlotRegistry {
    /// Create a registry whose counters live only in memory.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            retention: config.retention,
            slot_to_val: RefCell::new(HashMap::new()),
            val_to_slot: RefCell::new(HashMap::new()),
            counters: RefCell::new(HashMap::new()),
            store: None,
            prune_at: Cell::new(PRUNE_FLOOR),
        }
    }

    /// Create a registry that persists its allocation counters in `store`.
    pub fn with_store(config: RegistryConfig, store: Arc<dyn KvStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(config)
        }
    }

    pub fn retention(&self) -> Retention {
        self.retention
    }

    // ---------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------

    fn load_counter(&self, name: &str) -> SlotResult<u64> {
        let Some(store) = &self.store else {
            return Ok(1);
        };
        match store.get(&format!("{COUNTER_PREFIX}{name}"))? {
            Some(text) => text.parse().map_err(|_| SlotError::CorruptCounter {
                name: name.to_string(),
                value: text,
            }),
            None => Ok(1),
        }
    }

    /// Issue the next number for `tag`. Numbers start at 1 and never repeat.
    pub fn allocate_id(&self, tag: &KindTag) -> SlotResult<u64> {
        let name = tag.counter_name();
        let cached = self.counters.borrow().get(&name).copied();
        let id = match cached {
            Some(id) => id,
            None => self.load_counter(&name)?,
        };
        if let Some(store) = &self.store {
            store.set(&format!("{COUNTER_PREFIX}{name}"), &(id + 1).to_string())?;
        }
        self.counters.borrow_mut().insert(name, id + 1);
        Ok(id)
    }

    /// Issue a fresh slot for `tag`.
    pub fn allocate_slot(&self, tag: &KindTag) -> SlotResult<Slot> {
        if tag.slot_for(0).is_none() {
            return Err(SlotError::NotSlotBearing(*tag));
        }
        let id = self.allocate_id(tag)?;
        tag.slot_for(id).ok_or(SlotError::NotSlotBearing(*tag))
    }

    // ---------------------------------------------------------------
    // Binding
    // ---------------------------------------------------------------

    /// Associate `slot` with `value`.
    ///
    /// Re-binding the same pair is a no-op. A slot whose previous value has
    /// been reclaimed may be bound again.
    pub fn bind(&self, slot: Slot, value: &Remotable) -> SlotResult<()> {
        if self.len() >= self.prune_at.get() {
            self.prune();
        }
        if let Some(current) = self.lookup_value(&slot) {
            if current == *value {
                return Ok(());
            }
            return Err(SlotError::AlreadyBound { slot });
        }
        if let Some(existing) = self.val_to_slot.borrow().get(&value.id()) {
            if *existing != slot {
                return Err(SlotError::ValueAlreadyBound {
                    existing: *existing,
                    requested: slot,
                });
            }
        }

        let held = match self.retention {
            Retention::Strong => Held::Strong(value.clone()),
            Retention::Weak => Held::Weak(value.downgrade()),
        };
        let stale = self.slot_to_val.borrow_mut().insert(slot, held);
        if let Some(stale) = &stale {
            self.val_to_slot.borrow_mut().remove(&stale.id());
        }
        self.val_to_slot.borrow_mut().insert(value.id(), slot);
        debug!(%slot, value = %value.id(), "slot bound");
        Ok(())
    }

    /// The live value bound to `slot`, if any.
    pub fn lookup_value(&self, slot: &Slot) -> Option<Remotable> {
        self.slot_to_val.borrow().get(slot).and_then(Held::get)
    }

    /// The slot bound to `value`, if any.
    pub fn lookup_slot(&self, value: &Remotable) -> Option<Slot> {
        self.val_to_slot.borrow().get(&value.id()).copied()
    }

    /// Returns `true` if `slot` is bound to a live value.
    pub fn is_live(&self, slot: &Slot) -> bool {
        self.slot_to_val.borrow().get(slot).is_some_and(Held::is_live)
    }

    /// Remove both directions of the association for `slot`.
    ///
    /// Returns `true` if the slot was bound.
    pub fn unbind(&self, slot: &Slot) -> bool {
        let removed = self.slot_to_val.borrow_mut().remove(slot);
        match removed {
            Some(held) => {
                self.val_to_slot.borrow_mut().remove(&held.id());
                debug!(%slot, "slot unbound");
                // `held` drops here, after both borrows are released.
                true
            }
            None => false,
        }
    }

    /// Forget every binding whose weakly held value has been reclaimed.
    ///
    /// `bind` also sweeps on its own once the table doubles in size since
    /// the last sweep. Returns the number of bindings dropped.
    pub fn prune(&self) -> usize {
        let mut slot_to_val = self.slot_to_val.borrow_mut();
        let mut val_to_slot = self.val_to_slot.borrow_mut();
        let before = slot_to_val.len();
        slot_to_val.retain(|_, held| {
            let live = held.is_live();
            if !live {
                val_to_slot.remove(&held.id());
            }
            live
        });
        let pruned = before - slot_to_val.len();
        self.prune_at.set((slot_to_val.len() * 2).max(PRUNE_FLOOR));
        if pruned > 0 {
            debug!(pruned, remaining = slot_to_val.len(), "reclaimed bindings pruned");
        }
        pruned
    }

    /// Number of bindings held, including any whose value has been
    /// reclaimed but not yet pruned.
    pub fn len(&self) -> usize {
        self.slot_to_val.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots currently bound to live values, sorted.
    pub fn live_slots(&self) -> Vec<Slot> {
        let mut slots: Vec<Slot> = self
            .slot_to_val
            .borrow()
            .iter()
            .filter(|(_, held)| held.get().is_some())
            .map(|(slot, _)| *slot)
            .collect();
        slots.sort();
        slots
    }
}

impl std::fmt::Debug for SlotRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRegistry")
            .field("retention", &self.retention)
            .field("bound", &self.slot_to_val.borrow().len())
            .field("persistent_counters", &self.store.is_some())
            .finish()
    }
}
