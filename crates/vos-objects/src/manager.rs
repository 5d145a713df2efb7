use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use vos_marshal::{
    serialize, swap_references, weak_key_index_range, CapData, MarshalEnv, MarshalError, MarshalResult,
    ReferenceTracker,
};
use vos_slots::{ReclaimQueue, SlotRegistry};
use vos_store::{KvStore, ScanCursor};
use vos_types::{KindTag, Remotable, Slot, Value};

use crate::cache::{CacheStats, ResidentCache};
use crate::config::VomConfig;
use crate::error::{VomError, VomResult};
use crate::kind::{KindDefinition, KindHandle, KindRecord};
use crate::object::VirtualObject;
use crate::state::{InnerSelf, StateView};
use crate::status::ExportStatus;

type DeadHook = Rc<dyn Fn(&Slot)>;

fn record_key(slot: &Slot) -> String {
    format!("vom.{slot}")
}

fn refcount_key(slot: &Slot) -> String {
    format!("vom.rc.{slot}")
}

fn status_key(slot: &Slot) -> String {
    format!("vom.es.{slot}")
}

fn durable_kind_key(tag: &str) -> String {
    format!("vom.kind.{tag}")
}

struct Inner {
    store: Arc<dyn KvStore>,
    registry: Rc<SlotRegistry>,
    env: Weak<dyn MarshalEnv>,
    reclaim: ReclaimQueue,
    kinds: RefCell<HashMap<u64, Rc<KindRecord>>>,
    durable_tags: RefCell<HashMap<String, u64>>,
    cache: RefCell<ResidentCache>,
    possibly_dead: RefCell<BTreeSet<Slot>>,
    dead_hook: RefCell<Option<DeadHook>>,
    /// Plain exports named by persisted state, held while their count is above zero.
    held_exports: RefCell<HashMap<Slot, Remotable>>,
}

/// Owns virtual-object kinds, their resident state, and their liveness.
///
/// Cloning is cheap; clones share one manager. Every public operation
/// first drains the reclaim queue, turning representatives dropped since
/// the last call into liveness hints.
#[derive(Clone)]
pub struct VirtualObjectManager {
    inner: Rc<Inner>,
}

impl VirtualObjectManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        registry: Rc<SlotRegistry>,
        config: VomConfig,
        env: Weak<dyn MarshalEnv>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                store,
                registry,
                env,
                reclaim: ReclaimQueue::new(),
                kinds: RefCell::new(HashMap::new()),
                durable_tags: RefCell::new(HashMap::new()),
                cache: RefCell::new(ResidentCache::new(config.cache_size)),
                possibly_dead: RefCell::new(BTreeSet::new()),
                dead_hook: RefCell::new(None),
                held_exports: RefCell::new(HashMap::new()),
            }),
        }
    }

    fn store(&self) -> &dyn KvStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn env(&self) -> VomResult<Rc<dyn MarshalEnv>> {
        self.inner.env.upgrade().ok_or(VomError::EnvironmentGone)
    }

    /// Install the `add_to_possibly_dead_set` hook, called with every slot
    /// that becomes a liveness hint.
    pub fn set_possibly_dead_hook(&self, hook: impl Fn(&Slot) + 'static) {
        *self.inner.dead_hook.borrow_mut() = Some(Rc::new(hook));
    }

    // ---------------------------------------------------------------
    // Kinds
    // ---------------------------------------------------------------

    fn register_kind(&self, kind_id: u64, durable: bool, definition: KindDefinition) -> KindHandle {
        let record = Rc::new(KindRecord {
            kind_id,
            durable,
            definition,
        });
        self.inner
            .kinds
            .borrow_mut()
            .insert(kind_id, Rc::clone(&record));
        info!(kind_id, tag = record.definition.tag(), durable, "kind registered");
        KindHandle::new(self.clone(), record)
    }

    /// Register a kind whose instances live for this manager's lifetime.
    pub fn make_kind(&self, definition: KindDefinition) -> VomResult<KindHandle> {
        self.process_reclaimed();
        let kind_id = self.inner.registry.allocate_id(&KindTag::Export)?;
        Ok(self.register_kind(kind_id, false, definition))
    }

    /// Register a durable kind.
    ///
    /// The kind id is persisted under the kind's tag, so registering the same
    /// tag over the same store again reconnects to the existing instances.
    pub fn make_durable_kind(&self, definition: KindDefinition) -> VomResult<KindHandle> {
        self.process_reclaimed();
        let tag = definition.tag().to_string();
        if self.inner.durable_tags.borrow().contains_key(&tag) {
            return Err(VomError::KindAlreadyDefined(tag));
        }
        let key = durable_kind_key(&tag);
        let kind_id = match self.store().get(&key)? {
            Some(text) => text.parse().map_err(|_| VomError::Corrupt {
                key: key.clone(),
                reason: format!("bad kind id {text:?}"),
            })?,
            None => {
                let id = self.inner.registry.allocate_id(&KindTag::Export)?;
                self.store().set(&key, &id.to_string())?;
                id
            }
        };
        self.inner.durable_tags.borrow_mut().insert(tag, kind_id);
        Ok(self.register_kind(kind_id, true, definition))
    }

    fn kind_of(&self, slot: &Slot) -> VomResult<Rc<KindRecord>> {
        slot.kind_id()
            .filter(|_| slot.is_virtual() && slot.is_local())
            .and_then(|id| self.inner.kinds.borrow().get(&id).cloned())
            .ok_or(VomError::NotVirtual(*slot))
    }

    /// Returns `true` if `slot` is an instance of a kind registered here.
    pub fn owns_slot(&self, slot: &Slot) -> bool {
        self.kind_of(slot).is_ok()
    }

    // ---------------------------------------------------------------
    // Representatives
    // ---------------------------------------------------------------

    fn new_representative(&self, slot: Slot, tag: &str) -> VomResult<Remotable> {
        let rep = Remotable::new(tag);
        self.inner.registry.bind(slot, &rep)?;
        self.inner.reclaim.register(&rep, slot)?;
        trace!(%slot, "representative created");
        Ok(rep)
    }

    pub(crate) fn instantiate(&self, kind: &Rc<KindRecord>, args: &[Value]) -> VomResult<VirtualObject> {
        self.process_reclaimed();
        let initial = kind.definition.initial_state(args)?;
        let env = self.env()?;
        let fields = initial
            .iter()
            .map(|(name, value)| Ok((name.clone(), serialize(value, env.converter())?)))
            .collect::<VomResult<BTreeMap<String, CapData>>>()?;

        let slot = self.inner.registry.allocate_slot(&KindTag::Instance {
            kind_id: kind.kind_id,
            durable: kind.durable,
        })?;
        for data in fields.values() {
            swap_references(self, None, Some(data))?;
        }
        self.write_record(&slot, &fields)?;
        let rep = self.new_representative(slot, kind.definition.tag())?;

        let resident = Rc::new(InnerSelf::new(slot, fields));
        self.admit(Rc::clone(&resident))?;
        debug!(%slot, tag = kind.definition.tag(), "instance created");
        Ok(VirtualObject::new(self.clone(), rep, slot))
    }

    /// The representative for `slot`: the live one if it exists, otherwise
    /// a fresh one. Fails if no record exists for the slot.
    pub fn representative(&self, slot: &Slot) -> VomResult<Remotable> {
        self.process_reclaimed();
        if let Some(rep) = self.inner.registry.lookup_value(slot) {
            return Ok(rep);
        }
        let kind = self.kind_of(slot)?;
        let resident = self.inner.cache.borrow().peek(slot).is_some();
        if !resident && !self.store().has(&record_key(slot))? {
            return Err(VomError::UnknownObject(*slot));
        }
        self.new_representative(*slot, kind.definition.tag())
    }

    /// Wrap a marshaled representative back into a [`VirtualObject`].
    pub fn object(&self, value: &Value) -> VomResult<VirtualObject> {
        let rep = value.as_remotable()?;
        let slot = self
            .inner
            .registry
            .lookup_slot(rep)
            .ok_or_else(|| VomError::Unbound(format!("{rep:?}")))?;
        if !self.owns_slot(&slot) {
            return Err(VomError::NotVirtual(slot));
        }
        Ok(VirtualObject::new(self.clone(), rep.clone(), slot))
    }

    /// Look up a virtual object by slot, materializing its representative.
    pub fn object_at(&self, slot: &Slot) -> VomResult<VirtualObject> {
        let rep = self.representative(slot)?;
        Ok(VirtualObject::new(self.clone(), rep, *slot))
    }

    // ---------------------------------------------------------------
    // Resident state
    // ---------------------------------------------------------------

    fn write_record(&self, slot: &Slot, fields: &BTreeMap<String, CapData>) -> VomResult<()> {
        let text = serde_json::to_string(fields).map_err(|e| VomError::Corrupt {
            key: record_key(slot),
            reason: e.to_string(),
        })?;
        self.store().set(&record_key(slot), &text)?;
        Ok(())
    }

    fn read_record(&self, slot: &Slot) -> VomResult<Option<BTreeMap<String, CapData>>> {
        let key = record_key(slot);
        let Some(text) = self.store().get(&key)? else {
            return Ok(None);
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| VomError::Corrupt {
                key,
                reason: e.to_string(),
            })
    }

    fn write_back(&self, resident: &InnerSelf) -> VomResult<()> {
        let mut state = resident
            .state
            .try_borrow_mut()
            .map_err(|_| VomError::Reentrant(resident.slot))?;
        if !state.dirty {
            return Ok(());
        }
        self.write_record(&resident.slot, &state.fields)?;
        state.dirty = false;
        self.inner.cache.borrow_mut().note_write_back();
        trace!(slot = %resident.slot, "state written back");
        Ok(())
    }

    /// Bring the cache back to capacity.
    ///
    /// Each victim leaves only after its write-back succeeds; on failure it
    /// and every later victim stay resident.
    fn trim(&self) -> VomResult<()> {
        let victims = self.inner.cache.borrow().overflow();
        for victim in victims {
            self.write_back(&victim)?;
            self.inner.cache.borrow_mut().evict(&victim.slot);
            trace!(slot = %victim.slot, "state evicted");
        }
        Ok(())
    }

    fn admit(&self, resident: Rc<InnerSelf>) -> VomResult<()> {
        self.inner.cache.borrow_mut().insert(resident);
        self.trim()
    }

    fn ensure_resident(&self, slot: &Slot) -> VomResult<Rc<InnerSelf>> {
        self.kind_of(slot)?;
        let cached = self.inner.cache.borrow_mut().get(slot);
        if let Some(resident) = cached {
            return Ok(resident);
        }
        let fields = self
            .read_record(slot)?
            .ok_or(VomError::UnknownObject(*slot))?;
        let resident = Rc::new(InnerSelf::new(*slot, fields));
        self.admit(Rc::clone(&resident))?;
        trace!(%slot, "state loaded");
        Ok(resident)
    }

    fn with_state<R>(&self, slot: &Slot, f: impl FnOnce(&mut StateView<'_>) -> VomResult<R>) -> VomResult<R> {
        self.process_reclaimed();
        let resident = self.ensure_resident(slot)?;
        let outcome = match resident.state.try_borrow_mut() {
            Ok(mut state) => f(&mut StateView::new(self, *slot, &mut state)),
            Err(_) => Err(VomError::Reentrant(*slot)),
        };
        // Nested calls may have pushed the cache over capacity while this
        // entry was pinned.
        drop(resident);
        let trimmed = self.trim();
        let value = outcome?;
        trimmed?;
        Ok(value)
    }

    /// Run a kind method against the object at `slot`.
    pub fn invoke(&self, slot: &Slot, method: &str, args: &[Value]) -> VomResult<Value> {
        let kind = self.kind_of(slot)?;
        let body = kind
            .definition
            .find_method(method)
            .ok_or_else(|| VomError::UnknownMethod {
                kind: kind.definition.tag().to_string(),
                method: method.to_string(),
            })?;
        self.with_state(slot, |view| body(view, args))
    }

    pub fn get_field(&self, slot: &Slot, field: &str) -> VomResult<Value> {
        self.with_state(slot, |view| view.get(field))
    }

    pub fn set_field(&self, slot: &Slot, field: &str, value: Value) -> VomResult<()> {
        self.with_state(slot, |view| view.set(field, value))
    }

    /// Write back every dirty resident state. Nothing is evicted.
    pub fn flush_cache(&self) -> VomResult<()> {
        self.process_reclaimed();
        let entries = self.inner.cache.borrow().entries();
        let mut flushed = 0usize;
        for resident in &entries {
            let dirty = match resident.state.try_borrow() {
                Ok(state) => state.dirty,
                Err(_) => {
                    warn!(slot = %resident.slot, "state busy; not flushed");
                    continue;
                }
            };
            if dirty {
                self.write_back(resident)?;
                flushed += 1;
            }
        }
        debug!(flushed, resident = entries.len(), "cache flushed");
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.borrow().stats()
    }

    // ---------------------------------------------------------------
    // Persisted references
    // ---------------------------------------------------------------

    pub(crate) fn swap_refs(&self, old: Option<&CapData>, new: Option<&CapData>) -> VomResult<()> {
        swap_references(self, old, new)?;
        Ok(())
    }

    /// Number of persisted records that refer to `slot`.
    pub fn refcount(&self, slot: &Slot) -> VomResult<u64> {
        let key = refcount_key(slot);
        match self.store().get(&key)? {
            Some(text) => text.parse().map_err(|_| VomError::Corrupt {
                key,
                reason: format!("bad refcount {text:?}"),
            }),
            None => Ok(0),
        }
    }

    /// Record one more persisted reference to `slot`.
    ///
    /// A plain export named by persisted state is held in memory from here
    /// on, so the record can always be read back.
    pub fn add_reference(&self, slot: &Slot) -> VomResult<()> {
        let count = self.refcount(slot)? + 1;
        self.store().set(&refcount_key(slot), &count.to_string())?;
        if slot.is_object() && slot.is_local() && !slot.is_virtual() {
            self.hold_export(slot);
        }
        trace!(%slot, count, "reference added");
        Ok(())
    }

    fn hold_export(&self, slot: &Slot) {
        if self.inner.held_exports.borrow().contains_key(slot) {
            return;
        }
        if let Some(value) = self.inner.registry.lookup_value(slot) {
            self.inner.held_exports.borrow_mut().insert(*slot, value);
        }
    }

    /// Drop one persisted reference. Reaching zero makes `slot` a liveness hint.
    pub fn remove_reference(&self, slot: &Slot) -> VomResult<()> {
        let count = self.refcount(slot)?;
        if count == 0 {
            warn!(%slot, "reference count underflow ignored");
            return Ok(());
        }
        if count == 1 {
            self.store().delete(&refcount_key(slot))?;
            let released = self.inner.held_exports.borrow_mut().remove(slot);
            drop(released);
            self.note_possibly_dead(*slot);
        } else {
            self.store().set(&refcount_key(slot), &(count - 1).to_string())?;
        }
        trace!(%slot, count = count - 1, "reference removed");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Export status and liveness
    // ---------------------------------------------------------------

    pub fn export_status(&self, slot: &Slot) -> VomResult<ExportStatus> {
        let key = status_key(slot);
        let code = self.store().get(&key)?;
        ExportStatus::from_code(&key, code.as_deref())
    }

    pub fn set_export_status(&self, slot: &Slot, status: ExportStatus) -> VomResult<()> {
        self.process_reclaimed();
        let key = status_key(slot);
        match status.code() {
            Some(code) => self.store().set(&key, code)?,
            None => self.store().delete(&key)?,
        }
        if status != ExportStatus::Reachable {
            self.note_possibly_dead(*slot);
        }
        debug!(%slot, %status, "export status set");
        Ok(())
    }

    /// Returns `true` if something outside the heap still holds `slot`:
    /// an importer (export status `Reachable`) or a persisted record.
    pub fn is_presence_reachable(&self, slot: &Slot) -> VomResult<bool> {
        self.process_reclaimed();
        Ok(self.export_status(slot)? == ExportStatus::Reachable || self.refcount(slot)? > 0)
    }

    fn note_possibly_dead(&self, slot: Slot) {
        let fresh = self.inner.possibly_dead.borrow_mut().insert(slot);
        if fresh {
            trace!(%slot, "possibly dead");
            let hook = self.inner.dead_hook.borrow().clone();
            if let Some(hook) = hook {
                hook(&slot);
            }
        }
    }

    /// Slots currently hinted as possibly dead, sorted.
    pub fn possibly_dead(&self) -> Vec<Slot> {
        self.process_reclaimed();
        self.inner.possibly_dead.borrow().iter().copied().collect()
    }

    fn process_reclaimed(&self) {
        for slot in self.inner.reclaim.drain() {
            // A new representative may have been made since the hint fired.
            if self.inner.registry.is_live(&slot) {
                continue;
            }
            self.inner.registry.unbind(&slot);
            self.note_possibly_dead(slot);
        }
    }

    /// Delete the object at `slot` if nothing can reach it any more.
    ///
    /// The record survives while a representative is alive, while any
    /// persisted record refers to the slot, and while the slot is exported
    /// as `Reachable`. Deleting releases the references its fields held.
    /// Returns `true` if the record was deleted.
    pub fn possible_virtual_object_death(&self, slot: &Slot) -> VomResult<bool> {
        self.process_reclaimed();
        if !self.owns_slot(slot) || self.inner.registry.is_live(slot) {
            return Ok(false);
        }
        if self.refcount(slot)? > 0 || self.export_status(slot)? == ExportStatus::Reachable {
            return Ok(false);
        }

        let cached = self.inner.cache.borrow().peek(slot);
        let fields = match &cached {
            Some(resident) => {
                let state = resident
                    .state
                    .try_borrow()
                    .map_err(|_| VomError::Reentrant(*slot))?;
                Some(state.fields.clone())
            }
            None => self.read_record(slot)?,
        };
        let Some(fields) = fields else {
            return Ok(false);
        };

        // Resident state is discarded, never written back.
        if cached.is_some() {
            self.inner.cache.borrow_mut().remove(slot);
        }
        self.store().delete(&record_key(slot))?;
        self.store().delete(&status_key(slot))?;
        self.inner.registry.unbind(slot);
        self.inner.possibly_dead.borrow_mut().remove(slot);
        for data in fields.values() {
            swap_references(self, Some(data), None)?;
        }
        let weak_entries = self.drop_weak_entries(slot)?;
        debug!(%slot, weak_entries, "virtual object deleted");
        Ok(true)
    }

    /// Delete every weak-collection entry keyed by `slot`, releasing the
    /// references their values held. Returns how many were deleted.
    fn drop_weak_entries(&self, slot: &Slot) -> VomResult<usize> {
        let (start, end) = weak_key_index_range(slot);
        let store = self.store();
        let mut cursor = ScanCursor::new();
        let mut prior = String::new();
        let mut doomed = Vec::new();
        while let Some((index_key, entry_key)) = store.get_after_from(&mut cursor, &prior, &start, &end)? {
            prior.clone_from(&index_key);
            doomed.push((index_key, entry_key));
        }
        for (index_key, entry_key) in &doomed {
            let value = store.get(entry_key)?;
            store.delete(entry_key)?;
            store.delete(index_key)?;
            if let Some(text) = value {
                swap_references(self, Some(&CapData::from_json(&text)?), None)?;
            }
        }
        Ok(doomed.len())
    }

    /// Run the liveness check over every hinted slot until no hints remain.
    ///
    /// Deleting one object can release the last reference to another, so
    /// this keeps going until the hint set is empty. Returns the deleted
    /// slots in deletion order.
    pub fn collect_garbage(&self) -> VomResult<Vec<Slot>> {
        self.process_reclaimed();
        let mut deleted = Vec::new();
        loop {
            let next = self.inner.possibly_dead.borrow_mut().pop_first();
            let Some(slot) = next else {
                break;
            };
            if self.possible_virtual_object_death(&slot)? {
                deleted.push(slot);
            }
        }
        let pruned = self.inner.registry.prune();
        if !deleted.is_empty() {
            info!(deleted = deleted.len(), pruned, "garbage collected");
        }
        Ok(deleted)
    }
}

impl ReferenceTracker for VirtualObjectManager {
    fn add_reference(&self, slot: &Slot) -> MarshalResult<()> {
        VirtualObjectManager::add_reference(self, slot)
            .map_err(|e| MarshalError::Tracking(e.to_string()))
    }

    fn remove_reference(&self, slot: &Slot) -> MarshalResult<()> {
        VirtualObjectManager::remove_reference(self, slot)
            .map_err(|e| MarshalError::Tracking(e.to_string()))
    }
}

impl std::fmt::Debug for VirtualObjectManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualObjectManager")
            .field("kinds", &self.inner.kinds.borrow().len())
            .field("resident", &self.inner.cache.borrow().len())
            .field("possibly_dead", &self.inner.possibly_dead.borrow().len())
            .finish()
    }
}
