use std::rc::{Rc, Weak};
use std::sync::Arc;

use tracing::{debug, info};
use vos_collections::{CollectionKinds, CollectionManager};
use vos_marshal::{MarshalEnv, MarshalError, MarshalResult, ReferenceTracker, SlotConverter};
use vos_objects::{KindDefinition, KindHandle, VirtualObjectManager, VomError};
use vos_slots::SlotRegistry;
use vos_store::{InMemoryKvStore, KvStore, ScanCursor, StoreOp};
use vos_types::{Allocator, KindTag, Remotable, Slot, Value};

use crate::config::RuntimeConfig;
use crate::error::RuntimeResult;

/// Upper bound above every key the managers write.
const KEY_SPACE_END: &str = "\u{10FFFF}";

fn conversion(e: impl std::fmt::Display) -> MarshalError {
    MarshalError::Conversion(e.to_string())
}

/// The slot-conversion environment shared by both managers.
struct Host {
    store: Arc<dyn KvStore>,
    registry: Rc<SlotRegistry>,
    vom: VirtualObjectManager,
    collections: CollectionManager,
}

impl SlotConverter for Host {
    fn convert_val_to_slot(&self, value: &Remotable) -> MarshalResult<Slot> {
        if let Some(slot) = self.registry.lookup_slot(value) {
            return Ok(slot);
        }
        let slot = self
            .registry
            .allocate_slot(&KindTag::Export)
            .map_err(conversion)?;
        self.registry.bind(slot, value).map_err(conversion)?;
        debug!(%slot, label = value.label(), "export allocated");
        Ok(slot)
    }

    fn convert_slot_to_val(&self, slot: &Slot, iface: &str) -> MarshalResult<Remotable> {
        if self.vom.owns_slot(slot) {
            return self.vom.representative(slot).map_err(conversion);
        }
        if self.collections.owns_slot(slot) {
            return self
                .collections
                .collection_value(slot)
                .map_err(conversion)?
                .ok_or_else(|| conversion(format!("no collection at {slot}")));
        }
        if let Some(value) = self.registry.lookup_value(slot) {
            return Ok(value);
        }
        if slot.allocator() == Allocator::Remote {
            // First sighting of an import: make its presence.
            let presence = Remotable::new(iface);
            self.registry.bind(*slot, &presence).map_err(conversion)?;
            debug!(%slot, iface, "presence created");
            return Ok(presence);
        }
        Err(conversion(format!("{slot} is no longer held in memory")))
    }
}

impl ReferenceTracker for Host {
    fn add_reference(&self, slot: &Slot) -> MarshalResult<()> {
        ReferenceTracker::add_reference(&self.vom, slot)
    }

    fn remove_reference(&self, slot: &Slot) -> MarshalResult<()> {
        ReferenceTracker::remove_reference(&self.vom, slot)
    }
}

/// One store, one registry, one virtual object manager and one collection
/// manager, wired together.
pub struct Runtime {
    host: Rc<Host>,
    memory: Option<Arc<InMemoryKvStore>>,
}

impl Runtime {
    /// Build a runtime over a fresh in-memory store.
    pub fn new(config: RuntimeConfig) -> RuntimeResult<Self> {
        let memory = Arc::new(if config.store.log {
            InMemoryKvStore::with_log()
        } else {
            InMemoryKvStore::new()
        });
        let store: Arc<dyn KvStore> = memory.clone();
        let mut runtime = Self::with_store(config, store)?;
        runtime.memory = Some(memory);
        Ok(runtime)
    }

    /// Build a runtime over an existing store, picking up whatever earlier
    /// runtimes persisted there.
    pub fn with_store(config: RuntimeConfig, store: Arc<dyn KvStore>) -> RuntimeResult<Self> {
        config.validate()?;
        let registry = Rc::new(SlotRegistry::with_store(
            config.registry.clone(),
            Arc::clone(&store),
        ));
        let kinds = CollectionKinds::load_or_allocate(store.as_ref(), &registry)?;
        let host = Rc::new_cyclic(|weak: &Weak<Host>| {
            let env: Weak<dyn MarshalEnv> = weak.clone();
            Host {
                store: Arc::clone(&store),
                registry: Rc::clone(&registry),
                vom: VirtualObjectManager::new(
                    Arc::clone(&store),
                    Rc::clone(&registry),
                    config.vom.clone(),
                    env.clone(),
                ),
                collections: CollectionManager::new(Arc::clone(&store), Rc::clone(&registry), kinds, env),
            }
        });
        info!(
            retention = ?config.registry.retention,
            cache_size = config.vom.cache_size,
            "runtime started"
        );
        Ok(Self { host, memory: None })
    }

    pub fn vom(&self) -> &VirtualObjectManager {
        &self.host.vom
    }

    pub fn collections(&self) -> &CollectionManager {
        &self.host.collections
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.host.registry
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.host.store
    }

    pub fn make_kind(&self, definition: KindDefinition) -> RuntimeResult<KindHandle> {
        Ok(self.host.vom.make_kind(definition)?)
    }

    pub fn make_durable_kind(&self, definition: KindDefinition) -> RuntimeResult<KindHandle> {
        Ok(self.host.vom.make_durable_kind(definition)?)
    }

    /// Write back all dirty object state.
    pub fn flush(&self) -> RuntimeResult<()> {
        Ok(self.host.vom.flush_cache()?)
    }

    /// End-of-work liveness pass. Returns the deleted slots.
    pub fn collect_garbage(&self) -> RuntimeResult<Vec<Slot>> {
        Ok(self.host.vom.collect_garbage()?)
    }

    // ---------------------------------------------------------------
    // Debug tools
    // ---------------------------------------------------------------

    /// Every key and value in the store, in key order.
    pub fn dump_store(&self) -> RuntimeResult<Vec<(String, String)>> {
        let store = self.host.store.as_ref();
        let mut cursor = ScanCursor::new();
        let mut prior = String::new();
        let mut entries = Vec::new();
        while let Some((key, value)) = store.get_after_from(&mut cursor, &prior, "", KEY_SPACE_END)? {
            prior.clone_from(&key);
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// The value behind `slot`, materializing virtual objects and
    /// collections. `None` if nothing is there.
    pub fn lookup_value(&self, slot: &Slot) -> RuntimeResult<Option<Value>> {
        let host = &self.host;
        let found = if host.vom.owns_slot(slot) {
            match host.vom.representative(slot) {
                Ok(rep) => Some(rep),
                Err(VomError::UnknownObject(_)) => None,
                Err(e) => return Err(e.into()),
            }
        } else if host.collections.owns_slot(slot) {
            host.collections.collection_value(slot)?
        } else {
            host.registry.lookup_value(slot)
        };
        Ok(found.map(Value::Remotable))
    }

    /// The slot assigned to a remotable value, if any.
    pub fn slot_of(&self, value: &Value) -> Option<Slot> {
        match value {
            Value::Remotable(r) => self.host.registry.lookup_slot(r),
            _ => None,
        }
    }

    /// Drain the store's operation log. Empty unless the runtime created an
    /// in-memory store with logging enabled.
    pub fn take_store_log(&self) -> RuntimeResult<Vec<StoreOp>> {
        match &self.memory {
            Some(memory) => Ok(memory.take_log()?),
            None => Ok(Vec::new()),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("registry", &self.host.registry)
            .field("vom", &self.host.vom)
            .field("collections", &self.host.collections)
            .finish()
    }
}
