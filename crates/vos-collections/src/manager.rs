use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vos_marshal::MarshalEnv;
use vos_slots::SlotRegistry;
use vos_store::KvStore;
use vos_types::{KindTag, Remotable, Slot};

use crate::collection::{AnyCollection, Collection, CollectionInfo, MapStore, SetStore, WeakMapStore, WeakSetStore};
use crate::descriptor::{CollectionDescriptor, CollectionVariant};
use crate::error::{CollectionError, Result};

const KINDS_KEY: &str = "vc.kinds";

/// Kind ids of the four collection variants.
///
/// Collection slots are `o+<kind>/<collectionId>`, so these ids decide which
/// virtual slots belong to the collection manager. They are allocated once
/// per store and persisted under `vc.kinds`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionKinds {
    #[serde(rename = "scalarMapStore")]
    map_store: u64,
    #[serde(rename = "scalarWeakMapStore")]
    weak_map_store: u64,
    #[serde(rename = "scalarSetStore")]
    set_store: u64,
    #[serde(rename = "scalarWeakSetStore")]
    weak_set_store: u64,
}

impl CollectionKinds {
    /// Read the persisted kind ids, allocating and persisting them on first use.
    pub fn load_or_allocate(store: &dyn KvStore, registry: &SlotRegistry) -> Result<Self> {
        if let Some(text) = store.get(KINDS_KEY)? {
            return serde_json::from_str(&text).map_err(|e| CollectionError::Corrupt {
                key: KINDS_KEY.to_string(),
                reason: e.to_string(),
            });
        }
        let kinds = Self {
            map_store: registry.allocate_id(&KindTag::Export)?,
            weak_map_store: registry.allocate_id(&KindTag::Export)?,
            set_store: registry.allocate_id(&KindTag::Export)?,
            weak_set_store: registry.allocate_id(&KindTag::Export)?,
        };
        let text = serde_json::to_string(&kinds).map_err(|e| CollectionError::Corrupt {
            key: KINDS_KEY.to_string(),
            reason: e.to_string(),
        })?;
        store.set(KINDS_KEY, &text)?;
        info!(?kinds, "collection kinds allocated");
        Ok(kinds)
    }

    pub fn kind_id(&self, variant: CollectionVariant) -> u64 {
        match variant {
            CollectionVariant::MapStore => self.map_store,
            CollectionVariant::WeakMapStore => self.weak_map_store,
            CollectionVariant::SetStore => self.set_store,
            CollectionVariant::WeakSetStore => self.weak_set_store,
        }
    }

    pub fn variant_of(&self, kind_id: u64) -> Option<CollectionVariant> {
        CollectionVariant::ALL
            .into_iter()
            .find(|v| self.kind_id(*v) == kind_id)
    }
}

pub(crate) struct Inner {
    store: Arc<dyn KvStore>,
    registry: Rc<SlotRegistry>,
    env: Weak<dyn MarshalEnv>,
    kinds: CollectionKinds,
}

/// Creates collections and finds them again by slot.
///
/// Cloning is cheap; clones share one manager. Slot conversion for values
/// and remotable keys goes through the host environment, which is held
/// weakly because the host normally owns the manager.
#[derive(Clone)]
pub struct CollectionManager {
    inner: Rc<Inner>,
}

impl CollectionManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        registry: Rc<SlotRegistry>,
        kinds: CollectionKinds,
        env: Weak<dyn MarshalEnv>,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                store,
                registry,
                env,
                kinds,
            }),
        }
    }

    pub fn kinds(&self) -> &CollectionKinds {
        &self.inner.kinds
    }

    pub(crate) fn store(&self) -> &dyn KvStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn registry(&self) -> &SlotRegistry {
        &self.inner.registry
    }

    pub(crate) fn env(&self) -> Result<Rc<dyn MarshalEnv>> {
        self.inner.env.upgrade().ok_or(CollectionError::EnvironmentGone)
    }

    fn schemata_key(id: u64) -> String {
        format!("vc.{id}.|schemata")
    }

    fn create(&self, variant: CollectionVariant, label: &str) -> Result<Collection> {
        let id = self.registry().allocate_id(&KindTag::Collection)?;
        let slot = Slot::virtual_instance(self.kinds().kind_id(variant), id, false);
        let descriptor = CollectionDescriptor {
            label: label.to_string(),
            variant,
        };
        let text = serde_json::to_string(&descriptor).map_err(|e| CollectionError::Corrupt {
            key: Self::schemata_key(id),
            reason: e.to_string(),
        })?;
        self.store().set(&Self::schemata_key(id), &text)?;
        if !variant.is_weak() {
            self.store().set(&format!("vc.{id}.|entryCount"), "0")?;
        }

        let remotable = Remotable::new(label);
        self.registry().bind(slot, &remotable)?;
        debug!(%slot, %variant, label, "collection created");
        Ok(Collection::new(
            self.clone(),
            CollectionInfo {
                id,
                slot,
                variant,
                label: label.to_string(),
            },
            remotable,
        ))
    }

    pub fn make_map_store(&self, label: &str) -> Result<MapStore> {
        self.create(CollectionVariant::MapStore, label).map(MapStore::from)
    }

    pub fn make_weak_map_store(&self, label: &str) -> Result<WeakMapStore> {
        self.create(CollectionVariant::WeakMapStore, label)
            .map(WeakMapStore::from)
    }

    pub fn make_set_store(&self, label: &str) -> Result<SetStore> {
        self.create(CollectionVariant::SetStore, label).map(SetStore::from)
    }

    pub fn make_weak_set_store(&self, label: &str) -> Result<WeakSetStore> {
        self.create(CollectionVariant::WeakSetStore, label)
            .map(WeakSetStore::from)
    }

    /// Returns `true` if `slot` has the shape of a collection slot.
    pub fn owns_slot(&self, slot: &Slot) -> bool {
        slot.is_virtual()
            && slot.is_local()
            && slot
                .kind_id()
                .and_then(|k| self.kinds().variant_of(k))
                .is_some()
    }

    /// Look up a collection by its slot.
    ///
    /// Returns the same underlying remotable as any live handle to the
    /// collection, or `Ok(None)` if no collection was ever created there.
    pub fn get_collection(&self, slot: &Slot) -> Result<Option<AnyCollection>> {
        let not_a_collection = || CollectionError::NotACollection { slot: *slot };
        if !self.owns_slot(slot) {
            return Err(not_a_collection());
        }
        let variant = slot
            .kind_id()
            .and_then(|k| self.kinds().variant_of(k))
            .ok_or_else(not_a_collection)?;
        let id = slot.instance().ok_or_else(not_a_collection)?;

        let key = Self::schemata_key(id);
        let Some(text) = self.store().get(&key)? else {
            return Ok(None);
        };
        let descriptor: CollectionDescriptor =
            serde_json::from_str(&text).map_err(|e| CollectionError::Corrupt {
                key: key.clone(),
                reason: e.to_string(),
            })?;
        if descriptor.variant != variant {
            return Err(CollectionError::Corrupt {
                key,
                reason: format!("descriptor says {}, slot says {variant}", descriptor.variant),
            });
        }

        let remotable = match self.registry().lookup_value(slot) {
            Some(existing) => existing,
            None => {
                let fresh = Remotable::new(descriptor.label.as_str());
                self.registry().bind(*slot, &fresh)?;
                debug!(%slot, "collection rematerialized");
                fresh
            }
        };
        let info = CollectionInfo {
            id,
            slot: *slot,
            variant,
            label: descriptor.label,
        };
        Ok(Some(AnyCollection::from(Collection::new(
            self.clone(),
            info,
            remotable,
        ))))
    }

    /// The remotable standing for the collection at `slot`, for slot conversion.
    pub fn collection_value(&self, slot: &Slot) -> Result<Option<Remotable>> {
        Ok(self
            .get_collection(slot)?
            .map(|collection| collection.remotable().clone()))
    }
}

impl std::fmt::Debug for CollectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionManager")
            .field("kinds", &self.inner.kinds)
            .field("env_alive", &(self.inner.env.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    use vos_marshal::{MarshalError, MarshalResult, ReferenceTracker, SlotConverter};
    use vos_slots::RegistryConfig;
    use vos_store::InMemoryKvStore;
    use vos_types::Value;

    /// Minimal host: plain remotables become exports, collection slots go
    /// to the manager, and persisted references are simply counted.
    pub(crate) struct Host {
        pub(crate) store: Arc<InMemoryKvStore>,
        pub(crate) registry: Rc<SlotRegistry>,
        pub(crate) manager: CollectionManager,
        pub(crate) refs: RefCell<BTreeMap<Slot, i64>>,
    }

    impl Host {
        pub(crate) fn new() -> Rc<Self> {
            Self::over(Arc::new(InMemoryKvStore::new()))
        }

        pub(crate) fn over(store: Arc<InMemoryKvStore>) -> Rc<Self> {
            let shared: Arc<dyn KvStore> = store.clone();
            let registry = Rc::new(SlotRegistry::with_store(
                RegistryConfig::default(),
                Arc::clone(&shared),
            ));
            let kinds = CollectionKinds::load_or_allocate(shared.as_ref(), &registry).unwrap();
            Rc::new_cyclic(|weak: &Weak<Host>| {
                let env: Weak<dyn MarshalEnv> = weak.clone();
                Host {
                    store,
                    registry: Rc::clone(&registry),
                    manager: CollectionManager::new(shared, registry, kinds, env),
                    refs: RefCell::new(BTreeMap::new()),
                }
            })
        }

        pub(crate) fn refcount(&self, slot: &Slot) -> i64 {
            self.refs.borrow().get(slot).copied().unwrap_or(0)
        }
    }

    impl SlotConverter for Host {
        fn convert_val_to_slot(&self, value: &Remotable) -> MarshalResult<Slot> {
            if let Some(slot) = self.registry.lookup_slot(value) {
                return Ok(slot);
            }
            let conv = |e: vos_slots::SlotError| MarshalError::Conversion(e.to_string());
            let slot = self.registry.allocate_slot(&KindTag::Export).map_err(conv)?;
            self.registry.bind(slot, value).map_err(conv)?;
            Ok(slot)
        }

        fn convert_slot_to_val(&self, slot: &Slot, _iface: &str) -> MarshalResult<Remotable> {
            let found = if self.manager.owns_slot(slot) {
                self.manager
                    .collection_value(slot)
                    .map_err(|e| MarshalError::Conversion(e.to_string()))?
            } else {
                self.registry.lookup_value(slot)
            };
            found.ok_or_else(|| MarshalError::Conversion(format!("no value for {slot}")))
        }
    }

    impl ReferenceTracker for Host {
        fn add_reference(&self, slot: &Slot) -> MarshalResult<()> {
            *self.refs.borrow_mut().entry(*slot).or_default() += 1;
            Ok(())
        }

        fn remove_reference(&self, slot: &Slot) -> MarshalResult<()> {
            *self.refs.borrow_mut().entry(*slot).or_default() -= 1;
            Ok(())
        }
    }

    #[test]
    fn kinds_are_allocated_once_per_store() {
        let store = Arc::new(InMemoryKvStore::new());
        let first = *Host::over(Arc::clone(&store)).manager.kinds();
        let second = *Host::over(store).manager.kinds();
        assert_eq!(first, second);
        let ids: Vec<u64> = CollectionVariant::ALL
            .into_iter()
            .map(|v| first.kind_id(v))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(first.variant_of(3), Some(CollectionVariant::SetStore));
        assert_eq!(first.variant_of(9), None);
    }

    #[test]
    fn collections_get_distinct_slots() {
        let host = Host::new();
        let a = host.manager.make_map_store("a").unwrap();
        let b = host.manager.make_set_store("b").unwrap();
        assert_eq!(a.slot(), Slot::virtual_instance(1, 1, false));
        assert_eq!(b.slot(), Slot::virtual_instance(3, 2, false));
        assert!(host.manager.owns_slot(&a.slot()));
        assert!(!host.manager.owns_slot(&Slot::export(1)));
        assert!(!host.manager.owns_slot(&Slot::virtual_instance(77, 1, false)));
    }

    #[test]
    fn get_collection_returns_live_handle() {
        let host = Host::new();
        let map = host.manager.make_map_store("balances").unwrap();
        let found = host.manager.get_collection(&map.slot()).unwrap().unwrap();
        assert_eq!(found.variant(), CollectionVariant::MapStore);
        assert_eq!(found.label(), "balances");
        assert_eq!(found.remotable(), map.remotable());
    }

    #[test]
    fn get_collection_rematerializes_after_drop() {
        let host = Host::new();
        let map = host.manager.make_map_store("m").unwrap();
        map.init("k", 5i64).unwrap();
        let slot = map.slot();
        drop(map);

        let again = host
            .manager
            .get_collection(&slot)
            .unwrap()
            .and_then(AnyCollection::into_map_store)
            .unwrap();
        assert_eq!(again.get("k").unwrap(), Some(Value::Int(5)));
        assert_eq!(host.registry.lookup_value(&slot).as_ref(), Some(again.remotable()));
    }

    #[test]
    fn get_collection_edge_cases() {
        let host = Host::new();
        assert!(matches!(
            host.manager.get_collection(&Slot::export(4)),
            Err(CollectionError::NotACollection { .. })
        ));
        let never_created = Slot::virtual_instance(1, 40, false);
        assert!(host.manager.get_collection(&never_created).unwrap().is_none());
    }

    #[test]
    fn collections_reopen_over_same_store() {
        let store = Arc::new(InMemoryKvStore::new());
        let slot = {
            let host = Host::over(Arc::clone(&store));
            let set = host.manager.make_set_store("members").unwrap();
            set.add("alice").unwrap();
            set.add("bob").unwrap();
            set.slot()
        };

        let host = Host::over(store);
        let set = host
            .manager
            .get_collection(&slot)
            .unwrap()
            .and_then(AnyCollection::into_set_store)
            .unwrap();
        assert_eq!(set.size().unwrap(), 2);
        let keys: Vec<Value> = set.keys().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys, vec![Value::from("alice"), Value::from("bob")]);

        // New collections keep counting past the old ones.
        let next = host.manager.make_set_store("later").unwrap();
        assert_eq!(next.slot().instance(), Some(2));
    }

    #[test]
    fn dropped_environment_is_reported() {
        let host = Host::new();
        let map = host.manager.make_map_store("orphan").unwrap();
        drop(host);
        assert!(matches!(
            map.init("k", 1i64),
            Err(CollectionError::EnvironmentGone)
        ));
    }
}
