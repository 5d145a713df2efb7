use std::rc::Rc;

use tracing::{debug, trace};
use vos_marshal::{serialize, swap_references, unserialize, weak_key_index, CapData};
use vos_store::ScanCursor;
use vos_types::{Remotable, Slot, Value};

use crate::descriptor::CollectionVariant;
use crate::error::{CollectionError, Result};
use crate::iter::{Entries, KeyRange};
use crate::keys::{
    decode_key, encode_remotable_ordered, encode_remotable_unordered, encode_scalar, DecodedKey,
    ENTRY_RANGE_END,
};
use crate::manager::CollectionManager;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CollectionInfo {
    pub(crate) id: u64,
    pub(crate) slot: Slot,
    pub(crate) variant: CollectionVariant,
    pub(crate) label: String,
}

/// Where a key lives in the store.
struct Located {
    store_key: String,
    /// Set for remotable keys.
    slot: Option<Slot>,
}

/// Shared implementation behind the four typed handles.
#[derive(Clone)]
pub(crate) struct Collection {
    manager: CollectionManager,
    info: Rc<CollectionInfo>,
    remotable: Remotable,
}

impl Collection {
    pub(crate) fn new(manager: CollectionManager, info: CollectionInfo, remotable: Remotable) -> Self {
        Self {
            manager,
            info: Rc::new(info),
            remotable,
        }
    }

    pub(crate) fn manager(&self) -> &CollectionManager {
        &self.manager
    }

    pub(crate) fn prefix(&self) -> String {
        format!("vc.{}.", self.info.id)
    }

    pub(crate) fn entry_range(&self) -> (String, String) {
        let prefix = self.prefix();
        let end = format!("{prefix}{ENTRY_RANGE_END}");
        (prefix, end)
    }

    fn meta_key(&self, name: &str) -> String {
        format!("vc.{}.|{name}", self.info.id)
    }

    fn tracks_keys(&self) -> bool {
        !self.info.variant.is_weak()
    }

    fn describe(key: &Value) -> String {
        match key {
            Value::Str(s) => format!("{s:?}"),
            other => format!("{other:?}"),
        }
    }

    fn not_found(&self, key: &Value) -> CollectionError {
        CollectionError::KeyNotFound {
            collection: self.info.label.clone(),
            key: Self::describe(key),
        }
    }

    // ---------------------------------------------------------------
    // Counters
    // ---------------------------------------------------------------

    fn read_counter(&self, name: &str, default: u64) -> Result<u64> {
        let key = self.meta_key(name);
        match self.manager.store().get(&key)? {
            Some(text) => text.parse().map_err(|_| CollectionError::Corrupt {
                key,
                reason: format!("not a number: {text:?}"),
            }),
            None => Ok(default),
        }
    }

    fn write_counter(&self, name: &str, value: u64) -> Result<()> {
        self.manager
            .store()
            .set(&self.meta_key(name), &value.to_string())?;
        Ok(())
    }

    fn adjust_count(&self, delta: i64) -> Result<()> {
        let count = self.read_counter("entryCount", 0)?;
        self.write_counter("entryCount", count.saturating_add_signed(delta))
    }

    fn ordinal_of(&self, slot: &Slot) -> Result<Option<u64>> {
        let key = self.meta_key(&slot.to_string());
        match self.manager.store().get(&key)? {
            Some(text) => text.parse().map(Some).map_err(|_| CollectionError::Corrupt {
                key,
                reason: format!("bad ordinal {text:?}"),
            }),
            None => Ok(None),
        }
    }

    fn assign_ordinal(&self, slot: &Slot) -> Result<u64> {
        let ordinal = self.read_counter("nextOrdinal", 1)?;
        self.write_counter("nextOrdinal", ordinal + 1)?;
        self.write_counter(&slot.to_string(), ordinal)?;
        Ok(ordinal)
    }

    // ---------------------------------------------------------------
    // Key location
    // ---------------------------------------------------------------

    fn located_remotable(&self, slot: Slot, ordinal: Option<u64>) -> Located {
        let encoded = match ordinal {
            Some(n) => encode_remotable_ordered(n, &slot),
            None => encode_remotable_unordered(&slot),
        };
        Located {
            store_key: format!("{}{encoded}", self.prefix()),
            slot: Some(slot),
        }
    }

    /// Find where `key` would be stored, without allocating anything.
    ///
    /// `None` means the key cannot be present.
    fn locate(&self, key: &Value) -> Result<Option<Located>> {
        let Value::Remotable(r) = key else {
            return Ok(Some(Located {
                store_key: format!("{}{}", self.prefix(), encode_scalar(key)?),
                slot: None,
            }));
        };
        let Some(slot) = self.manager.registry().lookup_slot(r) else {
            return Ok(None);
        };
        if !self.tracks_keys() {
            return Ok(Some(self.located_remotable(slot, None)));
        }
        Ok(self
            .ordinal_of(&slot)?
            .map(|n| self.located_remotable(slot, Some(n))))
    }

    /// Like [`locate`](Self::locate), assigning a slot and ordinal if needed.
    fn locate_or_assign(&self, key: &Value) -> Result<Located> {
        let Value::Remotable(r) = key else {
            return Ok(Located {
                store_key: format!("{}{}", self.prefix(), encode_scalar(key)?),
                slot: None,
            });
        };
        let env = self.manager.env()?;
        let slot = env.convert_val_to_slot(r)?;
        if !self.tracks_keys() {
            return Ok(self.located_remotable(slot, None));
        }
        let ordinal = match self.ordinal_of(&slot)? {
            Some(n) => n,
            None => self.assign_ordinal(&slot)?,
        };
        Ok(self.located_remotable(slot, Some(ordinal)))
    }

    fn read_entry(&self, store_key: &str) -> Result<Option<CapData>> {
        match self.manager.store().get(store_key)? {
            Some(text) => Ok(Some(CapData::from_json(&text)?)),
            None => Ok(None),
        }
    }

    // ---------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------

    pub(crate) fn has(&self, key: &Value) -> Result<bool> {
        match self.locate(key)? {
            Some(loc) => Ok(self.manager.store().has(&loc.store_key)?),
            None => Ok(false),
        }
    }

    pub(crate) fn get(&self, key: &Value) -> Result<Option<Value>> {
        let Some(loc) = self.locate(key)? else {
            return Ok(None);
        };
        let Some(data) = self.read_entry(&loc.store_key)? else {
            return Ok(None);
        };
        let env = self.manager.env()?;
        Ok(Some(unserialize(&data, env.converter())?))
    }

    pub(crate) fn init(&self, key: &Value, value: &Value) -> Result<()> {
        let env = self.manager.env()?;
        let data = serialize(value, env.converter())?;
        let loc = self.locate_or_assign(key)?;
        if self.manager.store().has(&loc.store_key)? {
            return Err(CollectionError::KeyAlreadyExists {
                collection: self.info.label.clone(),
                key: Self::describe(key),
            });
        }

        self.manager.store().set(&loc.store_key, &data.to_json()?)?;
        if self.tracks_keys() {
            self.adjust_count(1)?;
        } else if let Some(slot) = &loc.slot {
            self.manager
                .store()
                .set(&weak_key_index(slot, self.info.id), &loc.store_key)?;
        }
        swap_references(env.tracker(), None, Some(&data))?;
        if let (Some(slot), true) = (loc.slot, self.tracks_keys()) {
            env.add_reference(&slot)?;
        }
        trace!(collection = %self.info.slot, key = %loc.store_key, "entry added");
        Ok(())
    }

    pub(crate) fn set(&self, key: &Value, value: &Value) -> Result<()> {
        let loc = self.locate(key)?.ok_or_else(|| self.not_found(key))?;
        let old = self
            .read_entry(&loc.store_key)?
            .ok_or_else(|| self.not_found(key))?;
        let env = self.manager.env()?;
        let data = serialize(value, env.converter())?;
        self.manager.store().set(&loc.store_key, &data.to_json()?)?;
        swap_references(env.tracker(), Some(&old), Some(&data))?;
        Ok(())
    }

    pub(crate) fn delete(&self, key: &Value) -> Result<()> {
        let loc = self.locate(key)?.ok_or_else(|| self.not_found(key))?;
        if !self.manager.store().has(&loc.store_key)? {
            return Err(self.not_found(key));
        }
        self.delete_located(&loc)
    }

    fn delete_located(&self, loc: &Located) -> Result<()> {
        let old = self.read_entry(&loc.store_key)?;
        let env = self.manager.env()?;
        self.manager.store().delete(&loc.store_key)?;
        if self.tracks_keys() {
            if let Some(slot) = &loc.slot {
                self.manager
                    .store()
                    .delete(&self.meta_key(&slot.to_string()))?;
            }
            self.adjust_count(-1)?;
        } else if let Some(slot) = &loc.slot {
            self.manager
                .store()
                .delete(&weak_key_index(slot, self.info.id))?;
        }
        swap_references(env.tracker(), old.as_ref(), None)?;
        if let (Some(slot), true) = (loc.slot, self.tracks_keys()) {
            env.remove_reference(&slot)?;
        }
        trace!(collection = %self.info.slot, key = %loc.store_key, "entry deleted");
        Ok(())
    }

    pub(crate) fn size(&self) -> Result<u64> {
        self.read_counter("entryCount", 0)
    }

    /// Remove every entry.
    pub(crate) fn clear(&self) -> Result<()> {
        let (start, end) = self.entry_range();
        let store = self.manager.store();
        let mut cursor = ScanCursor::new();
        let mut prior = String::new();
        let mut doomed = Vec::new();
        while let Some((key, _)) = store.get_after_from(&mut cursor, &prior, &start, &end)? {
            let slot = match decode_key(&key[start.len()..])? {
                DecodedKey::Remotable(slot) => Some(slot),
                DecodedKey::Scalar(_) => None,
            };
            doomed.push(Located {
                store_key: key.clone(),
                slot,
            });
            prior = key;
        }
        for loc in &doomed {
            self.delete_located(loc)?;
        }
        debug!(collection = %self.info.slot, removed = doomed.len(), "collection cleared");
        Ok(())
    }

    pub(crate) fn entries(&self, range: KeyRange) -> Result<Entries> {
        Entries::new(self.clone(), range)
    }
}

macro_rules! collection_handle {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone)]
        pub struct $name(Collection);

        impl From<Collection> for $name {
            fn from(inner: Collection) -> Self {
                Self(inner)
            }
        }

        impl $name {
            pub fn slot(&self) -> Slot {
                self.0.info.slot
            }

            pub fn label(&self) -> &str {
                &self.0.info.label
            }

            /// The identity-bearing handle, for storing this collection elsewhere.
            pub fn remotable(&self) -> &Remotable {
                &self.0.remotable
            }

            pub fn as_value(&self) -> Value {
                Value::Remotable(self.0.remotable.clone())
            }

            pub fn has(&self, key: impl Into<Value>) -> Result<bool> {
                self.0.has(&key.into())
            }

            /// Remove `key`. Fails if it is absent.
            pub fn delete(&self, key: impl Into<Value>) -> Result<()> {
                self.0.delete(&key.into())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("slot", &self.0.info.slot)
                    .field("label", &self.0.info.label)
                    .finish()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.0.remotable == other.0.remotable
            }
        }

    };
}

collection_handle!(MapStore, "An ordered, iterable map persisted in the store.");
collection_handle!(WeakMapStore, "A lookup-only map whose keys hold no persisted reference.");
collection_handle!(SetStore, "An ordered, iterable set persisted in the store.");
collection_handle!(WeakSetStore, "A lookup-only set whose keys hold no persisted reference.");

/// Map operations.
macro_rules! map_ops {
    ($name:ident) => {
        impl $name {
            /// Add a new entry. Fails if `key` is already present.
            pub fn init(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
                self.0.init(&key.into(), &value.into())
            }

            pub fn get(&self, key: impl Into<Value>) -> Result<Option<Value>> {
                self.0.get(&key.into())
            }

            /// Replace the value of an existing entry. Fails if `key` is absent.
            pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<()> {
                self.0.set(&key.into(), &value.into())
            }
        }
    };
}

/// Set operations.
macro_rules! set_ops {
    ($name:ident) => {
        impl $name {
            /// Add `key`. Adding a present key is a no-op.
            pub fn add(&self, key: impl Into<Value>) -> Result<()> {
                let key = key.into();
                if self.0.has(&key)? {
                    return Ok(());
                }
                self.0.init(&key, &Value::Null)
            }
        }
    };
}

map_ops!(MapStore);
map_ops!(WeakMapStore);
set_ops!(SetStore);
set_ops!(WeakSetStore);

impl MapStore {
    pub fn size(&self) -> Result<u64> {
        self.0.size()
    }

    pub fn clear(&self) -> Result<()> {
        self.0.clear()
    }

    pub fn entries(&self) -> Result<Entries> {
        self.0.entries(KeyRange::all())
    }

    pub fn entries_in(&self, range: KeyRange) -> Result<Entries> {
        self.0.entries(range)
    }

    pub fn keys(&self) -> Result<impl Iterator<Item = Result<Value>>> {
        self.keys_in(KeyRange::all())
    }

    pub fn keys_in(&self, range: KeyRange) -> Result<impl Iterator<Item = Result<Value>>> {
        Ok(self.0.entries(range)?.map(|entry| entry.map(|(k, _)| k)))
    }

    pub fn values(&self) -> Result<impl Iterator<Item = Result<Value>>> {
        self.values_in(KeyRange::all())
    }

    pub fn values_in(&self, range: KeyRange) -> Result<impl Iterator<Item = Result<Value>>> {
        Ok(self.0.entries(range)?.map(|entry| entry.map(|(_, v)| v)))
    }
}

impl SetStore {
    pub fn size(&self) -> Result<u64> {
        self.0.size()
    }

    pub fn clear(&self) -> Result<()> {
        self.0.clear()
    }

    pub fn keys(&self) -> Result<impl Iterator<Item = Result<Value>>> {
        self.keys_in(KeyRange::all())
    }

    pub fn keys_in(&self, range: KeyRange) -> Result<impl Iterator<Item = Result<Value>>> {
        Ok(self.0.entries(range)?.map(|entry| entry.map(|(k, _)| k)))
    }
}

/// A collection of any variant, as returned by slot lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyCollection {
    Map(MapStore),
    WeakMap(WeakMapStore),
    Set(SetStore),
    WeakSet(WeakSetStore),
}

impl From<Collection> for AnyCollection {
    fn from(inner: Collection) -> Self {
        match inner.info.variant {
            CollectionVariant::MapStore => Self::Map(MapStore(inner)),
            CollectionVariant::WeakMapStore => Self::WeakMap(WeakMapStore(inner)),
            CollectionVariant::SetStore => Self::Set(SetStore(inner)),
            CollectionVariant::WeakSetStore => Self::WeakSet(WeakSetStore(inner)),
        }
    }
}

impl AnyCollection {
    fn inner(&self) -> &Collection {
        match self {
            Self::Map(c) => &c.0,
            Self::WeakMap(c) => &c.0,
            Self::Set(c) => &c.0,
            Self::WeakSet(c) => &c.0,
        }
    }

    pub fn variant(&self) -> CollectionVariant {
        self.inner().info.variant
    }

    pub fn slot(&self) -> Slot {
        self.inner().info.slot
    }

    pub fn label(&self) -> &str {
        &self.inner().info.label
    }

    pub fn remotable(&self) -> &Remotable {
        &self.inner().remotable
    }

    pub fn into_map_store(self) -> Option<MapStore> {
        match self {
            Self::Map(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_weak_map_store(self) -> Option<WeakMapStore> {
        match self {
            Self::WeakMap(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_set_store(self) -> Option<SetStore> {
        match self {
            Self::Set(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_weak_set_store(self) -> Option<WeakSetStore> {
        match self {
            Self::WeakSet(c) => Some(c),
            _ => None,
        }
    }
}
