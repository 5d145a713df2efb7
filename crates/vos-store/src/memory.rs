use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

use tracing::trace;

use crate::error::{StoreError, StoreResult};
use crate::log::{StoreOp, StoreStats};
use crate::traits::{check_range, KvStore, ScanCursor};

/// In-memory, HashMap-based ordered key-value store.
///
/// Intended for tests and embedding. Range queries work off a sorted snapshot
/// of the key set that is built lazily and thrown away whenever a key is
/// inserted or removed (overwriting an existing key keeps it). A shared
/// cursor remembers where the last `get_after` stopped so that walking a
/// range by feeding each result back as `prior_key` costs O(n) in total.
pub struct InMemoryKvStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, String>,
    sorted: Option<Vec<String>>,
    /// Bumped on every change to the key set.
    generation: u64,
    shared_cursor: ScanCursor,
    log: Option<Vec<StoreOp>>,
    stats: StoreStats,
}

impl Inner {
    fn key_set_changed(&mut self) {
        self.sorted = None;
        self.generation += 1;
        self.shared_cursor.reset();
    }

    fn record(&mut self, op: impl FnOnce() -> StoreOp) {
        if let Some(log) = self.log.as_mut() {
            log.push(op());
        }
    }

    fn get_after(
        &mut self,
        cursor: Option<&mut ScanCursor>,
        prior_key: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Option<(String, String)>> {
        check_range(start, end)?;
        self.stats.range_queries += 1;

        if self.sorted.is_none() {
            let mut keys: Vec<String> = self.entries.keys().cloned().collect();
            keys.sort();
            self.sorted = Some(keys);
            self.stats.snapshot_builds += 1;
        }
        let generation = self.generation;
        let Inner {
            entries,
            sorted,
            shared_cursor,
            stats,
            ..
        } = self;
        let keys = sorted.as_deref().unwrap_or_default();
        let cursor = cursor.unwrap_or(shared_cursor);

        let after_prior = match cursor.resume_index(prior_key, generation) {
            Some(index) => {
                stats.resumptions += 1;
                index + 1
            }
            None => {
                stats.rescans += 1;
                keys.partition_point(|k| k.as_str() <= prior_key)
            }
        };
        let from = after_prior.max(keys.partition_point(|k| k.as_str() < start));

        let found = keys
            .get(from)
            .filter(|k| k.as_str() < end)
            .and_then(|k| entries.get(k).map(|v| (k.clone(), v.clone())));
        match &found {
            Some((key, _)) => cursor.advance(key, from, generation),
            None => cursor.reset(),
        }
        Ok(found)
    }
}

impl InMemoryKvStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Create an empty store that records every operation.
    pub fn with_log() -> Self {
        Self {
            inner: RwLock::new(Inner {
                log: Some(Vec::new()),
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> StoreResult<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Number of stored keys.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    /// All entries, sorted by key.
    pub fn dump(&self) -> StoreResult<Vec<(String, String)>> {
        let inner = self.lock()?;
        let mut entries: Vec<(String, String)> = inner
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// Drain the operation log. Empty when logging is disabled.
    pub fn take_log(&self) -> StoreResult<Vec<StoreOp>> {
        let mut inner = self.lock()?;
        Ok(inner.log.as_mut().map(std::mem::take).unwrap_or_default())
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        Ok(self.lock()?.stats)
    }

    /// Remove every entry.
    pub fn clear(&self) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.entries.clear();
        inner.key_set_changed();
        Ok(())
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut inner = self.lock()?;
        inner.stats.gets += 1;
        let result = inner.entries.get(key).cloned();
        inner.record(|| StoreOp::Get {
            key: key.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.stats.sets += 1;
        inner.record(|| StoreOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        if inner
            .entries
            .insert(key.to_string(), value.to_string())
            .is_none()
        {
            inner.key_set_changed();
        }
        trace!(key, "store set");
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.stats.deletes += 1;
        inner.record(|| StoreOp::Delete {
            key: key.to_string(),
        });
        if inner.entries.remove(key).is_some() {
            inner.key_set_changed();
        }
        trace!(key, "store delete");
        Ok(())
    }

    fn get_after(
        &self,
        prior_key: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Option<(String, String)>> {
        let mut inner = self.lock()?;
        let result = inner.get_after(None, prior_key, start, end)?;
        inner.record(|| StoreOp::GetAfter {
            prior_key: prior_key.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    fn get_after_from(
        &self,
        cursor: &mut ScanCursor,
        prior_key: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Option<(String, String)>> {
        let mut inner = self.lock()?;
        let result = inner.get_after(Some(cursor), prior_key, start, end)?;
        inner.record(|| StoreOp::GetAfter {
            prior_key: prior_key.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock()?.entries.contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryKvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryKvStore")
            .field("entry_count", &count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn store_with(keys: &[&str]) -> InMemoryKvStore {
        let store = InMemoryKvStore::new();
        for k in keys {
            store.set(k, &format!("v-{k}")).unwrap();
        }
        store
    }

    fn key_of(result: Option<(String, String)>) -> Option<String> {
        result.map(|(k, _)| k)
    }

    // -----------------------------------------------------------------------
    // Basic CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn set_get_delete() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".into()));
        assert!(store.has("k").unwrap());
        store.set("k", "w").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("w".into()));
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        store.delete("k").unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn dump_is_sorted() {
        let store = store_with(&["c", "a", "b"]);
        let keys: Vec<String> = store.dump().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    // -----------------------------------------------------------------------
    // Range queries
    // -----------------------------------------------------------------------

    #[test]
    fn walk_then_delete_skips_deleted_key() {
        let store = store_with(&["a", "b", "c"]);
        assert_eq!(
            store.get_after("", "", "z").unwrap(),
            Some(("a".into(), "v-a".into()))
        );
        assert_eq!(key_of(store.get_after("a", "", "z").unwrap()), Some("b".into()));
        store.delete("b").unwrap();
        assert_eq!(key_of(store.get_after("a", "", "z").unwrap()), Some("c".into()));
    }

    #[test]
    fn end_bound_is_exclusive() {
        let store = store_with(&["a", "n"]);
        assert_eq!(store.get_after("m", "a", "m").unwrap(), None);
        assert_eq!(key_of(store.get_after("", "a", "n").unwrap()), Some("a".into()));
        assert_eq!(store.get_after("a", "a", "n").unwrap(), None);
    }

    #[test]
    fn start_bound_is_inclusive() {
        let store = store_with(&["a", "b", "c"]);
        assert_eq!(key_of(store.get_after("", "b", "z").unwrap()), Some("b".into()));
        assert_eq!(key_of(store.get_after("a", "bb", "z").unwrap()), Some("c".into()));
    }

    #[test]
    fn empty_store_reports_none() {
        let store = InMemoryKvStore::new();
        assert_eq!(store.get_after("", "", "z").unwrap(), None);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let store = store_with(&["a"]);
        assert!(matches!(
            store.get_after("", "z", "a"),
            Err(StoreError::InvalidRange { .. })
        ));
    }

    #[test]
    fn non_preceding_prior_key_still_correct() {
        let store = store_with(&["a", "b", "c", "d"]);
        assert_eq!(key_of(store.get_after("", "", "z").unwrap()), Some("a".into()));
        // Jump ahead without passing through "b".
        assert_eq!(key_of(store.get_after("c", "", "z").unwrap()), Some("d".into()));
        // Prior key that is not itself stored.
        assert_eq!(key_of(store.get_after("bb", "", "z").unwrap()), Some("c".into()));
    }

    #[test]
    fn sequential_walk_resumes_instead_of_rescanning() {
        let keys: Vec<String> = (0..50).map(|i| format!("k{i:03}")).collect();
        let store = InMemoryKvStore::new();
        for k in &keys {
            store.set(k, "x").unwrap();
        }

        let mut prior = String::new();
        let mut seen = Vec::new();
        while let Some((k, _)) = store.get_after(&prior, "", "l").unwrap() {
            seen.push(k.clone());
            prior = k;
        }
        assert_eq!(seen, keys);

        let stats = store.stats().unwrap();
        assert_eq!(stats.snapshot_builds, 1);
        assert_eq!(stats.rescans, 1);
        assert_eq!(stats.resumptions, 50);
    }

    #[test]
    fn overwrite_keeps_snapshot() {
        let store = store_with(&["a", "b"]);
        store.get_after("", "", "z").unwrap();
        store.set("a", "new").unwrap();
        assert_eq!(
            store.get_after("a", "", "z").unwrap(),
            Some(("b".into(), "v-b".into()))
        );
        let stats = store.stats().unwrap();
        assert_eq!(stats.snapshot_builds, 1);
        assert_eq!(stats.resumptions, 1);
    }

    #[test]
    fn insert_invalidates_snapshot() {
        let store = store_with(&["a", "c"]);
        assert_eq!(key_of(store.get_after("", "", "z").unwrap()), Some("a".into()));
        store.set("b", "x").unwrap();
        assert_eq!(key_of(store.get_after("a", "", "z").unwrap()), Some("b".into()));
        assert_eq!(store.stats().unwrap().snapshot_builds, 2);
    }

    #[test]
    fn independent_cursors_do_not_interfere() {
        let store = store_with(&["a", "b", "c", "d"]);
        let mut first = ScanCursor::new();
        let mut second = ScanCursor::new();

        let a = key_of(store.get_after_from(&mut first, "", "", "z").unwrap()).unwrap();
        let a2 = key_of(store.get_after_from(&mut second, "", "", "z").unwrap()).unwrap();
        let b = key_of(store.get_after_from(&mut first, &a, "", "z").unwrap()).unwrap();
        let b2 = key_of(store.get_after_from(&mut second, &a2, "", "z").unwrap()).unwrap();
        assert_eq!((b.as_str(), b2.as_str()), ("b", "b"));

        let stats = store.stats().unwrap();
        assert_eq!(stats.rescans, 2);
        assert_eq!(stats.resumptions, 2);
    }

    #[test]
    fn stale_cursor_after_mutation_rescans() {
        let store = store_with(&["a", "b", "c"]);
        let mut cursor = ScanCursor::new();
        store.get_after_from(&mut cursor, "", "", "z").unwrap();
        store.get_after_from(&mut cursor, "a", "", "z").unwrap();
        store.delete("b").unwrap();
        assert_eq!(
            key_of(store.get_after_from(&mut cursor, "b", "", "z").unwrap()),
            Some("c".into())
        );
        assert_eq!(store.stats().unwrap().rescans, 2);
    }

    // -----------------------------------------------------------------------
    // Logging
    // -----------------------------------------------------------------------

    #[test]
    fn log_records_operations() {
        let store = InMemoryKvStore::with_log();
        store.set("a", "1").unwrap();
        store.get("a").unwrap();
        store.delete("a").unwrap();
        let log: Vec<String> = store.take_log().unwrap().iter().map(|op| op.to_string()).collect();
        assert_eq!(log, vec!["set a 1", "get a => Some(\"1\")", "delete a"]);
        assert!(store.take_log().unwrap().is_empty());
    }

    #[test]
    fn unlogged_store_returns_empty_log() {
        let store = InMemoryKvStore::new();
        store.set("a", "1").unwrap();
        assert!(store.take_log().unwrap().is_empty());
    }

    #[test]
    fn debug_format() {
        let store = store_with(&["x"]);
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryKvStore"));
        assert!(debug.contains("entry_count"));
    }

    // -----------------------------------------------------------------------
    // Reference model
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Action {
        Set(String),
        Delete(String),
        Query { prior: String, start: String, end: String },
    }

    fn small_key() -> impl Strategy<Value = String> {
        "[a-e]{0,3}"
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            small_key().prop_map(Action::Set),
            small_key().prop_map(Action::Delete),
            (small_key(), small_key(), small_key()).prop_map(|(prior, a, b)| {
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                Action::Query { prior, start, end }
            }),
        ]
    }

    proptest! {
        #[test]
        fn matches_btree_reference(actions in proptest::collection::vec(action(), 1..60)) {
            let store = InMemoryKvStore::new();
            let mut model: BTreeMap<String, String> = BTreeMap::new();
            let mut last: Option<String> = None;
            for action in actions {
                match action {
                    Action::Set(k) => {
                        store.set(&k, &k).unwrap();
                        model.insert(k.clone(), k);
                    }
                    Action::Delete(k) => {
                        store.delete(&k).unwrap();
                        model.remove(&k);
                    }
                    Action::Query { prior, start, end } => {
                        // Alternate between fresh prior keys and the last result
                        // so both the rescan and resume paths get exercised.
                        let prior = last.take().unwrap_or(prior);
                        let expected = model
                            .iter()
                            .find(|(k, _)| k.as_str() > prior.as_str() && k.as_str() >= start.as_str() && k.as_str() < end.as_str())
                            .map(|(k, v)| (k.clone(), v.clone()));
                        let got = store.get_after(&prior, &start, &end).unwrap();
                        prop_assert_eq!(&got, &expected);
                        last = got.map(|(k, _)| k);
                    }
                }
            }
        }
    }
}
