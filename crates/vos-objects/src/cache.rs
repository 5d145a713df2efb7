use std::rc::Rc;

use lru::LruCache;
use serde::Serialize;
use vos_types::Slot;

use crate::state::InnerSelf;

/// Snapshot of cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub resident: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

/// Bounded LRU table of resident object states.
///
/// An entry whose `Rc` is also held elsewhere is in use by a running
/// operation and is skipped by eviction, so the table may briefly hold more
/// than `capacity` entries while operations nest.
pub(crate) struct ResidentCache {
    lru: LruCache<Slot, Rc<InnerSelf>>,
    capacity: usize,
    stats: CacheStats,
}

impl ResidentCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lru: LruCache::unbounded(),
            capacity,
            stats: CacheStats {
                capacity,
                ..CacheStats::default()
            },
        }
    }

    /// Look up and touch an entry.
    pub(crate) fn get(&mut self, slot: &Slot) -> Option<Rc<InnerSelf>> {
        match self.lru.get(slot) {
            Some(inner) => {
                self.stats.hits += 1;
                Some(Rc::clone(inner))
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look up without touching or counting.
    pub(crate) fn peek(&self, slot: &Slot) -> Option<Rc<InnerSelf>> {
        self.lru.peek(slot).cloned()
    }

    /// Insert or refresh an entry. The table may now be over capacity;
    /// see [`overflow`](Self::overflow).
    pub(crate) fn insert(&mut self, inner: Rc<InnerSelf>) {
        self.lru.put(inner.slot, inner);
    }

    /// Entries that have to leave to bring the table back to capacity,
    /// least recently used first. Nothing is removed.
    pub(crate) fn overflow(&self) -> Vec<Rc<InnerSelf>> {
        let excess = self.lru.len().saturating_sub(self.capacity);
        self.lru
            .iter()
            .rev()
            .filter(|(_, entry)| Rc::strong_count(entry) == 1)
            .take(excess)
            .map(|(_, entry)| Rc::clone(entry))
            .collect()
    }

    /// Remove an entry that has been written back.
    pub(crate) fn evict(&mut self, slot: &Slot) -> Option<Rc<InnerSelf>> {
        let evicted = self.lru.pop(slot);
        if evicted.is_some() {
            self.stats.evictions += 1;
        }
        evicted
    }

    /// Drop an entry without write-back.
    pub(crate) fn remove(&mut self, slot: &Slot) -> Option<Rc<InnerSelf>> {
        self.lru.pop(slot)
    }

    /// Every resident entry, least recently used first.
    pub(crate) fn entries(&self) -> Vec<Rc<InnerSelf>> {
        self.lru.iter().rev().map(|(_, e)| Rc::clone(e)).collect()
    }

    pub(crate) fn note_write_back(&mut self) {
        self.stats.write_backs += 1;
    }

    pub(crate) fn len(&self) -> usize {
        self.lru.len()
    }

    pub(crate) fn stats(&self) -> CacheStats {
        CacheStats {
            resident: self.lru.len(),
            ..self.stats
        }
    }
}
