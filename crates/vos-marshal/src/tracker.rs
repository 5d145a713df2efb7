//! Persisted-reference bookkeeping.
//!
//! Any slot that appears in a persisted record keeps its object alive even
//! after every in-memory handle is gone. Writers of persisted records report
//! the slots they add and drop through a [`ReferenceTracker`].

use vos_types::Slot;

use crate::capdata::CapData;
use crate::error::MarshalResult;
use crate::marshal::SlotConverter;

/// Counts references held by persisted state.
pub trait ReferenceTracker {
    fn add_reference(&self, slot: &Slot) -> MarshalResult<()>;
    fn remove_reference(&self, slot: &Slot) -> MarshalResult<()>;
}

/// Everything a persisting manager needs from its host.
pub trait MarshalEnv: SlotConverter + ReferenceTracker {
    fn converter(&self) -> &dyn SlotConverter;
    fn tracker(&self) -> &dyn ReferenceTracker;
}

impl<T: SlotConverter + ReferenceTracker> MarshalEnv for T {
    fn converter(&self) -> &dyn SlotConverter {
        self
    }

    fn tracker(&self) -> &dyn ReferenceTracker {
        self
    }
}

/// Account for a record changing from `old` to `new`.
///
/// New references are added before old ones are dropped, so a slot present
/// in both never passes through a zero count.
pub fn swap_references(
    tracker: &dyn ReferenceTracker,
    old: Option<&CapData>,
    new: Option<&CapData>,
) -> MarshalResult<()> {
    for slot in new.map(|d| d.slots.as_slice()).unwrap_or_default() {
        tracker.add_reference(slot)?;
    }
    for slot in old.map(|d| d.slots.as_slice()).unwrap_or_default() {
        tracker.remove_reference(slot)?;
    }
    Ok(())
}

/// Index key recording that weak collection `collection_id` has an entry
/// keyed by `slot`. Its value is that entry's store key, so whoever deletes
/// `slot` can find and drop the entry without knowing the collection layout.
pub fn weak_key_index(slot: &Slot, collection_id: u64) -> String {
    format!("vom.ir.{slot}|{collection_id}")
}

/// The `[start, end)` range holding every [`weak_key_index`] entry for `slot`.
pub fn weak_key_index_range(slot: &Slot) -> (String, String) {
    (format!("vom.ir.{slot}|"), format!("vom.ir.{slot}}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Counts {
        counts: RefCell<HashMap<Slot, i64>>,
        trace: RefCell<Vec<(Slot, i64)>>,
    }

    impl ReferenceTracker for Counts {
        fn add_reference(&self, slot: &Slot) -> MarshalResult<()> {
            *self.counts.borrow_mut().entry(*slot).or_default() += 1;
            self.trace.borrow_mut().push((*slot, 1));
            Ok(())
        }

        fn remove_reference(&self, slot: &Slot) -> MarshalResult<()> {
            *self.counts.borrow_mut().entry(*slot).or_default() -= 1;
            self.trace.borrow_mut().push((*slot, -1));
            Ok(())
        }
    }

    fn data(slots: Vec<Slot>) -> CapData {
        CapData {
            body: String::new(),
            slots,
        }
    }

    #[test]
    fn adds_before_removing() {
        let counts = Counts::default();
        let shared = Slot::export(1);
        let gone = Slot::export(2);
        let added = Slot::export(3);
        swap_references(
            &counts,
            Some(&data(vec![shared, gone])),
            Some(&data(vec![shared, added])),
        )
        .unwrap();

        let trace = counts.trace.borrow();
        assert_eq!(trace[0], (shared, 1));
        assert_eq!(trace[1], (added, 1));
        let counts = counts.counts.borrow();
        assert_eq!(counts[&shared], 0);
        assert_eq!(counts[&gone], -1);
        assert_eq!(counts[&added], 1);
    }

    #[test]
    fn missing_sides_are_empty() {
        let counts = Counts::default();
        swap_references(&counts, None, None).unwrap();
        assert!(counts.trace.borrow().is_empty());
    }

    #[test]
    fn weak_key_index_falls_in_its_range() {
        let slot = Slot::virtual_instance(4, 2, false);
        let (start, end) = weak_key_index_range(&slot);
        for id in [1, 9, 10, 12345] {
            let key = weak_key_index(&slot, id);
            assert!(start <= key && key < end, "{key}");
        }
        // Another instance of the same kind is outside.
        let other = weak_key_index(&Slot::virtual_instance(4, 22, false), 1);
        assert!(!(start <= other && other < end));
    }
}
