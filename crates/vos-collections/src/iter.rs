use vos_marshal::{unserialize, CapData};
use vos_store::{check_range, ScanCursor};
use vos_types::Value;

use crate::collection::Collection;
use crate::error::Result;
use crate::keys::{decode_key, encode_scalar, DecodedKey};

/// Bounds for range iteration: `start` inclusive, `end` exclusive.
///
/// Bounds must be scalar keys. A missing bound leaves that side open.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyRange {
    pub start: Option<Value>,
    pub end: Option<Value>,
}

impl KeyRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn starting_at(start: impl Into<Value>) -> Self {
        Self {
            start: Some(start.into()),
            end: None,
        }
    }

    pub fn before(end: impl Into<Value>) -> Self {
        Self {
            start: None,
            end: Some(end.into()),
        }
    }

    pub fn between(start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }
}

/// Forward iterator over the entries of a strong collection.
///
/// Each iterator carries its own [`ScanCursor`]. Entries inserted ahead of
/// the iterator are visited; entries deleted ahead of it are skipped.
pub struct Entries {
    collection: Collection,
    cursor: ScanCursor,
    prior: String,
    start: String,
    end: String,
    done: bool,
}

impl Entries {
    pub(crate) fn new(collection: Collection, range: KeyRange) -> Result<Self> {
        let prefix = collection.prefix();
        let (lower, upper) = collection.entry_range();
        let start = match &range.start {
            Some(key) => format!("{prefix}{}", encode_scalar(key)?),
            None => lower,
        };
        let end = match &range.end {
            Some(key) => format!("{prefix}{}", encode_scalar(key)?),
            None => upper,
        };
        check_range(&start, &end)?;
        Ok(Self {
            collection,
            cursor: ScanCursor::new(),
            prior: String::new(),
            start,
            end,
            done: false,
        })
    }

    fn advance(&mut self) -> Result<Option<(Value, Value)>> {
        let store = self.collection.manager().store();
        let Some((key, text)) =
            store.get_after_from(&mut self.cursor, &self.prior, &self.start, &self.end)?
        else {
            return Ok(None);
        };
        let env = self.collection.manager().env()?;
        let logical = match decode_key(&key[self.collection.prefix().len()..])? {
            DecodedKey::Scalar(value) => value,
            DecodedKey::Remotable(slot) => Value::Remotable(env.convert_slot_to_val(&slot, "")?),
        };
        let value = unserialize(&CapData::from_json(&text)?, env.converter())?;
        self.prior = key;
        Ok(Some((logical, value)))
    }
}

impl Iterator for Entries {
    type Item = Result<(Value, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl std::fmt::Debug for Entries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entries")
            .field("prior", &self.prior)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::tests::Host;

    #[test]
    fn range_constructors() {
        assert_eq!(KeyRange::all(), KeyRange { start: None, end: None });
        assert_eq!(KeyRange::starting_at(3i64).start, Some(Value::Int(3)));
        assert_eq!(KeyRange::before("q").end, Some(Value::from("q")));
    }

    #[test]
    fn remotable_bounds_are_rejected() {
        let host = Host::new();
        let map = host.manager.make_map_store("m").unwrap();
        let bound = vos_types::Remotable::new("bound");
        assert!(map.entries_in(KeyRange::starting_at(bound)).is_err());
    }

    #[test]
    fn entries_pair_keys_with_values() {
        let host = Host::new();
        let map = host.manager.make_map_store("m").unwrap();
        map.init("x", 1i64).unwrap();
        map.init("y", 2i64).unwrap();
        let entries: Vec<(Value, Value)> = map.entries().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(
            entries,
            vec![
                (Value::from("x"), Value::Int(1)),
                (Value::from("y"), Value::Int(2)),
            ]
        );
    }

    #[test]
    fn exhausted_iterator_stays_exhausted() {
        let host = Host::new();
        let map = host.manager.make_map_store("m").unwrap();
        let mut entries = map.entries().unwrap();
        assert!(entries.next().is_none());
        map.init("late", 0i64).unwrap();
        assert!(entries.next().is_none());
    }

    #[test]
    fn corrupt_entry_surfaces_once() {
        let host = Host::new();
        let map = host.manager.make_map_store("m").unwrap();
        map.init("a", 0i64).unwrap();
        let key = format!("vc.{}.sa", map.slot().instance().unwrap());
        vos_store::KvStore::set(host.store.as_ref(), &key, "not capdata").unwrap();
        let mut entries = map.entries().unwrap();
        assert!(matches!(entries.next(), Some(Err(_))));
        assert!(entries.next().is_none());
    }
}
