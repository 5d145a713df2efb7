use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use vos_types::{Remotable, Slot, Value};

use crate::capdata::CapData;
use crate::error::{MarshalError, MarshalResult};

/// Maps remotables to slots and back on behalf of the marshaler.
///
/// `convert_val_to_slot` must assign a slot to a remotable that has none
/// (allocate and bind). `convert_slot_to_val` must return the existing
/// remotable for a slot when one is alive, materializing otherwise, so that
/// unserializing the same slot twice yields the same remotable.
pub trait SlotConverter {
    fn convert_val_to_slot(&self, value: &Remotable) -> MarshalResult<Slot>;

    /// `iface` is the label recorded when the slot was serialized.
    fn convert_slot_to_val(&self, slot: &Slot, iface: &str) -> MarshalResult<Remotable>;
}

/// Wire form of a value body.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoded {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Encoded>),
    Record(BTreeMap<String, Encoded>),
    Slot { index: usize, iface: String },
}

struct Encoder<'a> {
    converter: &'a dyn SlotConverter,
    slots: Vec<Slot>,
    indices: HashMap<Slot, usize>,
}

impl Encoder<'_> {
    fn encode(&mut self, value: &Value) -> MarshalResult<Encoded> {
        Ok(match value {
            Value::Null => Encoded::Null,
            Value::Bool(b) => Encoded::Bool(*b),
            Value::Int(n) => Encoded::Int(*n),
            Value::Str(s) => Encoded::Str(s.clone()),
            Value::List(items) => Encoded::List(
                items
                    .iter()
                    .map(|v| self.encode(v))
                    .collect::<MarshalResult<_>>()?,
            ),
            Value::Record(fields) => Encoded::Record(
                fields
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.encode(v)?)))
                    .collect::<MarshalResult<_>>()?,
            ),
            Value::Remotable(r) => {
                let slot = self.converter.convert_val_to_slot(r)?;
                let next = self.slots.len();
                let index = *self.indices.entry(slot).or_insert(next);
                if index == next {
                    self.slots.push(slot);
                }
                Encoded::Slot {
                    index,
                    iface: r.label().to_string(),
                }
            }
        })
    }
}

fn decode(encoded: Encoded, slots: &[Slot], converter: &dyn SlotConverter) -> MarshalResult<Value> {
    Ok(match encoded {
        Encoded::Null => Value::Null,
        Encoded::Bool(b) => Value::Bool(b),
        Encoded::Int(n) => Value::Int(n),
        Encoded::Str(s) => Value::Str(s),
        Encoded::List(items) => Value::List(
            items
                .into_iter()
                .map(|e| decode(e, slots, converter))
                .collect::<MarshalResult<_>>()?,
        ),
        Encoded::Record(fields) => Value::Record(
            fields
                .into_iter()
                .map(|(k, e)| Ok((k, decode(e, slots, converter)?)))
                .collect::<MarshalResult<_>>()?,
        ),
        Encoded::Slot { index, iface } => {
            let slot = slots.get(index).ok_or(MarshalError::SlotIndexOutOfRange {
                index,
                len: slots.len(),
            })?;
            Value::Remotable(converter.convert_slot_to_val(slot, &iface)?)
        }
    })
}

/// Marshal a value into capdata, assigning slots through `converter`.
pub fn serialize(value: &Value, converter: &dyn SlotConverter) -> MarshalResult<CapData> {
    let mut encoder = Encoder {
        converter,
        slots: Vec::new(),
        indices: HashMap::new(),
    };
    let encoded = encoder.encode(value)?;
    let body =
        serde_json::to_string(&encoded).map_err(|e| MarshalError::Serialization(e.to_string()))?;
    Ok(CapData {
        body,
        slots: encoder.slots,
    })
}

/// Rebuild a value from capdata, resolving slots through `converter`.
pub fn unserialize(data: &CapData, converter: &dyn SlotConverter) -> MarshalResult<Value> {
    let encoded: Encoded =
        serde_json::from_str(&data.body).map_err(|e| MarshalError::Serialization(e.to_string()))?;
    decode(encoded, &data.slots, converter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Converter that hands out `o+N` slots and remembers both directions.
    #[derive(Default)]
    struct TableConverter {
        by_slot: RefCell<HashMap<Slot, Remotable>>,
        next: RefCell<u64>,
    }

    impl SlotConverter for TableConverter {
        fn convert_val_to_slot(&self, value: &Remotable) -> MarshalResult<Slot> {
            let mut by_slot = self.by_slot.borrow_mut();
            if let Some((slot, _)) = by_slot.iter().find(|(_, r)| *r == value) {
                return Ok(*slot);
            }
            let mut next = self.next.borrow_mut();
            *next += 1;
            let slot = Slot::export(*next);
            by_slot.insert(slot, value.clone());
            Ok(slot)
        }

        fn convert_slot_to_val(&self, slot: &Slot, _iface: &str) -> MarshalResult<Remotable> {
            self.by_slot
                .borrow()
                .get(slot)
                .cloned()
                .ok_or_else(|| MarshalError::Conversion(format!("unknown slot {slot}")))
        }
    }

    #[test]
    fn scalars_survive() {
        let conv = TableConverter::default();
        for value in [
            Value::Null,
            Value::from(true),
            Value::from(-17i64),
            Value::from(i64::MAX),
            Value::from("text with \"quotes\""),
        ] {
            let data = serialize(&value, &conv).unwrap();
            assert!(data.is_pure());
            assert_eq!(unserialize(&data, &conv).unwrap(), value);
        }
    }

    #[test]
    fn remotables_resolve_to_same_identity() {
        let conv = TableConverter::default();
        let r = Remotable::new("widget");
        let value = Value::List(vec![Value::from(r.clone()), Value::from(1i64)]);
        let data = serialize(&value, &conv).unwrap();
        assert_eq!(data.slots, vec![Slot::export(1)]);

        let back = unserialize(&data, &conv).unwrap();
        match back {
            Value::List(items) => assert_eq!(items[0], Value::from(r)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn repeated_remotable_uses_one_slot_entry() {
        let conv = TableConverter::default();
        let r = Remotable::new("twice");
        let other = Remotable::new("once");
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), Value::from(r.clone()));
        fields.insert("b".to_string(), Value::from(other));
        fields.insert("c".to_string(), Value::from(r));
        let data = serialize(&Value::Record(fields), &conv).unwrap();
        assert_eq!(data.slots.len(), 2);
    }

    #[test]
    fn out_of_range_slot_index() {
        let conv = TableConverter::default();
        let data = CapData {
            body: r#"{"slot":{"index":3,"iface":"x"}}"#.into(),
            slots: vec![Slot::export(1)],
        };
        assert_eq!(
            unserialize(&data, &conv).unwrap_err(),
            MarshalError::SlotIndexOutOfRange { index: 3, len: 1 }
        );
    }

    #[test]
    fn converter_failure_propagates() {
        let conv = TableConverter::default();
        let data = CapData {
            body: r#"{"slot":{"index":0,"iface":"x"}}"#.into(),
            slots: vec![Slot::import(9)],
        };
        assert!(matches!(
            unserialize(&data, &conv),
            Err(MarshalError::Conversion(_))
        ));
    }

    #[test]
    fn malformed_body() {
        let conv = TableConverter::default();
        let data = CapData {
            body: "{not json".into(),
            slots: vec![],
        };
        assert!(matches!(
            unserialize(&data, &conv),
            Err(MarshalError::Serialization(_))
        ));
    }
}
