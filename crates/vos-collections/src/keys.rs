//! Order-preserving encoding of collection keys.
//!
//! Every encoded key starts with a one-character type tag, and every tag
//! sorts below `{`. Metadata lives under `|`-prefixed names, which sort
//! above `{`, so the entry range of a collection is exactly
//! `[prefix, prefix + "{")`.
//!
//! | tag | key                  | encoding                         |
//! |-----|----------------------|----------------------------------|
//! | `b` | bool                 | `b0` / `b1`                      |
//! | `i` | int                  | 16 hex digits, sign bit flipped  |
//! | `r` | remotable (strong)   | `r<20-digit ordinal>:<slot>`     |
//! | `r` | remotable (weak)     | `r<slot>`                        |
//! | `s` | string               | `s<text>`                        |
//! | `z` | null                 | `z`                              |
//!
//! Across types, keys order by tag.

use vos_types::{Slot, Value};

use crate::error::{CollectionError, Result};

/// Exclusive upper bound suffix for a collection's entry range.
pub const ENTRY_RANGE_END: &str = "{";

const SIGN_BIT: u64 = 1 << 63;

/// A key read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedKey {
    Scalar(Value),
    Remotable(Slot),
}

/// Encode a non-remotable scalar key.
pub fn encode_scalar(key: &Value) -> Result<String> {
    match key {
        Value::Null => Ok("z".to_string()),
        Value::Bool(b) => Ok(if *b { "b1" } else { "b0" }.to_string()),
        Value::Int(n) => Ok(format!("i{:016x}", (*n as u64) ^ SIGN_BIT)),
        Value::Str(s) => Ok(format!("s{s}")),
        Value::Remotable(_) => Err(CollectionError::InvalidKey(
            "remotable keys are encoded by slot".to_string(),
        )),
        other => Err(CollectionError::InvalidKey(format!(
            "{} is not a scalar",
            other.type_name()
        ))),
    }
}

/// Encode a remotable key for an iterable collection.
pub fn encode_remotable_ordered(ordinal: u64, slot: &Slot) -> String {
    format!("r{ordinal:020}:{slot}")
}

/// Encode a remotable key for a weak collection.
pub fn encode_remotable_unordered(slot: &Slot) -> String {
    format!("r{slot}")
}

fn corrupt(encoded: &str, reason: impl Into<String>) -> CollectionError {
    CollectionError::Corrupt {
        key: encoded.to_string(),
        reason: reason.into(),
    }
}

/// Decode an encoded key (without the collection prefix).
pub fn decode_key(encoded: &str) -> Result<DecodedKey> {
    let mut chars = encoded.chars();
    let tag = chars.next().ok_or_else(|| corrupt(encoded, "empty key"))?;
    let rest = chars.as_str();
    let scalar = match tag {
        'z' if rest.is_empty() => Value::Null,
        'b' => match rest {
            "0" => Value::Bool(false),
            "1" => Value::Bool(true),
            _ => return Err(corrupt(encoded, "bad bool")),
        },
        'i' => {
            if rest.len() != 16 {
                return Err(corrupt(encoded, "bad int width"));
            }
            let bits = u64::from_str_radix(rest, 16).map_err(|e| corrupt(encoded, e.to_string()))?;
            Value::Int((bits ^ SIGN_BIT) as i64)
        }
        's' => Value::Str(rest.to_string()),
        'r' => {
            let slot_text = match rest.split_once(':') {
                Some((_ordinal, slot)) => slot,
                None => rest,
            };
            let slot = slot_text
                .parse::<Slot>()
                .map_err(|e| corrupt(encoded, e.to_string()))?;
            return Ok(DecodedKey::Remotable(slot));
        }
        _ => return Err(corrupt(encoded, "unknown key tag")),
    };
    Ok(DecodedKey::Scalar(scalar))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vos_types::Remotable;

    fn decoded(value: Value) -> DecodedKey {
        DecodedKey::Scalar(value)
    }

    #[test]
    fn scalar_forms() {
        assert_eq!(encode_scalar(&Value::Null).unwrap(), "z");
        assert_eq!(encode_scalar(&Value::Bool(true)).unwrap(), "b1");
        assert_eq!(encode_scalar(&Value::Int(0)).unwrap(), "i8000000000000000");
        assert_eq!(encode_scalar(&Value::Int(-1)).unwrap(), "i7fffffffffffffff");
        assert_eq!(encode_scalar(&Value::from("abc")).unwrap(), "sabc");
    }

    #[test]
    fn decode_scalars() {
        for v in [
            Value::Null,
            Value::Bool(false),
            Value::Int(i64::MIN),
            Value::Int(42),
            Value::from(""),
            Value::from("with:colon"),
        ] {
            let enc = encode_scalar(&v).unwrap();
            assert_eq!(decode_key(&enc).unwrap(), decoded(v));
        }
    }

    #[test]
    fn remotable_forms() {
        let slot = Slot::virtual_instance(3, 7, false);
        let ordered = encode_remotable_ordered(12, &slot);
        assert_eq!(ordered, "r00000000000000000012:o+3/7");
        assert_eq!(decode_key(&ordered).unwrap(), DecodedKey::Remotable(slot));
        let unordered = encode_remotable_unordered(&slot);
        assert_eq!(unordered, "ro+3/7");
        assert_eq!(decode_key(&unordered).unwrap(), DecodedKey::Remotable(slot));
    }

    #[test]
    fn rejects_non_scalars() {
        assert!(matches!(
            encode_scalar(&Value::List(vec![])),
            Err(CollectionError::InvalidKey(_))
        ));
        assert!(matches!(
            encode_scalar(&Value::from(Remotable::new("r"))),
            Err(CollectionError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_corrupt_keys() {
        for bad in ["", "q", "b2", "i123", "ixyzxyzxyzxyzxyz", "z1", "rnot-a-slot"] {
            assert!(decode_key(bad).is_err(), "{bad:?} should not decode");
        }
    }

    #[test]
    fn every_tag_sorts_below_range_end() {
        let slot = Slot::export(1);
        for enc in [
            encode_scalar(&Value::Null).unwrap(),
            encode_scalar(&Value::Bool(true)).unwrap(),
            encode_scalar(&Value::Int(i64::MAX)).unwrap(),
            encode_scalar(&Value::from("\u{10FFFF}")).unwrap(),
            encode_remotable_ordered(u64::MAX, &slot),
        ] {
            assert!(enc.as_str() < ENTRY_RANGE_END, "{enc:?}");
            assert!(enc.as_str() < "|");
        }
    }

    proptest! {
        #[test]
        fn ordinal_order_is_preserved(a: u64, b: u64) {
            let slot = Slot::export(1);
            let ea = encode_remotable_ordered(a, &slot);
            let eb = encode_remotable_ordered(b, &slot);
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn int_order_is_preserved(a: i64, b: i64) {
            let ea = encode_scalar(&Value::Int(a)).unwrap();
            let eb = encode_scalar(&Value::Int(b)).unwrap();
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn string_order_is_preserved(a in ".{0,8}", b in ".{0,8}") {
            let ea = encode_scalar(&Value::from(a.as_str())).unwrap();
            let eb = encode_scalar(&Value::from(b.as_str())).unwrap();
            prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));
        }

        #[test]
        fn ints_decode_back(n: i64) {
            let enc = encode_scalar(&Value::Int(n)).unwrap();
            prop_assert_eq!(decode_key(&enc).unwrap(), DecodedKey::Scalar(Value::Int(n)));
        }
    }
}
