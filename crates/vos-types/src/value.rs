use std::collections::BTreeMap;

use crate::error::TypeError;
use crate::remotable::Remotable;

/// A value that can be stored in a virtual object field or a collection.
///
/// Remotables compare by identity; everything else compares structurally.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    Remotable(Remotable),
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Remotable(_) => "remotable",
        }
    }

    /// Returns `true` for values with no nested structure.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Record(_))
    }

    pub fn as_int(&self) -> Result<i64, TypeError> {
        match self {
            Self::Int(n) => Ok(*n),
            other => Err(other.mismatch("int")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, TypeError> {
        match self {
            Self::Bool(b) => Ok(*b),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_str(&self) -> Result<&str, TypeError> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_remotable(&self) -> Result<&Remotable, TypeError> {
        match self {
            Self::Remotable(r) => Ok(r),
            other => Err(other.mismatch("remotable")),
        }
    }

    /// Visit every remotable reachable from this value, depth first.
    pub fn for_each_remotable(&self, f: &mut impl FnMut(&Remotable)) {
        match self {
            Self::Remotable(r) => f(r),
            Self::List(items) => items.iter().for_each(|v| v.for_each_remotable(f)),
            Self::Record(fields) => fields.values().for_each(|v| v.for_each_remotable(f)),
            _ => {}
        }
    }

    fn mismatch(&self, expected: &'static str) -> TypeError {
        TypeError::UnexpectedValue {
            expected,
            found: self.type_name(),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Remotable> for Value {
    fn from(r: Remotable) -> Self {
        Self::Remotable(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Self::Record(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert_eq!(Value::from(3i64).as_int(), Ok(3));
        assert_eq!(Value::from("hi").as_str(), Ok("hi"));
        assert_eq!(Value::from(true).as_bool(), Ok(true));
        assert_eq!(
            Value::Null.as_int(),
            Err(TypeError::UnexpectedValue {
                expected: "int",
                found: "null"
            })
        );
    }

    #[test]
    fn remotables_compare_by_identity() {
        let a = Remotable::new("same label");
        let b = Remotable::new("same label");
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn scalar_classification() {
        assert!(Value::Null.is_scalar());
        assert!(Value::from(Remotable::new("r")).is_scalar());
        assert!(!Value::List(vec![]).is_scalar());
        assert!(!Value::Record(BTreeMap::new()).is_scalar());
    }

    #[test]
    fn visits_nested_remotables() {
        let a = Remotable::new("a");
        let b = Remotable::new("b");
        let mut fields = BTreeMap::new();
        fields.insert("inner".to_string(), Value::from(b.clone()));
        let value = Value::List(vec![Value::from(a.clone()), Value::Record(fields), Value::from(1i64)]);

        let mut seen = Vec::new();
        value.for_each_remotable(&mut |r| seen.push(r.clone()));
        assert_eq!(seen, vec![a, b]);
    }
}
