use serde::{Deserialize, Serialize};
use vos_types::Slot;

use crate::error::{MarshalError, MarshalResult};

/// A marshaled value: JSON body plus the slots it refers to.
///
/// The body never contains slot text directly; it refers to positions in
/// `slots`. Each distinct slot appears once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapData {
    pub body: String,
    pub slots: Vec<Slot>,
}

impl CapData {
    /// Encode as a single JSON string suitable for a store value.
    pub fn to_json(&self) -> MarshalResult<String> {
        serde_json::to_string(self).map_err(|e| MarshalError::Serialization(e.to_string()))
    }

    /// Decode from the form produced by [`CapData::to_json`].
    pub fn from_json(text: &str) -> MarshalResult<Self> {
        serde_json::from_str(text).map_err(|e| MarshalError::Serialization(e.to_string()))
    }

    /// Returns `true` if the value refers to no slots at all.
    pub fn is_pure(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelope() {
        let data = CapData {
            body: "\"null\"".into(),
            slots: vec![Slot::export(1), Slot::virtual_instance(2, 3, false)],
        };
        let text = data.to_json().unwrap();
        assert!(text.contains("\"o+2/3\""));
        assert_eq!(CapData::from_json(&text).unwrap(), data);
    }

    #[test]
    fn bad_slot_text_is_rejected() {
        let err = CapData::from_json(r#"{"body":"\"null\"","slots":["bogus"]}"#).unwrap_err();
        assert!(matches!(err, MarshalError::Serialization(_)));
    }

    #[test]
    fn purity() {
        let data = CapData {
            body: "\"null\"".into(),
            slots: vec![],
        };
        assert!(data.is_pure());
    }
}
