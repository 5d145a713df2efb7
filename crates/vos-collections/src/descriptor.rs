use std::fmt;

use serde::{Deserialize, Serialize};

/// The four collection flavors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionVariant {
    #[serde(rename = "scalarMapStore")]
    MapStore,
    #[serde(rename = "scalarWeakMapStore")]
    WeakMapStore,
    #[serde(rename = "scalarSetStore")]
    SetStore,
    #[serde(rename = "scalarWeakSetStore")]
    WeakSetStore,
}

impl CollectionVariant {
    pub const ALL: [Self; 4] = [
        Self::MapStore,
        Self::WeakMapStore,
        Self::SetStore,
        Self::WeakSetStore,
    ];

    /// Weak collections cannot be iterated or counted.
    pub fn is_weak(self) -> bool {
        matches!(self, Self::WeakMapStore | Self::WeakSetStore)
    }

    pub fn is_set(self) -> bool {
        matches!(self, Self::SetStore | Self::WeakSetStore)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::MapStore => "scalarMapStore",
            Self::WeakMapStore => "scalarWeakMapStore",
            Self::SetStore => "scalarSetStore",
            Self::WeakSetStore => "scalarWeakSetStore",
        }
    }
}

impl fmt::Display for CollectionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted description of one collection, stored at `vc.<id>.|schemata`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    pub label: String,
    pub variant: CollectionVariant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(CollectionVariant::WeakMapStore.is_weak());
        assert!(!CollectionVariant::MapStore.is_weak());
        assert!(CollectionVariant::SetStore.is_set());
        assert!(!CollectionVariant::WeakMapStore.is_set());
    }

    #[test]
    fn descriptor_json_uses_variant_names() {
        let d = CollectionDescriptor {
            label: "balances".into(),
            variant: CollectionVariant::WeakSetStore,
        };
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"label":"balances","variant":"scalarWeakSetStore"}"#);
        assert_eq!(serde_json::from_str::<CollectionDescriptor>(&json).unwrap(), d);
    }

    #[test]
    fn display_matches_name() {
        for v in CollectionVariant::ALL {
            assert_eq!(v.to_string(), v.name());
        }
    }
}
