use serde::{Deserialize, Serialize};

/// How the registry holds the values it binds.
///
/// Defaults to [`Weak`](Retention::Weak), so unreferenced representatives
/// are collected in production. Pick [`Strong`](Retention::Strong) (or
/// [`RegistryConfig::strong`]) explicitly when every value must stay
/// inspectable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retention {
    /// The registry owns a handle; bound values are never reclaimed.
    /// Useful for debugging and for tests that inspect everything.
    Strong,
    /// The registry keeps a non-owning back-reference; a value disappears
    /// from lookups once its last outside handle drops.
    #[default]
    Weak,
}

/// Configuration for a [`SlotRegistry`](crate::SlotRegistry).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub retention: Retention,
}

impl RegistryConfig {
    /// A registry that keeps every bound value alive.
    pub fn strong() -> Self {
        Self {
            retention: Retention::Strong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_weak() {
        assert_eq!(RegistryConfig::default().retention, Retention::Weak);
        assert_eq!(RegistryConfig::strong().retention, Retention::Strong);
    }

    #[test]
    fn omitted_retention_reads_as_weak() {
        let config: RegistryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.retention, Retention::Weak);
        let strong: RegistryConfig = serde_json::from_str(r#"{"retention":"strong"}"#).unwrap();
        assert_eq!(strong, RegistryConfig::strong());
    }

    #[test]
    fn retention_serializes_lowercase() {
        let json = serde_json::to_string(&RegistryConfig::strong()).unwrap();
        assert_eq!(json, r#"{"retention":"strong"}"#);
    }
}
