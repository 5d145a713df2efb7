use serde::{Deserialize, Serialize};

/// Default number of resident object states.
pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Configuration for a [`VirtualObjectManager`](crate::VirtualObjectManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VomConfig {
    /// Maximum number of resident states. Values below 1 are treated as 1.
    pub cache_size: usize,
}

impl Default for VomConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
        }
    }
}

impl VomConfig {
    pub fn with_cache_size(cache_size: usize) -> Self {
        Self { cache_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(VomConfig::default().cache_size, 100);
        let parsed: VomConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, VomConfig::default());
        let parsed: VomConfig = serde_json::from_str(r#"{"cache_size":3}"#).unwrap();
        assert_eq!(parsed, VomConfig::with_cache_size(3));
    }
}
