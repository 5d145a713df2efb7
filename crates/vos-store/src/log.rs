//! Operation log and counters for store instrumentation.

use std::fmt;

/// One recorded store operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Get {
        key: String,
        result: Option<String>,
    },
    Set {
        key: String,
        value: String,
    },
    Delete {
        key: String,
    },
    GetAfter {
        prior_key: String,
        start: String,
        end: String,
        result: Option<(String, String)>,
    },
}

impl StoreOp {
    /// The key the operation touched (the returned key for range queries).
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Get { key, .. } | Self::Set { key, .. } | Self::Delete { key } => Some(key),
            Self::GetAfter { result, .. } => result.as_ref().map(|(k, _)| k.as_str()),
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Set { .. } | Self::Delete { .. })
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get { key, result } => write!(f, "get {key} => {result:?}"),
            Self::Set { key, value } => write!(f, "set {key} {value}"),
            Self::Delete { key } => write!(f, "delete {key}"),
            Self::GetAfter {
                prior_key,
                start,
                end,
                result,
            } => write!(f, "getAfter {prior_key:?} {start:?} {end:?} => {result:?}"),
        }
    }
}

/// Counters kept by [`InMemoryKvStore`](crate::InMemoryKvStore).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub range_queries: u64,
    /// Range queries that located their start by searching the snapshot.
    pub rescans: u64,
    /// Range queries that continued from a remembered position.
    pub resumptions: u64,
    /// Times the sorted key snapshot was rebuilt.
    pub snapshot_builds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_log_format() {
        let op = StoreOp::Set {
            key: "vom.o+1/1".into(),
            value: "{}".into(),
        };
        assert_eq!(op.to_string(), "set vom.o+1/1 {}");
        assert!(op.is_write());

        let op = StoreOp::GetAfter {
            prior_key: "".into(),
            start: "a".into(),
            end: "z".into(),
            result: None,
        };
        assert_eq!(op.to_string(), "getAfter \"\" \"a\" \"z\" => None");
        assert_eq!(op.key(), None);
        assert!(!op.is_write());
    }
}
