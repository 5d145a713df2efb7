use crate::error::{StoreError, StoreResult};

/// Per-iteration resumption state for [`KvStore::get_after_from`].
///
/// Remembers the last key a range query returned and where it sat in the
/// store's sorted snapshot. The `generation` ties the position to one
/// snapshot; any insert or delete makes it stale.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanCursor {
    position: Option<CursorPosition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct CursorPosition {
    key: String,
    index: usize,
    generation: u64,
}

impl ScanCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `prior_key` in snapshot `generation`, if this cursor last
    /// stopped there.
    pub fn resume_index(&self, prior_key: &str, generation: u64) -> Option<usize> {
        self.position
            .as_ref()
            .filter(|p| p.generation == generation && p.key == prior_key)
            .map(|p| p.index)
    }

    /// The last key returned through this cursor.
    pub fn last_key(&self) -> Option<&str> {
        self.position.as_ref().map(|p| p.key.as_str())
    }

    pub fn advance(&mut self, key: &str, index: usize, generation: u64) {
        self.position = Some(CursorPosition {
            key: key.to_string(),
            index,
            generation,
        });
    }

    pub fn reset(&mut self) {
        self.position = None;
    }
}

/// Reject ranges whose start sorts after their end.
pub fn check_range(start: &str, end: &str) -> StoreResult<()> {
    if start > end {
        return Err(StoreError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

/// Synchronous ordered key-value store.
///
/// All implementations must satisfy these invariants:
/// - `get`/`set`/`delete` are atomic and immediately visible to later calls.
/// - Keys order by plain string comparison.
/// - `get_after` never returns a key outside `[start, end)` and never
///   returns a key that has been deleted.
pub trait KvStore: Send + Sync {
    /// Read the value stored at `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Create or overwrite `key`.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`. Deleting a missing key is a no-op.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Smallest key `k` with `prior_key < k`, `start <= k`, `k < end`.
    ///
    /// Returns `Ok(None)` when no such key exists and
    /// `Err(StoreError::InvalidRange)` when `start > end`. Calling again with
    /// the key just returned as `prior_key` must not rescan from the start.
    fn get_after(
        &self,
        prior_key: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Option<(String, String)>>;

    /// [`get_after`](KvStore::get_after) with caller-owned resumption state.
    ///
    /// Independent iterations over the same range each keep their own
    /// cursor and do not disturb one another. The default implementation
    /// ignores the cursor.
    fn get_after_from(
        &self,
        cursor: &mut ScanCursor,
        prior_key: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Option<(String, String)>> {
        let _ = cursor;
        self.get_after(prior_key, start, end)
    }

    /// Check whether `key` exists.
    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_resumes_only_on_matching_key_and_generation() {
        let mut cursor = ScanCursor::new();
        assert_eq!(cursor.resume_index("a", 0), None);

        cursor.advance("a", 3, 7);
        assert_eq!(cursor.resume_index("a", 7), Some(3));
        assert_eq!(cursor.resume_index("b", 7), None);
        assert_eq!(cursor.resume_index("a", 8), None);
        assert_eq!(cursor.last_key(), Some("a"));

        cursor.reset();
        assert_eq!(cursor.resume_index("a", 7), None);
    }

    #[test]
    fn range_check() {
        assert!(check_range("a", "b").is_ok());
        assert!(check_range("a", "a").is_ok());
        assert_eq!(
            check_range("b", "a"),
            Err(StoreError::InvalidRange {
                start: "b".into(),
                end: "a".into()
            })
        );
    }
}
