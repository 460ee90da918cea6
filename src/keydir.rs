//! The in-memory key directory: a map from key to the location of that
//! key's most recent value. Never persisted — rebuilt from the segments
//! every time a `Store` is opened.

use std::collections::HashMap;
use std::sync::RwLock;

/// The directory's per-key record: where the value lives, and when it
/// was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryIndex {
    pub segment_id: u64,
    pub value_offset: u64,
    pub value_len: u32,
    pub timestamp: u64,
}

/// Maps live keys to their [`EntryIndex`]. Self-contained: it guards its
/// own map with an `RwLock` so it is safe to use on its own, even though
/// `Store` also wraps structural segment state in its own lock.
#[derive(Debug, Default)]
pub struct KeyDirectory {
    entries: RwLock<HashMap<Vec<u8>, EntryIndex>>,
}

impl KeyDirectory {
    pub fn new() -> Self {
        KeyDirectory {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<EntryIndex> {
        self.entries.read().unwrap().get(key).copied()
    }

    /// Inserts or unconditionally replaces the index for `key`. Callers
    /// are responsible for only calling `put` with an index that is at
    /// least as recent as any prior one for the same key.
    pub fn put(&self, key: Vec<u8>, index: EntryIndex) {
        self.entries.write().unwrap().insert(key, index);
    }

    /// Removes any mapping for `key`, returning whether one existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.entries.write().unwrap().remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A stable snapshot of the current key set. Out of scope for the
    /// public `Store` façade (listing is not specified there) but kept
    /// for this layer's own tests and for a future `Merge`/`ListKeys`
    /// implementation to build on.
    pub fn snapshot_keys(&self) -> Vec<Vec<u8>> {
        self.entries.read().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(segment_id: u64, value_offset: u64) -> EntryIndex {
        EntryIndex {
            segment_id,
            value_offset,
            value_len: 4,
            timestamp: 1,
        }
    }

    #[test]
    fn put_get_remove() {
        let dir = KeyDirectory::new();
        assert_eq!(dir.get(b"k"), None);

        dir.put(b"k".to_vec(), index(1, 20));
        assert_eq!(dir.get(b"k"), Some(index(1, 20)));

        dir.put(b"k".to_vec(), index(2, 60));
        assert_eq!(dir.get(b"k"), Some(index(2, 60)));

        assert!(dir.remove(b"k"));
        assert_eq!(dir.get(b"k"), None);
        assert!(!dir.remove(b"k"));
    }

    #[test]
    fn snapshot_keys_reflects_current_set() {
        let dir = KeyDirectory::new();
        dir.put(b"a".to_vec(), index(1, 0));
        dir.put(b"b".to_vec(), index(1, 10));
        dir.remove(b"a");

        let mut keys = dir.snapshot_keys();
        keys.sort();
        assert_eq!(keys, vec![b"b".to_vec()]);
    }
}
