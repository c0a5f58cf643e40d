//! BTree index implementation
//!
//! BTreeMap-based index with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::data::LogRecordPos;

use super::Indexer;

/// Ordered key → position map
///
/// ## Concurrency:
/// - `get`, `list_keys`, `snapshot`: shared (read) lock, run in parallel
/// - `put`, `delete`: exclusive (write) lock
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, LogRecordPos>>,
}

impl BTreeIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool {
        self.tree.write().insert(key, pos);
        true
    }

    fn get(&self, key: &[u8]) -> Option<LogRecordPos> {
        self.tree.read().get(key).copied()
    }

    fn delete(&self, key: &[u8]) -> bool {
        self.tree.write().remove(key).is_some()
    }

    fn list_keys(&self) -> Vec<Vec<u8>> {
        self.tree.read().keys().cloned().collect()
    }

    fn snapshot(&self) -> Vec<(Vec<u8>, LogRecordPos)> {
        self.tree
            .read()
            .iter()
            .map(|(key, pos)| (key.clone(), *pos))
            .collect()
    }

    fn len(&self) -> usize {
        self.tree.read().len()
    }
}
