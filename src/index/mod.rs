//! Index Module
//!
//! In-memory map from key to the location of its latest record.
//!
//! ## Responsibilities
//! - Answer "does this key exist and where" without touching disk
//! - Safe for concurrent readers alongside the single writer
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys (cheap `list_keys` and ordered `fold`)
//! - Mutations are bounded by disk append throughput, so one lock is enough

pub mod btree;

use serde::{Deserialize, Serialize};

use crate::data::LogRecordPos;

pub use btree::BTreeIndex;

/// Capabilities every index backend provides
pub trait Indexer: Send + Sync {
    /// Insert or overwrite the location of `key`.
    /// Returns false if the backend could not store it.
    fn put(&self, key: Vec<u8>, pos: LogRecordPos) -> bool;

    /// Location of `key`, if present
    fn get(&self, key: &[u8]) -> Option<LogRecordPos>;

    /// Remove `key`, returning whether it was present
    fn delete(&self, key: &[u8]) -> bool;

    /// All keys in ascending order
    fn list_keys(&self) -> Vec<Vec<u8>>;

    /// Point-in-time copy of every entry, in key order
    fn snapshot(&self) -> Vec<(Vec<u8>, LogRecordPos)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Available index implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexType {
    /// Ordered map behind a reader/writer lock
    #[default]
    BTree,
}

/// Build the index selected by `index_type`
pub fn new_indexer(index_type: IndexType) -> Box<dyn Indexer> {
    match index_type {
        IndexType::BTree => Box::new(BTreeIndex::new()),
    }
}
