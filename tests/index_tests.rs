//! Tests for the in-memory index
//!
//! These tests verify:
//! - put/get/delete semantics of the BTree index
//! - Ordered key listing and snapshots
//! - Concurrent readers alongside a writer

use std::sync::Arc;
use std::thread;

use caskdb::data::LogRecordPos;
use caskdb::index::{new_indexer, BTreeIndex, IndexType, Indexer};

fn pos(file_id: u32, offset: u64) -> LogRecordPos {
    LogRecordPos { file_id, offset }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_put_and_get() {
    let index = BTreeIndex::new();

    assert!(index.put(b"a".to_vec(), pos(1, 10)));
    assert!(index.put(b"b".to_vec(), pos(1, 20)));

    assert_eq!(index.get(b"a"), Some(pos(1, 10)));
    assert_eq!(index.get(b"b"), Some(pos(1, 20)));
    assert_eq!(index.get(b"c"), None);
}

#[test]
fn test_put_overwrites() {
    let index = BTreeIndex::new();

    index.put(b"key".to_vec(), pos(0, 0));
    index.put(b"key".to_vec(), pos(3, 128));

    assert_eq!(index.get(b"key"), Some(pos(3, 128)));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_delete_reports_presence() {
    let index = BTreeIndex::new();
    index.put(b"key".to_vec(), pos(0, 0));

    assert!(index.delete(b"key"));
    assert!(!index.delete(b"key"));
    assert!(!index.delete(b"never"));
    assert_eq!(index.get(b"key"), None);
    assert!(index.is_empty());
}

#[test]
fn test_list_keys_sorted() {
    let index = BTreeIndex::new();
    for key in ["pear", "apple", "fig", "banana"] {
        index.put(key.as_bytes().to_vec(), pos(0, 0));
    }

    let keys = index.list_keys();
    assert_eq!(
        keys,
        vec![
            b"apple".to_vec(),
            b"banana".to_vec(),
            b"fig".to_vec(),
            b"pear".to_vec()
        ]
    );
}

#[test]
fn test_snapshot_is_detached() {
    let index = BTreeIndex::new();
    index.put(b"a".to_vec(), pos(0, 1));
    index.put(b"b".to_vec(), pos(0, 2));

    let snapshot = index.snapshot();
    index.delete(b"a");

    assert_eq!(
        snapshot,
        vec![(b"a".to_vec(), pos(0, 1)), (b"b".to_vec(), pos(0, 2))]
    );
    assert_eq!(index.len(), 1);
}

#[test]
fn test_new_indexer_btree() {
    let index = new_indexer(IndexType::BTree);
    index.put(b"k".to_vec(), pos(2, 4));
    assert_eq!(index.get(b"k"), Some(pos(2, 4)));
    assert_eq!(IndexType::default(), IndexType::BTree);
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_concurrent_reads_during_writes() {
    let index = Arc::new(BTreeIndex::new());
    for i in 0..100u64 {
        index.put(format!("stable{}", i).into_bytes(), pos(0, i));
    }

    let mut handles = vec![];

    for _ in 0..8 {
        let idx = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for _ in 0..50 {
                for i in 0..100u64 {
                    let key = format!("stable{}", i);
                    assert_eq!(idx.get(key.as_bytes()), Some(pos(0, i)));
                }
            }
        }));
    }

    let writer = Arc::clone(&index);
    handles.push(thread::spawn(move || {
        for i in 0..1000u64 {
            let key = format!("churn{}", i % 10).into_bytes();
            writer.put(key.clone(), pos(1, i));
            if i % 3 == 0 {
                writer.delete(&key);
            }
        }
    }));

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(index.len() >= 100);
}
