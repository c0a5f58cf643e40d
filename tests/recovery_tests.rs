//! Tests for startup recovery
//!
//! These tests verify:
//! - Close/reopen reproduces the same visible state
//! - Deletes survive restarts
//! - Partial writes at a file tail are cut off (truncated tail tolerance)
//! - Corruption inside a file refuses to open
//! - Active file selection after restart

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use bytes::Bytes;
use caskdb::config::{Config, SyncPolicy};
use caskdb::data::LogRecord;
use caskdb::engine::Engine;
use caskdb::{CaskError, DecodeError};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_engine(dir: &Path, max_active_file_size: u64) -> Engine {
    init_tracing();
    let config = Config::builder()
        .data_dir(dir)
        .sync_policy(SyncPolicy::EveryWrite)
        .max_active_file_size(max_active_file_size)
        .build();
    Engine::open(config).unwrap()
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

fn data_file(dir: &Path, file_id: u32) -> std::path::PathBuf {
    dir.join(format!("{:09}.data", file_id))
}

// =============================================================================
// Restart Tests
// =============================================================================

#[test]
fn test_put_delete_close_reopen() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.delete(b"a").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), Some(Bytes::from_static(b"2")));

    let recovery = engine.recovery_result();
    assert_eq!(recovery.files_scanned, 1);
    assert_eq!(recovery.records_replayed, 2);
    assert_eq!(recovery.tombstones_replayed, 1);
    assert!(!recovery.was_truncated());
}

#[test]
fn test_recovery_equivalence_across_rotations() {
    let temp_dir = TempDir::new().unwrap();
    let mut expected: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

    let engine = open_engine(temp_dir.path(), 256);
    for i in 0..200u32 {
        let key = format!("key{}", i % 37).into_bytes();
        if i % 5 == 3 {
            engine.delete(&key).unwrap();
            expected.remove(&key);
        } else {
            let val = format!("value{}", i).into_bytes();
            engine.put(&key, &val).unwrap();
            expected.insert(key, val);
        }
    }
    let files_before = engine.file_ids();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 256);
    assert!(files_before.len() > 1);
    assert_eq!(engine.file_ids(), files_before);

    for i in 0..37 {
        let key = format!("key{}", i).into_bytes();
        let got = engine.get(&key).unwrap().map(|v| v.to_vec());
        assert_eq!(got, expected.get(&key).cloned(), "key{}", i);
    }
    let keys: Vec<Vec<u8>> = engine
        .list_keys()
        .unwrap()
        .into_iter()
        .map(|k| k.to_vec())
        .collect();
    assert_eq!(keys, expected.keys().cloned().collect::<Vec<_>>());
}

#[test]
fn test_tombstone_in_later_file_hides_earlier_value() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 32);
    engine.put(b"victim", b"alive").unwrap();
    engine.put(b"filler", b"xxxxxxxxxxxxxxxx").unwrap();
    engine.delete(b"victim").unwrap();
    assert!(engine.file_ids().len() >= 2);
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 32);
    assert_eq!(engine.get(b"victim").unwrap(), None);
    assert_eq!(
        engine.get(b"filler").unwrap(),
        Some(Bytes::from_static(b"xxxxxxxxxxxxxxxx"))
    );
}

#[test]
fn test_writes_continue_after_restart() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"first", b"1").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"second", b"2").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.file_ids(), vec![0]);
    assert_eq!(engine.get(b"first").unwrap(), Some(Bytes::from_static(b"1")));
    assert_eq!(engine.get(b"second").unwrap(), Some(Bytes::from_static(b"2")));
}

#[test]
fn test_full_active_file_rotates_on_open() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 20);
    engine.put(b"key", b"value").unwrap(); // 21 bytes, over the threshold
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 20);
    assert_eq!(engine.file_ids(), vec![0, 1]);
    assert_eq!(engine.active_file_id(), Some(1));
    assert_eq!(engine.get(b"key").unwrap(), Some(Bytes::from_static(b"value")));
}

// =============================================================================
// Partial Write Tests
// =============================================================================

#[test]
fn test_truncated_tail_is_ignored_and_cut() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.close().unwrap();

    let path = data_file(temp_dir.path(), 0);
    let valid_len = fs::metadata(&path).unwrap().len();
    append_raw(&path, &[0xDE, 0xAD, 0xBE, 0xEF, 0x01]);

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.get(b"a").unwrap(), Some(Bytes::from_static(b"1")));
    assert_eq!(engine.get(b"b").unwrap(), Some(Bytes::from_static(b"2")));
    assert_eq!(engine.recovery_result().bytes_truncated, 5);
    assert_eq!(fs::metadata(&path).unwrap().len(), valid_len);

    // New records land on the clean boundary and survive another restart
    engine.put(b"c", b"3").unwrap();
    engine.close().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.get(b"c").unwrap(), Some(Bytes::from_static(b"3")));
    assert!(!engine.recovery_result().was_truncated());
}

#[test]
fn test_half_written_record_is_cut() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"kept", b"yes").unwrap();
    engine.close().unwrap();

    // A full header whose key/value never made it to disk
    let path = data_file(temp_dir.path(), 0);
    let partial = LogRecord::normal("lost", "never-acknowledged").encode();
    append_raw(&path, &partial[..partial.len() - 4]);

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.get(b"kept").unwrap(), Some(Bytes::from_static(b"yes")));
    assert_eq!(engine.get(b"lost").unwrap(), None);
    assert_eq!(
        engine.recovery_result().bytes_truncated,
        (partial.len() - 4) as u64
    );
}

#[test]
fn test_append_then_crash_before_index_update_is_recovered() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"a", b"1").unwrap();
    engine.close().unwrap();

    // The record reached the file but the process died before indexing it
    append_raw(
        &data_file(temp_dir.path(), 0),
        &LogRecord::normal("a", "2").encode(),
    );

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.get(b"a").unwrap(), Some(Bytes::from_static(b"2")));
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_interior_corruption_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.put(b"c", b"3").unwrap();
    engine.close().unwrap();

    // Flip the value byte of the first record (13 header + 1 key)
    let path = data_file(temp_dir.path(), 0);
    let mut bytes = fs::read(&path).unwrap();
    bytes[14] ^= 0x40;
    fs::write(&path, &bytes).unwrap();

    init_tracing();
    let result = Engine::open_path(temp_dir.path());
    match result {
        Err(CaskError::Corruption {
            file_id,
            offset,
            source,
        }) => {
            assert_eq!(file_id, 0);
            assert_eq!(offset, 0);
            assert!(matches!(source, DecodeError::ChecksumMismatch { .. }));
        }
        Err(other) => panic!("expected corruption, got {:?}", other),
        Ok(_) => panic!("expected corruption, engine opened"),
    }
}

#[test]
fn test_oversized_interior_key_length_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    engine.put(b"a", b"1").unwrap();
    engine.put(b"x", b"y").unwrap();
    engine.delete(b"a").unwrap();
    engine.close().unwrap();

    // High byte of the second record's key_len (offset 15 + 5 + 3)
    let path = data_file(temp_dir.path(), 0);
    let mut bytes = fs::read(&path).unwrap();
    let len_before = bytes.len() as u64;
    bytes[23] = 0x80;
    fs::write(&path, &bytes).unwrap();

    init_tracing();
    match Engine::open_path(temp_dir.path()) {
        Err(CaskError::Corruption {
            file_id,
            offset,
            source,
        }) => {
            assert_eq!(file_id, 0);
            assert_eq!(offset, 15);
            assert!(matches!(source, DecodeError::LengthOutOfBounds { .. }));
        }
        Err(other) => panic!("expected corruption, got {:?}", other),
        Ok(_) => panic!("expected corruption, engine opened"),
    }

    // Nothing was cut: the tombstone for "a" is still on disk
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}

#[test]
fn test_cut_short_record_in_older_file_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();

    let engine = open_engine(temp_dir.path(), 32);
    engine.put(b"a", b"1").unwrap();
    engine.put(b"x", b"y").unwrap();
    engine.put(b"c", b"3").unwrap();
    engine.put(b"d", b"4").unwrap(); // rotates into file 1
    assert_eq!(engine.file_ids(), vec![0, 1]);
    engine.close().unwrap();

    // Second record of file 0 now claims a value running past the file end,
    // while staying within the configured limits
    let path = data_file(temp_dir.path(), 0);
    let mut bytes = fs::read(&path).unwrap();
    let len_before = bytes.len() as u64;
    bytes[24..28].copy_from_slice(&1000u32.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    init_tracing();
    match Engine::open_path(temp_dir.path()) {
        Err(CaskError::Corruption {
            file_id,
            offset,
            source,
        }) => {
            assert_eq!(file_id, 0);
            assert_eq!(offset, 15);
            assert!(matches!(source, DecodeError::Truncated { .. }));
        }
        Err(other) => panic!("expected corruption, got {:?}", other),
        Ok(_) => panic!("expected corruption, engine opened"),
    }
    assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
}

#[test]
fn test_data_dir_that_is_a_file_is_unreadable() {
    let temp_dir = TempDir::new().unwrap();
    let not_a_dir = temp_dir.path().join("plain-file");
    fs::write(&not_a_dir, b"not a directory").unwrap();

    init_tracing();
    assert!(matches!(
        Engine::open_path(&not_a_dir),
        Err(CaskError::DirectoryUnreadable { .. })
    ));
}

#[test]
fn test_unexpected_data_file_name_refuses_to_open() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("not-a-number.data"), b"").unwrap();

    init_tracing();
    assert!(matches!(
        Engine::open_path(temp_dir.path()),
        Err(CaskError::DataDirCorrupted(_))
    ));
}

#[test]
fn test_unrelated_files_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("README.txt"), b"hello").unwrap();
    fs::write(temp_dir.path().join("000000005.hint"), b"ignored").unwrap();

    let engine = open_engine(temp_dir.path(), 1024 * 1024);
    assert_eq!(engine.file_ids(), vec![0]);
}
