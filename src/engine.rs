//! Engine Module
//!
//! The core storage engine that coordinates data files and the index.
//!
//! ## Responsibilities
//! - Append puts and tombstones to the active data file
//! - Keep the index pointing at the latest record of every key
//! - Rotate the active file when it reaches its size threshold
//! - Rebuild the index from the data files on startup

mod syncer;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::config::{Config, SyncPolicy};
use crate::data::{
    scan_data_file, DataFile, LogRecord, LogRecordPos, LogRecordType, RecoveryResult,
    ScanOptions, DATA_FILE_NAME_SUFFIX, HEADER_SIZE,
};
use crate::error::{CaskError, DecodeError, Result};
use crate::index::{new_indexer, Indexer};

use syncer::Syncer;

/// Id given to the first data file in an empty directory
const INITIAL_FILE_ID: u32 = 0;

/// Engine lifecycle
///
/// `Closed → Opening → Open → Closing → Closed`. Only `Open` accepts
/// reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Opening,
    Open,
    Closing,
    Closed,
}

/// Point-in-time engine statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// Live keys in the index
    pub key_count: usize,

    /// Data files in the registry, active one included
    pub data_file_count: usize,

    /// Total bytes across all data files
    pub disk_size: u64,
}

/// State owned by the single writer
struct WriteState {
    /// Appends since the last fsync (for `SyncPolicy::EveryNWrites`)
    writes_since_sync: usize,
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes** (put/delete): Serialized by `write_state`
///   - "rotate → append → index update → sync" runs as one unit
///   - Must acquire: write_state → state (read) → active_file (write)
///
/// - **Reads** (get): Fully concurrent
///   - No write lock needed
///   - Index uses its internal RwLock (many concurrent readers)
///   - Data file reads are positional, so readers of the same file never
///     contend with each other
///
/// - **Rotation** moves the old active file into `older_files` while still
///   holding the active file's write lock, so a reader holding a position
///   always finds its file in one of the two.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Lifecycle state; readers hold it shared for the length of a call
    state: RwLock<EngineState>,

    /// The only file ever appended to (`None` once closed)
    active_file: Arc<RwLock<Option<DataFile>>>,

    /// Read-only files, by id
    older_files: RwLock<HashMap<u32, DataFile>>,

    /// Key → latest record position (internal RwLock)
    index: Box<dyn Indexer>,

    /// Serializes write operations (put/delete/close)
    write_state: Mutex<WriteState>,

    /// Background fsync thread for `SyncPolicy::Periodic`
    syncer: Mutex<Option<Syncer>>,

    /// What startup replay found
    recovery: RecoveryResult,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config, create the data directory
    /// 2. Discover data files, highest id becomes the active file
    /// 3. Replay every file in ascending id order into the index
    /// 4. Rotate if the active file is already full
    /// 5. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Validate and create data directory
        config.validate()?;
        fs::create_dir_all(&config.data_dir).map_err(|source| {
            CaskError::DirectoryUnreadable {
                path: config.data_dir.clone(),
                source,
            }
        })?;

        // Step 2: Open every data file; the last one is the active candidate
        let file_ids = Self::discover_file_ids(&config.data_dir)?;
        let mut data_files = file_ids
            .iter()
            .map(|&id| DataFile::open(&config.data_dir, id))
            .collect::<Result<Vec<_>>>()?;

        let active_file = match data_files.pop() {
            Some(file) => file,
            None => DataFile::open(&config.data_dir, INITIAL_FILE_ID)?,
        };
        let older_files = data_files
            .into_iter()
            .map(|file| (file.file_id(), file))
            .collect::<HashMap<_, _>>();

        let mut engine = Self {
            index: new_indexer(config.index_type),
            config,
            state: RwLock::new(EngineState::Opening),
            active_file: Arc::new(RwLock::new(Some(active_file))),
            older_files: RwLock::new(older_files),
            write_state: Mutex::new(WriteState {
                writes_since_sync: 0,
            }),
            syncer: Mutex::new(None),
            recovery: RecoveryResult::default(),
        };

        // Step 3: Rebuild the index
        engine.load_index_from_data_files()?;

        // Step 4: Never append to a file that is already at the threshold
        {
            let mut active_guard = engine.active_file.write();
            if let Some(active) = active_guard.as_mut() {
                if active.write_offset() >= engine.config.max_active_file_size {
                    engine.rotate_active_file(active)?;
                }
            }
        }

        // Step 5: Start background sync and accept requests
        if let SyncPolicy::Periodic { interval_ms } = engine.config.sync_policy {
            let syncer = Syncer::spawn(
                Arc::clone(&engine.active_file),
                Duration::from_millis(interval_ms),
            )?;
            *engine.syncer.get_mut() = Some(syncer);
        }
        *engine.state.get_mut() = EngineState::Open;

        tracing::info!(
            data_dir = ?engine.config.data_dir,
            keys = engine.index.len(),
            files = engine.older_files.read().len() + 1,
            "engine opened"
        );

        Ok(engine)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        config.data_dir = path.to_path_buf();
        Self::open(config)
    }

    /// Get a value by key
    ///
    /// Returns `Ok(None)` when the key does not exist.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let state = self.state.read();
        ensure_open(*state)?;

        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }

        let pos = match self.index.get(key) {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let record = self.read_record_at(pos)?;
        match record.record_type {
            LogRecordType::Normal => Ok(Some(Bytes::from(record.value))),
            LogRecordType::Deleted => {
                tracing::error!(
                    file_id = pos.file_id,
                    offset = pos.offset,
                    "index entry points at a tombstone"
                );
                Ok(None)
            }
        }
    }

    /// Put a key-value pair
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append record to the active file (rotating first if full)
    /// 3. Point the index at the new record
    /// 4. Sync according to the sync policy
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        // Acquire write lock to serialize writes
        let mut write_state = self.write_state.lock();
        let state = self.state.read();
        ensure_open(*state)?;

        self.check_key(key)?;
        if value.len() > self.config.max_value_size {
            return Err(CaskError::ValueTooLarge {
                size: value.len(),
                max: self.config.max_value_size,
            });
        }

        let pos = self.append_log_record(&LogRecord::normal(key, value), &mut write_state)?;

        if !self.index.put(key.to_vec(), pos) {
            return Err(CaskError::IndexUpdateFailed);
        }

        self.sync_after_write(&mut write_state)
    }

    /// Delete a key
    ///
    /// A key that does not exist is left alone and no tombstone is written.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        // Acquire write lock to serialize writes
        let mut write_state = self.write_state.lock();
        let state = self.state.read();
        ensure_open(*state)?;

        self.check_key(key)?;

        if self.index.get(key).is_none() {
            return Ok(());
        }

        // Tombstone first, so replay reproduces the delete
        self.append_log_record(&LogRecord::deleted(key), &mut write_state)?;
        self.index.delete(key);

        self.sync_after_write(&mut write_state)
    }

    /// All live keys in ascending order
    pub fn list_keys(&self) -> Result<Vec<Bytes>> {
        let state = self.state.read();
        ensure_open(*state)?;

        Ok(self
            .index
            .list_keys()
            .into_iter()
            .map(Bytes::from)
            .collect())
    }

    /// Visit live key/value pairs in key order until `f` returns false
    ///
    /// Works on a snapshot of the index taken at the start; `f` may call back
    /// into the engine.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let entries = {
            let state = self.state.read();
            ensure_open(*state)?;
            self.index.snapshot()
        };

        for (key, pos) in entries {
            let record = {
                let state = self.state.read();
                ensure_open(*state)?;
                self.read_record_at(pos)?
            };

            if record.record_type == LogRecordType::Deleted {
                continue;
            }
            if !f(&key, &record.value) {
                break;
            }
        }

        Ok(())
    }

    /// Force everything appended so far to disk
    pub fn sync(&self) -> Result<()> {
        let mut write_state = self.write_state.lock();
        let state = self.state.read();
        ensure_open(*state)?;

        if let Some(active) = self.active_file.read().as_ref() {
            active.sync()?;
        }
        write_state.writes_since_sync = 0;

        Ok(())
    }

    /// Close the engine gracefully
    ///
    /// Syncs the active file and releases every file handle. Later calls
    /// fail with `EngineNotReady`.
    pub fn close(&self) -> Result<()> {
        let mut write_state = self.write_state.lock();
        {
            let mut state = self.state.write();
            ensure_open(*state)?;
            *state = EngineState::Closing;
        }

        // Stop the syncer before the active file goes away
        if let Some(syncer) = self.syncer.lock().take() {
            syncer.stop();
        }

        let result = match self.active_file.write().take() {
            Some(active) => active.sync(),
            None => Ok(()),
        };
        self.older_files.write().clear();
        write_state.writes_since_sync = 0;

        *self.state.write() = EngineState::Closed;

        match &result {
            Ok(()) => tracing::info!(data_dir = ?self.config.data_dir, "engine closed"),
            Err(e) => tracing::error!("final sync on close failed: {}", e),
        }

        result
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Ids of every `*.data` file in `dir`, ascending
    fn discover_file_ids(dir: &Path) -> Result<Vec<u32>> {
        let unreadable = |source: std::io::Error| CaskError::DirectoryUnreadable {
            path: dir.to_path_buf(),
            source,
        };

        let mut file_ids = Vec::new();
        for entry in fs::read_dir(dir).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(DATA_FILE_NAME_SUFFIX) else {
                continue;
            };

            let file_id = stem.parse::<u32>().map_err(|_| {
                CaskError::DataDirCorrupted(format!("unexpected data file name {:?}", name))
            })?;
            file_ids.push(file_id);
        }

        file_ids.sort_unstable();
        Ok(file_ids)
    }

    /// Replay all data files, oldest first, into the empty index
    ///
    /// Older files were synced when they were retired, so only the active
    /// file may end in a partial record.
    fn load_index_from_data_files(&mut self) -> Result<()> {
        let index = self.index.as_ref();
        let mut totals = RecoveryResult::default();
        let active_options = ScanOptions {
            limits: self.config.record_limits(),
            allow_partial_tail: true,
        };
        let older_options = ScanOptions {
            allow_partial_tail: false,
            ..active_options
        };

        let older_files = self.older_files.get_mut();
        let mut older_ids: Vec<u32> = older_files.keys().copied().collect();
        older_ids.sort_unstable();

        for file_id in older_ids {
            if let Some(file) = older_files.get_mut(&file_id) {
                replay_data_file(file, &older_options, index, &mut totals)?;
            }
        }
        if let Some(active) = self.active_file.write().as_mut() {
            replay_data_file(active, &active_options, index, &mut totals)?;
        }

        tracing::info!(
            files = totals.files_scanned,
            records = totals.records_replayed,
            tombstones = totals.tombstones_replayed,
            bytes_truncated = totals.bytes_truncated,
            "recovery complete"
        );

        self.recovery = totals;
        Ok(())
    }

    /// Append `record` to the active file, rotating first if it is full
    fn append_log_record(
        &self,
        record: &LogRecord,
        write_state: &mut WriteState,
    ) -> Result<LogRecordPos> {
        let encoded = record.encode();

        let mut active_guard = self.active_file.write();
        let active = active_guard.as_mut().ok_or(CaskError::EngineNotReady)?;

        if active.write_offset() >= self.config.max_active_file_size {
            self.rotate_active_file(active)?;
            write_state.writes_since_sync = 0;
        }

        let offset = active.append(&encoded)?;

        Ok(LogRecordPos {
            file_id: active.file_id(),
            offset,
        })
    }

    /// Retire `active` into the older files and start the next id.
    /// Called with the active file's write lock held.
    fn rotate_active_file(&self, active: &mut DataFile) -> Result<()> {
        active.sync()?;

        let next_id = active.file_id().checked_add(1).ok_or_else(|| {
            CaskError::DataDirCorrupted("data file ids exhausted".to_string())
        })?;
        let new_file = DataFile::open(&self.config.data_dir, next_id)?;
        let old_file = std::mem::replace(active, new_file);

        tracing::debug!(
            old_file_id = old_file.file_id(),
            old_size = old_file.write_offset(),
            new_file_id = next_id,
            "rotated active data file"
        );

        self.older_files.write().insert(old_file.file_id(), old_file);
        Ok(())
    }

    /// Apply the sync policy after a successful append
    fn sync_after_write(&self, write_state: &mut WriteState) -> Result<()> {
        let due = match self.config.sync_policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryNWrites { count } => {
                write_state.writes_since_sync += 1;
                write_state.writes_since_sync >= count
            }
            SyncPolicy::Periodic { .. } | SyncPolicy::Manual => false,
        };

        if due {
            if let Some(active) = self.active_file.read().as_ref() {
                active.sync()?;
            }
            write_state.writes_since_sync = 0;
        }

        Ok(())
    }

    /// Read the record at `pos` from whichever file owns it
    fn read_record_at(&self, pos: LogRecordPos) -> Result<LogRecord> {
        let from_active = {
            let active_guard = self.active_file.read();
            match active_guard.as_ref() {
                Some(active) if active.file_id() == pos.file_id => {
                    Some(active.read_log_record(pos.offset))
                }
                _ => None,
            }
        };

        let read = match from_active {
            Some(read) => read,
            None => {
                let older_files = self.older_files.read();
                older_files
                    .get(&pos.file_id)
                    .ok_or(CaskError::DataFileNotFound(pos.file_id))?
                    .read_log_record(pos.offset)
            }
        };

        // The index only holds positions of complete records, so any decode
        // failure here is corruption
        match read {
            Ok(Some(read)) => Ok(read.record),
            Ok(None) => Err(CaskError::Corruption {
                file_id: pos.file_id,
                offset: pos.offset,
                source: DecodeError::Truncated {
                    needed: HEADER_SIZE as u64,
                    available: 0,
                },
            }),
            Err(CaskError::Decode(source)) => Err(CaskError::Corruption {
                file_id: pos.file_id,
                offset: pos.offset,
                source,
            }),
            Err(e) => Err(e),
        }
    }

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(CaskError::KeyIsEmpty);
        }
        if key.len() > self.config.max_key_size {
            return Err(CaskError::KeyTooLarge {
                size: key.len(),
                max: self.config.max_key_size,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Current lifecycle state
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Path of the current active file (`None` once closed)
    pub fn active_file_path(&self) -> Option<PathBuf> {
        self.active_file
            .read()
            .as_ref()
            .map(|active| active.path().to_path_buf())
    }

    /// Id of the current active file (`None` once closed)
    pub fn active_file_id(&self) -> Option<u32> {
        self.active_file.read().as_ref().map(DataFile::file_id)
    }

    /// Every registered file id, ascending (active file last)
    pub fn file_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.older_files.read().keys().copied().collect();
        ids.extend(self.active_file_id());
        ids.sort_unstable();
        ids
    }

    /// What startup replay found
    pub fn recovery_result(&self) -> RecoveryResult {
        self.recovery
    }

    /// Key count, file count and disk usage
    pub fn stat(&self) -> Result<Stat> {
        let state = self.state.read();
        ensure_open(*state)?;

        let active_guard = self.active_file.read();
        let older_files = self.older_files.read();

        let active_size = active_guard.as_ref().map_or(0, DataFile::write_offset);
        let older_size: u64 = older_files.values().map(DataFile::write_offset).sum();

        Ok(Stat {
            key_count: self.index.len(),
            data_file_count: older_files.len() + usize::from(active_guard.is_some()),
            disk_size: active_size + older_size,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if *self.state.get_mut() == EngineState::Open {
            if let Err(e) = self.close() {
                tracing::error!("failed to close engine on drop: {}", e);
            }
        }
    }
}

fn ensure_open(state: EngineState) -> Result<()> {
    match state {
        EngineState::Open => Ok(()),
        _ => Err(CaskError::EngineNotReady),
    }
}

/// Replay one data file into `index`, cutting off a partial tail record
fn replay_data_file(
    file: &mut DataFile,
    options: &ScanOptions,
    index: &dyn Indexer,
    totals: &mut RecoveryResult,
) -> Result<()> {
    let scan = scan_data_file(file, options, |record, pos| {
        match record.record_type {
            LogRecordType::Normal => {
                if !index.put(record.key, pos) {
                    return Err(CaskError::IndexUpdateFailed);
                }
                totals.records_replayed += 1;
            }
            LogRecordType::Deleted => {
                index.delete(&record.key);
                totals.tombstones_replayed += 1;
            }
        }
        Ok(())
    })?;

    if scan.was_truncated {
        let cut = file.write_offset() - scan.valid_len;
        tracing::warn!(
            file_id = file.file_id(),
            valid_len = scan.valid_len,
            bytes = cut,
            "truncating partial record from data file"
        );
        file.truncate(scan.valid_len)?;
        file.sync()?;
        totals.bytes_truncated += cut;
    }

    totals.files_scanned += 1;
    Ok(())
}
