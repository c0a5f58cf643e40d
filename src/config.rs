//! Configuration for CaskDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::data::{RecordLimits, MAX_FIELD_LEN};
use crate::error::{CaskError, Result};
use crate::index::IndexType;

/// Main configuration for a CaskDB instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── 000000000.data
    ///     ├── 000000001.data
    ///     └── ...            (highest id is the active file)
    pub data_dir: PathBuf,

    /// Size at which the active file is retired and a new one started (bytes)
    pub max_active_file_size: u64,

    /// When appended bytes are forced to disk
    pub sync_policy: SyncPolicy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// In-memory index implementation
    pub index_type: IndexType,

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------
    /// Largest accepted key (bytes)
    pub max_key_size: usize,

    /// Largest accepted value (bytes)
    pub max_value_size: usize,
}

/// Data file sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPolicy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N appends
    EveryNWrites { count: usize },

    /// fsync from a background thread every `interval_ms`
    Periodic { interval_ms: u64 },

    /// Only on `Engine::sync` and `Engine::close`
    Manual,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./caskdb_data"),
            max_active_file_size: 256 * 1024 * 1024, // 256 MB
            sync_policy: SyncPolicy::EveryWrite,
            index_type: IndexType::BTree,
            max_key_size: 64 * 1024,          // 64 KB
            max_value_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Key/value limits as applied to records read back from disk
    pub fn record_limits(&self) -> RecordLimits {
        RecordLimits {
            max_key_size: self.max_key_size,
            max_value_size: self.max_value_size,
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CaskError::Config("data_dir is empty".to_string()));
        }
        if self.max_active_file_size == 0 {
            return Err(CaskError::Config(
                "max_active_file_size must be greater than zero".to_string(),
            ));
        }
        if self.max_key_size == 0 || self.max_value_size == 0 {
            return Err(CaskError::Config(
                "key and value size limits must be greater than zero".to_string(),
            ));
        }
        if self.max_key_size > MAX_FIELD_LEN || self.max_value_size > MAX_FIELD_LEN {
            return Err(CaskError::Config(format!(
                "key and value size limits cannot exceed {} bytes",
                MAX_FIELD_LEN
            )));
        }
        match self.sync_policy {
            SyncPolicy::EveryNWrites { count: 0 } => Err(CaskError::Config(
                "EveryNWrites needs a count of at least 1".to_string(),
            )),
            SyncPolicy::Periodic { interval_ms: 0 } => Err(CaskError::Config(
                "Periodic sync needs a non-zero interval".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the active file rotation threshold (in bytes)
    pub fn max_active_file_size(mut self, size: u64) -> Self {
        self.config.max_active_file_size = size;
        self
    }

    /// Set the sync policy
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.config.sync_policy = policy;
        self
    }

    /// Set the index implementation
    pub fn index_type(mut self, index_type: IndexType) -> Self {
        self.config.index_type = index_type;
        self
    }

    /// Set the maximum key size (in bytes)
    pub fn max_key_size(mut self, size: usize) -> Self {
        self.config.max_key_size = size;
        self
    }

    /// Set the maximum value size (in bytes)
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.config.max_value_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
