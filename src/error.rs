//! Error types for CaskDB
//!
//! Provides a unified error type for all operations, plus the decode
//! failures reported by the record codec.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CaskError
pub type Result<T> = std::result::Result<T, CaskError>;

/// Unified error type for CaskDB operations
#[derive(Debug, Error)]
pub enum CaskError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A read started past the end of a data file.
    #[error("offset {offset} is beyond the end of data file {file_id} (len {len})")]
    OffsetOutOfRange { file_id: u32, offset: u64, len: u64 },

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("record decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("corrupted record in data file {file_id} at offset {offset}: {source}")]
    Corruption {
        file_id: u32,
        offset: u64,
        #[source]
        source: DecodeError,
    },

    // -------------------------------------------------------------------------
    // Directory / Data File Errors
    // -------------------------------------------------------------------------
    #[error("cannot read data directory {path:?}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data directory may be corrupted: {0}")]
    DataDirCorrupted(String),

    #[error("data file {0} is not registered")]
    DataFileNotFound(u32),

    // -------------------------------------------------------------------------
    // Key / Value Errors
    // -------------------------------------------------------------------------
    #[error("the key is empty")]
    KeyIsEmpty,

    #[error("key of {size} bytes exceeds the limit of {max} bytes")]
    KeyTooLarge { size: usize, max: usize },

    #[error("value of {size} bytes exceeds the limit of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("memory index failed to update")]
    IndexUpdateFailed,

    // -------------------------------------------------------------------------
    // Lifecycle / Configuration Errors
    // -------------------------------------------------------------------------
    #[error("engine is not open")]
    EngineNotReady,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Why a byte span could not be turned back into a record
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes are available than the header declares
    #[error("record truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: u64, available: u64 },

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("invalid record type {0}")]
    InvalidRecordType(u8),

    /// Header lengths no record accepted by the engine could have
    #[error("record lengths out of bounds: key {key_len}, value {value_len}")]
    LengthOutOfBounds { key_len: u32, value_len: u32 },
}
