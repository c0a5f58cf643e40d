//! Data Module
//!
//! The data files ARE the log: every put and delete is appended as a
//! self-checking record, and the index is rebuilt from them on startup.
//!
//! ## Responsibilities
//! - Encode/decode records with CRC32 checksums
//! - Append-only data files with tracked write offsets
//! - Sequential scans for startup recovery
//!
//! ## File Format (format version 1)
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Record 1                                                     │
//! │ ┌─────────┬──────────┬─────────────┬─────────────┬─────┬─────┐│
//! │ │ CRC (4) │ Type (1) │ KeyLen (4)  │ ValLen (4)  │ Key │ Val ││
//! │ └─────────┴──────────┴─────────────┴─────────────┴─────┴─────┘│
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record 2                                                     │
//! │   ...                                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian. The CRC covers every byte after itself.

pub mod data_file;
pub mod log_record;
pub mod recovery;

pub use data_file::{data_file_name, DataFile, DATA_FILE_NAME_SUFFIX};
pub use log_record::{
    LogRecord, LogRecordPos, LogRecordType, ReadLogRecord, RecordHeader, RecordLimits,
    FORMAT_VERSION, HEADER_SIZE, MAX_FIELD_LEN,
};
pub use recovery::{scan_data_file, RecoveryResult, ScanOptions, ScanResult};
