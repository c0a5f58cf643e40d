//! Data file recovery
//!
//! Sequential replay of a data file during startup.

use crate::error::{CaskError, DecodeError, Result};

use super::data_file::DataFile;
use super::log_record::{LogRecord, LogRecordPos, ReadLogRecord, RecordLimits};

/// How strictly a scan treats what it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Headers declaring longer keys or values are corruption
    pub limits: RecordLimits,

    /// Whether a record cut short by the end of the file ends the scan
    /// cleanly. Only the file that was being appended to can hold one.
    pub allow_partial_tail: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            limits: RecordLimits::UNBOUNDED,
            allow_partial_tail: true,
        }
    }
}

/// Outcome of scanning one data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    /// Records decoded and handed to the callback
    pub records: u64,

    /// End of the last complete record
    pub valid_len: u64,

    /// Whether a partial record was found after `valid_len`
    pub was_truncated: bool,
}

/// Totals for a whole startup replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of data files replayed
    pub files_scanned: u64,

    /// Normal records applied to the index
    pub records_replayed: u64,

    /// Tombstones applied to the index
    pub tombstones_replayed: u64,

    /// Bytes of partial records cut from file tails
    pub bytes_truncated: u64,
}

impl RecoveryResult {
    /// Whether any file had a partial record removed
    pub fn was_truncated(&self) -> bool {
        self.bytes_truncated > 0
    }
}

/// Decode every record of `file` from offset 0, in order.
///
/// Stops cleanly at the end of the file, at a record cut short by it when
/// `options.allow_partial_tail` is set, and at the first error `apply`
/// returns. Every other decode failure is reported as `Corruption` and
/// never skipped.
pub fn scan_data_file<F>(
    file: &DataFile,
    options: &ScanOptions,
    mut apply: F,
) -> Result<ScanResult>
where
    F: FnMut(LogRecord, LogRecordPos) -> Result<()>,
{
    let file_id = file.file_id();
    let mut offset = 0u64;
    let mut records = 0u64;

    loop {
        match file.read_log_record_within(offset, &options.limits) {
            Ok(Some(ReadLogRecord { record, size })) => {
                apply(record, LogRecordPos { file_id, offset })?;
                offset += size;
                records += 1;
            }
            Ok(None) => {
                return Ok(ScanResult {
                    records,
                    valid_len: offset,
                    was_truncated: false,
                });
            }
            Err(CaskError::Decode(DecodeError::Truncated { needed, available }))
                if options.allow_partial_tail =>
            {
                tracing::warn!(
                    file_id,
                    offset,
                    needed,
                    available,
                    "partial record at end of data file"
                );
                return Ok(ScanResult {
                    records,
                    valid_len: offset,
                    was_truncated: true,
                });
            }
            Err(CaskError::Decode(source)) => {
                return Err(CaskError::Corruption {
                    file_id,
                    offset,
                    source,
                });
            }
            Err(e) => return Err(e),
        }
    }
}
