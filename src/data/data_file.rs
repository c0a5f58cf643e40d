//! Data files
//!
//! An append-only file of encoded records identified by a numeric id.

use std::path::{Path, PathBuf};

use crate::error::{CaskError, Result};
use crate::fio::{self, IoManager};

use super::log_record::{LogRecord, ReadLogRecord, RecordHeader, RecordLimits, HEADER_SIZE};

/// Extension shared by every data file
pub const DATA_FILE_NAME_SUFFIX: &str = ".data";

/// File name for `file_id`, zero padded so names sort by id
pub fn data_file_name(file_id: u32) -> String {
    format!("{:09}{}", file_id, DATA_FILE_NAME_SUFFIX)
}

/// An append-only data file
///
/// ## Invariants
/// - `write_offset` always equals the file length
/// - Bytes below `write_offset` are never rewritten
///
/// Appends need `&mut self`, reads only `&self`; the engine's locks decide
/// who gets which.
pub struct DataFile {
    file_id: u32,
    write_offset: u64,
    path: PathBuf,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Open or create the data file for `file_id` inside `dir`
    pub fn open(dir: &Path, file_id: u32) -> Result<Self> {
        let path = dir.join(data_file_name(file_id));
        let io = fio::new_io_manager(&path)?;
        let write_offset = io.size()?;

        Ok(Self {
            file_id,
            write_offset,
            path,
            io,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Next append position (== current file length)
    pub fn write_offset(&self) -> u64 {
        self.write_offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `buf`, returning the offset it starts at.
    ///
    /// On failure the file is cut back to the previous length and the
    /// write offset stays where it was.
    pub fn append(&mut self, buf: &[u8]) -> Result<u64> {
        let offset = self.write_offset;

        if let Err(e) = self.io.write(buf) {
            if let Err(rollback) = self.io.truncate(offset) {
                tracing::error!(
                    file_id = self.file_id,
                    offset,
                    "failed to roll back partial append: {}",
                    rollback
                );
            }
            return Err(e);
        }

        self.write_offset += buf.len() as u64;
        Ok(offset)
    }

    /// Read up to `max_len` bytes starting at `offset`.
    ///
    /// Fewer bytes come back when the range runs past the end of the file.
    /// An `offset` beyond the end is `OffsetOutOfRange`, not `Io`.
    pub fn read(&self, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        if offset > self.write_offset {
            return Err(CaskError::OffsetOutOfRange {
                file_id: self.file_id,
                offset,
                len: self.write_offset,
            });
        }

        let available = self.write_offset - offset;
        let len = (max_len as u64).min(available) as usize;
        let mut buf = vec![0u8; len];
        let n = self.io.read(&mut buf, offset)?;
        buf.truncate(n);

        Ok(buf)
    }

    /// Read and decode the record at `offset`.
    ///
    /// `Ok(None)` means `offset` is exactly the end of the file. A record cut
    /// short by the end of the file is `Decode(Truncated)`.
    pub fn read_log_record(&self, offset: u64) -> Result<Option<ReadLogRecord>> {
        self.read_log_record_within(offset, &RecordLimits::UNBOUNDED)
    }

    /// Like `read_log_record`, but a header declaring lengths beyond
    /// `limits` is `Decode(LengthOutOfBounds)` before any body is read.
    pub fn read_log_record_within(
        &self,
        offset: u64,
        limits: &RecordLimits,
    ) -> Result<Option<ReadLogRecord>> {
        let header_buf = self.read(offset, HEADER_SIZE)?;
        if header_buf.is_empty() {
            return Ok(None);
        }

        let header = RecordHeader::decode(&header_buf)?;
        limits.check(&header)?;
        let record_len = usize::try_from(header.record_len()).unwrap_or(usize::MAX);
        let buf = self.read(offset, record_len)?;
        let (record, size) = LogRecord::decode(&buf)?;

        Ok(Some(ReadLogRecord {
            record,
            size: size as u64,
        }))
    }

    /// Force appended bytes to disk
    pub fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    /// Drop everything from `len` onwards
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        if len > self.write_offset {
            return Err(CaskError::OffsetOutOfRange {
                file_id: self.file_id,
                offset: len,
                len: self.write_offset,
            });
        }
        self.io.truncate(len)?;
        self.write_offset = len;
        Ok(())
    }
}
