//! File I/O Module
//!
//! Byte-oriented I/O primitive underneath every data file.
//!
//! ## Responsibilities
//! - Positional reads (no shared cursor, so readers never contend)
//! - Appends at the end of the file
//! - Durability sync and tail truncation

mod file_io;

use std::path::Path;

use crate::error::Result;

pub use file_io::FileIo;

/// I/O backend for a data file
///
/// Reads take `&self` and must be safe to call from many threads at once.
pub trait IoManager: Send + Sync {
    /// Read into `buf` starting at `offset`, returning the bytes read.
    /// Returns fewer than `buf.len()` bytes only at end of file.
    fn read(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Append all of `buf` at the end of the file
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Force appended bytes to stable storage
    fn sync(&self) -> Result<()>;

    /// Current length of the file in bytes
    fn size(&self) -> Result<u64>;

    /// Cut the file back to `len` bytes
    fn truncate(&self, len: u64) -> Result<()>;
}

/// Open the standard file backend for `path`
pub fn new_io_manager(path: &Path) -> Result<Box<dyn IoManager>> {
    Ok(Box::new(FileIo::open(path)?))
}
