//! Log records
//!
//! In-memory and on-disk forms of a single put or delete.

use crate::error::DecodeError;

/// On-disk format version described in the module docs
pub const FORMAT_VERSION: u8 = 1;

/// Header size: CRC (4) + Type (1) + KeyLen (4) + ValLen (4) = 13 bytes
pub const HEADER_SIZE: usize = 13;

const CRC_SIZE: usize = 4;

/// Largest key or value the header's `u32` length fields can describe
pub const MAX_FIELD_LEN: usize = u32::MAX as usize;

/// Kind of record stored in a data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    /// A live value written by `put`
    Normal = 1,

    /// A tombstone written by `delete`
    Deleted = 2,
}

impl LogRecordType {
    fn from_u8(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            1 => Ok(LogRecordType::Normal),
            2 => Ok(LogRecordType::Deleted),
            other => Err(DecodeError::InvalidRecordType(other)),
        }
    }
}

/// Where the current version of a key lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRecordPos {
    pub file_id: u32,
    pub offset: u64,
}

/// A single record appended to a data file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub record_type: LogRecordType,
}

/// A record read back from a data file, with its encoded size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadLogRecord {
    pub record: LogRecord,
    pub size: u64,
}

/// Fixed-size prefix of every encoded record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    /// Raw type byte; validated only after the checksum passes
    pub record_type: u8,
    pub key_len: u32,
    pub value_len: u32,
}

impl RecordHeader {
    /// Parse the header at the start of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                needed: HEADER_SIZE as u64,
                available: buf.len() as u64,
            });
        }

        Ok(Self {
            crc: read_u32(&buf[0..4]),
            record_type: buf[4],
            key_len: read_u32(&buf[5..9]),
            value_len: read_u32(&buf[9..13]),
        })
    }

    /// Full size of the record this header describes
    pub fn record_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.key_len as u64 + self.value_len as u64
    }
}

/// Largest key and value a reader will accept from a header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLimits {
    pub max_key_size: usize,
    pub max_value_size: usize,
}

impl RecordLimits {
    /// Anything the format can encode
    pub const UNBOUNDED: Self = Self {
        max_key_size: MAX_FIELD_LEN,
        max_value_size: MAX_FIELD_LEN,
    };

    /// Reject a header whose lengths exceed these limits
    pub fn check(&self, header: &RecordHeader) -> Result<(), DecodeError> {
        if header.key_len as usize > self.max_key_size
            || header.value_len as usize > self.max_value_size
        {
            return Err(DecodeError::LengthOutOfBounds {
                key_len: header.key_len,
                value_len: header.value_len,
            });
        }
        Ok(())
    }
}

impl Default for RecordLimits {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl LogRecord {
    /// Create a live record
    pub fn normal(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            record_type: LogRecordType::Normal,
        }
    }

    /// Create a tombstone; its value is always empty
    pub fn deleted(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Vec::new(),
            record_type: LogRecordType::Deleted,
        }
    }

    /// Size of this record once encoded
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Serialize to the on-disk layout.
    ///
    /// Key and value lengths must fit in a `u32`; the engine enforces much
    /// smaller limits before a record is ever built.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());

        // CRC placeholder, filled once the rest is in place
        buf.extend_from_slice(&[0u8; CRC_SIZE]);
        buf.push(self.record_type as u8);
        buf.extend_from_slice(&(self.key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf
    }

    /// Decode one record from the start of `buf`.
    ///
    /// Returns the record and the number of bytes it occupied. Bytes past the
    /// declared key/value lengths are never looked at.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), DecodeError> {
        let header = RecordHeader::decode(buf)?;
        let total = header.record_len();

        if (buf.len() as u64) < total {
            return Err(DecodeError::Truncated {
                needed: total,
                available: buf.len() as u64,
            });
        }
        let total = total as usize;

        let computed = crc32fast::hash(&buf[CRC_SIZE..total]);
        if computed != header.crc {
            return Err(DecodeError::ChecksumMismatch {
                stored: header.crc,
                computed,
            });
        }

        let record_type = LogRecordType::from_u8(header.record_type)?;

        let key_end = HEADER_SIZE + header.key_len as usize;
        let record = Self {
            key: buf[HEADER_SIZE..key_end].to_vec(),
            value: buf[key_end..total].to_vec(),
            record_type,
        };

        Ok((record, total))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}
