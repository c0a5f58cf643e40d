//! # CaskDB
//!
//! An embedded, log-structured key-value store (Bitcask design) with:
//! - Append-only data files that double as the write-ahead log
//! - CRC32-checked records and crash recovery with partial write handling
//! - An in-memory index of every key's latest record
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Embedding Application                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ put / get / delete
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Engine                               │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Data Files  │          │    Index    │
//!   │  (Append)   │          │  (RwLock)   │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │  File I/O   │
//!   │ (pread/app) │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod fio;
pub mod data;
pub mod index;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CaskError, DecodeError, Result};
pub use config::{Config, SyncPolicy};
pub use engine::{Engine, EngineState, Stat};
pub use index::IndexType;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of CaskDB
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
