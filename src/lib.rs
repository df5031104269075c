//! # mapstore
//!
//! Memory-mapped temp-file storage with:
//! - Pooled backing files named from recycled ids
//! - Bounds-checked views onto granularity-aligned mapping windows
//! - Parallel chunked copy into mapped files
//! - Parallel CRC-32/CRC-64 with GF(2) combination of chunk checksums
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageManager                           │
//! │     create_tmp / free / move_file / memcopy / calc_crc*      │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!  ┌───────────┐         ┌─────────────┐        ┌─────────────┐
//!  │ FilePool  │         │  Executor   │        │ StoreContext│
//!  │ (recycle) │         │ (chunk jobs)│        │ ids, usage, │
//!  └─────┬─────┘         └─────────────┘        │ CRC tables  │
//!        │                                      └─────────────┘
//!        ▼
//!  ┌────────────┐  load/unload  ┌────────────┐
//!  │ MappedFile │ ────────────▶ │ MappedView │
//!  │ (RwLock)   │ ◀──── weak ── │ (own lock) │
//!  └────────────┘               └────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mapstore::{Config, StorageManager};
//!
//! # fn main() -> mapstore::Result<()> {
//! let manager = StorageManager::new(Config::builder().temp_dir("/tmp/mapstore").build())?;
//!
//! let file = manager.create_tmp(10_000)?;
//! assert_eq!(file.size(), 10_048);
//!
//! let view = file.load(0, 8)?;
//! view.set_at::<u64>(0, 42)?;
//! drop(view);
//!
//! let crc = manager.calc_crc32(&file)?;
//! println!("crc32 = {:#010x}", crc);
//! manager.free(file);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod context;

pub mod crc;
pub mod mmap;
pub mod storage;
pub mod format;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ErrorKind, Result, StoreError};
pub use config::{Config, ConfigBuilder};
pub use context::StoreContext;
pub use crc::{CrcEngine, CrcTables, CrcWidth};
pub use mmap::{MappedFile, MappedView};
pub use storage::{Executor, FilePool, InlineExecutor, StorageManager, WorkerPool};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mapstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
