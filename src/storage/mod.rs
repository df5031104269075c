//! Storage Module
//!
//! Backing-file lifecycle and parallel bulk operations.
//!
//! ## Responsibilities
//! - Allocate and recycle temp file ids (FIFO reuse before fresh ids)
//! - Recycle `MappedFile` instances through a pool
//! - Track bytes mapped through views
//! - Parallel copy into files and chunked whole-file CRC32/CRC64
//!
//! ## Parallel Operations
//! ```text
//!   caller ──▶ plan chunks ──▶ executor.run_all ──▶ join (first error wins)
//!                               │   │   │
//!                            load/copy|crc/unload per chunk
//! ```
//! The calling thread blocks until every chunk task has finished. Tasks are
//! never cancelled; a failed operation leaves its target partially written.

mod checksum;
mod chunks;
mod copy;
mod executor;
mod ids;
mod manager;
mod pool;
mod usage;

pub use copy::{copy_wide, VECTOR_WIDTH};
pub use executor::{Executor, InlineExecutor, Task, WorkerPool};
pub use ids::IdAllocator;
pub use manager::StorageManager;
pub use pool::FilePool;
pub use usage::MemoryUsage;
