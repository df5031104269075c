//! Shared storage context
//!
//! OS geometry, CRC tables, the used-memory counter and the id allocator
//! live here rather than in globals. One context is
//! built per storage manager and shared (`Arc`) with its pool and every file
//! it creates, so independent managers never interfere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{Config, CRC32_ISO_HDLC_POLY, CRC64_XZ_POLY};
use crate::crc::CrcTables;
use crate::error::Result;
use crate::mmap::sys;
use crate::storage::{IdAllocator, MemoryUsage};

/// Shared state of one storage manager
#[derive(Debug)]
pub struct StoreContext {
    /// Alignment boundary for the start of every mapped view
    granularity: u64,
    /// OS page size (used for page warming)
    page_size: u64,
    /// Logical file sizes are multiples of this
    alignment: u64,
    /// CRC tables derived from the configured polynomials
    tables: Arc<CrcTables>,
    /// Bytes currently mapped through views
    usage: MemoryUsage,
    /// Temp file ids
    ids: IdAllocator,
    /// Ids of persistent files (never recycled)
    next_persistent_id: AtomicU64,
}

impl StoreContext {
    /// Build a context from a validated config
    pub fn new(config: &Config) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// Context with the default configuration
    pub fn with_defaults() -> Arc<Self> {
        Self::build(&Config::default())
    }

    fn build(config: &Config) -> Arc<Self> {
        let tables = if config.crc32_poly == CRC32_ISO_HDLC_POLY && config.crc64_poly == CRC64_XZ_POLY {
            CrcTables::standard()
        } else {
            Arc::new(CrcTables::new(config.crc32_poly, config.crc64_poly))
        };

        Arc::new(Self {
            granularity: sys::allocation_granularity(),
            page_size: sys::page_size(),
            alignment: config.alignment,
            tables,
            usage: MemoryUsage::new(),
            ids: IdAllocator::new(),
            next_persistent_id: AtomicU64::new(0),
        })
    }

    pub fn granularity(&self) -> u64 {
        self.granularity
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn tables(&self) -> &Arc<CrcTables> {
        &self.tables
    }

    pub fn usage(&self) -> &MemoryUsage {
        &self.usage
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub(crate) fn allocate_persistent_id(&self) -> u64 {
        self.next_persistent_id.fetch_add(1, Ordering::SeqCst)
    }
}
