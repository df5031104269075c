//! Used-memory counter
//!
//! Tracks the number of bytes currently mapped through views. It counts
//! *mapped* bytes (including the leading granularity delta of each view),
//! not logical file bytes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free mapped-byte counter shared by every file of one context
#[derive(Debug, Default)]
pub struct MemoryUsage {
    bytes: AtomicU64,
}

impl MemoryUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly mapped region
    pub fn add(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record an unmapped region
    pub fn sub(&self, bytes: u64) {
        self.bytes.fetch_sub(bytes, Ordering::Relaxed);
    }

    /// Bytes currently mapped
    pub fn get(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
