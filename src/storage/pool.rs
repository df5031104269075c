//! File Pool
//!
//! Recycles `MappedFile` instances to avoid rebuilding them under churn.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::StoreContext;
use crate::mmap::MappedFile;

/// Free list of clean `MappedFile` instances
///
/// Every pooled instance has no views, no handles, no identity and size 0.
pub struct FilePool {
    ctx: Arc<StoreContext>,
    free: Mutex<VecDeque<MappedFile>>,
    capacity: usize,
}

impl FilePool {
    /// Create an empty pool retaining at most `capacity` idle instances
    pub fn new(ctx: Arc<StoreContext>, capacity: usize) -> Self {
        Self {
            ctx,
            free: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Pop a clean instance, or build a new one
    pub fn acquire(&self) -> MappedFile {
        if let Some(file) = self.free.lock().pop_front() {
            return file;
        }
        MappedFile::new(Arc::clone(&self.ctx))
    }

    /// Reset `file` to the clean state and keep it for reuse
    ///
    /// A temp backing file is deleted and its id released. Instances from a
    /// different context, or beyond capacity, are dropped instead.
    pub fn release(&self, file: MappedFile) {
        file.reset();
        file.retire();

        if !Arc::ptr_eq(file.context(), &self.ctx) {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push_back(file);
        }
    }

    /// Number of idle instances
    pub fn size(&self) -> usize {
        self.free.lock().len()
    }

    /// Drop every idle instance
    pub fn clear(&self) {
        self.free.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
