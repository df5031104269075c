//! File id allocation
//!
//! Ids come from a monotonically increasing counter; ids released by
//! retired files go to a FIFO free list and are handed out again before any
//! fresh id.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// Thread-safe id allocator with FIFO reuse
#[derive(Debug, Default)]
pub struct IdAllocator {
    state: Mutex<IdState>,
}

#[derive(Debug, Default)]
struct IdState {
    /// Next never-used id
    next: u64,
    /// Released ids, oldest first
    free: VecDeque<u64>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an id, preferring the oldest released one
    pub fn allocate(&self) -> u64 {
        let mut state = self.state.lock();
        match state.free.pop_front() {
            Some(id) => id,
            None => {
                let id = state.next;
                state.next += 1;
                id
            }
        }
    }

    /// Return an id to the reuse list
    ///
    /// Ids that were never handed out, or that are already queued, are ignored.
    pub fn release(&self, id: u64) {
        let mut state = self.state.lock();
        if id >= state.next || state.free.contains(&id) {
            tracing::warn!("Ignoring release of unallocated or already released id {}", id);
            return;
        }
        state.free.push_back(id);
    }

    /// Number of ids waiting for reuse
    pub fn free_count(&self) -> usize {
        self.state.lock().free.len()
    }

    /// The id a fresh allocation would return when the free list is empty
    pub fn next_fresh(&self) -> u64 {
        self.state.lock().next
    }
}
