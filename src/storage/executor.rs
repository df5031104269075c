//! Task Executor
//!
//! Parallel copy and checksum hand their chunk tasks to an [`Executor`].
//! The default is a dedicated rayon pool; tests can inject
//! [`InlineExecutor`] to run everything on the calling thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crossbeam::channel;

use crate::error::{Result, StoreError};

/// A unit of work that may borrow from the caller's stack
pub type Task<'a> = Box<dyn FnOnce() + Send + 'a>;

/// A chunk task producing a value
pub(crate) type Job<'a, R> = Box<dyn FnOnce() -> Result<R> + Send + 'a>;

/// Runs a batch of tasks to completion
pub trait Executor: Send + Sync {
    /// Run every task and return once all of them have finished
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>);

    /// Number of tasks that may run at the same time
    fn parallelism(&self) -> usize;
}

// =============================================================================
// Worker Pool
// =============================================================================

/// Fixed-size rayon thread pool
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mapstore-worker-{}", i))
            .build()
            .map_err(|e| StoreError::Config(format!("failed to build worker pool: {}", e)))?;

        tracing::debug!("Started worker pool with {} threads", threads);
        Ok(Self { pool, threads })
    }
}

impl Executor for WorkerPool {
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>) {
        if tasks.is_empty() {
            return;
        }
        self.pool.scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task());
            }
        });
    }

    fn parallelism(&self) -> usize {
        self.threads
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("threads", &self.threads).finish()
    }
}

// =============================================================================
// Inline Executor
// =============================================================================

/// Runs tasks one after another on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>) {
        for task in tasks {
            task();
        }
    }

    fn parallelism(&self) -> usize {
        1
    }
}

// =============================================================================
// Join
// =============================================================================

/// Run `jobs` on `executor` and collect their results in submission order
///
/// Waits for every job. A panicking job becomes [`StoreError::TaskPanicked`];
/// when several jobs fail, the first failure to arrive is returned.
pub(crate) fn join_all<'a, R: Send + 'a>(
    executor: &dyn Executor,
    jobs: Vec<Job<'a, R>>,
) -> Result<Vec<R>> {
    let count = jobs.len();
    let (tx, rx) = channel::unbounded::<(usize, Result<R>)>();

    let tasks: Vec<Task<'a>> = jobs
        .into_iter()
        .enumerate()
        .map(|(index, job)| {
            let tx = tx.clone();
            Box::new(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                    .unwrap_or_else(|payload| Err(StoreError::TaskPanicked(panic_message(&*payload))));
                // The receiver outlives run_all, so this cannot fail.
                let _ = tx.send((index, outcome));
            }) as Task<'a>
        })
        .collect();
    drop(tx);

    executor.run_all(tasks);

    let mut results: Vec<Option<R>> = (0..count).map(|_| None).collect();
    let mut first_error = None;
    for (index, outcome) in rx.try_iter() {
        match outcome {
            Ok(value) => results[index] = Some(value),
            Err(e) => {
                tracing::warn!("Chunk task {} failed: {}", index, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    results
        .into_iter()
        .map(|slot| slot.ok_or(StoreError::TaskLost))
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
