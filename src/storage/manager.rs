//! Storage Manager
//!
//! Creates, recycles and frees mapped files and runs the parallel bulk
//! operations over them.
//!
//! ## Responsibilities
//! - Name temp backing files `{temp_dir}/{id}.{ext}` from recycled ids
//! - Hand out pooled `MappedFile` instances and take them back on `free`
//! - Transplant a file's identity onto another instance (`move_file`)
//! - Dispatch chunked copy and checksum work to the executor
//!   (see `copy.rs` and `checksum.rs`)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::Config;
use crate::context::StoreContext;
use crate::error::Result;
use crate::mmap::MappedFile;

use super::{Executor, FilePool, WorkerPool};

/// Entry point of the storage layer
///
/// ## Concurrency:
/// - `temp_dir`: RwLock (read on every create, written by `set_temp_dir`)
/// - the pool and id allocator carry their own locks
/// - all methods use `&self`; one manager can be shared across threads
pub struct StorageManager {
    config: Config,

    /// Geometry, CRC tables, used-memory counter and ids shared with files
    ctx: Arc<StoreContext>,

    /// Clean instances for reuse
    pool: FilePool,

    /// Runs chunk tasks of copy and checksum
    executor: Arc<dyn Executor>,

    /// Directory of temp backing files
    temp_dir: RwLock<PathBuf>,
}

impl StorageManager {
    /// Create a manager with a worker pool of `config.worker_threads`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let executor = Arc::new(WorkerPool::new(config.worker_threads)?);
        Self::with_executor(config, executor)
    }

    /// Create a manager that runs its chunk tasks on `executor`
    ///
    /// The temp directory is created if it does not exist.
    pub fn with_executor(config: Config, executor: Arc<dyn Executor>) -> Result<Self> {
        let ctx = StoreContext::new(&config)?;
        fs::create_dir_all(&config.temp_dir)?;

        tracing::debug!(
            "Storage manager ready: temp_dir={:?} granularity={} page_size={} workers={}",
            config.temp_dir,
            ctx.granularity(),
            ctx.page_size(),
            executor.parallelism()
        );

        Ok(Self {
            pool: FilePool::new(Arc::clone(&ctx), config.pool_capacity),
            temp_dir: RwLock::new(config.temp_dir.clone()),
            config,
            ctx,
            executor,
        })
    }

    // =========================================================================
    // File Lifecycle
    // =========================================================================

    /// Create a temp file of `size` bytes (rounded up to the alignment)
    ///
    /// 1. Take an instance from the pool
    /// 2. Allocate an id (released ids first)
    /// 3. Create `{temp_dir}/{id}.{ext}`, size it and map it
    ///
    /// On failure the instance is discarded rather than pooled and the id is
    /// returned to the allocator.
    pub fn create_tmp(&self, size: u64) -> Result<MappedFile> {
        let file = self.pool.acquire();
        let id = self.ctx.ids().allocate();
        let path = self.temp_path(id);

        file.set_identity(Some(id), true);
        file.open(&path)?;
        file.resize(size)?;

        tracing::debug!("Created temp file {} ({} bytes) at {:?}", id, file.size(), path);
        Ok(file)
    }

    /// Open (or create) a persistent file at `path`, growing it to `size`
    ///
    /// Existing contents are kept. Persistent files draw ids from their own
    /// never-recycled sequence and are not deleted by `free`.
    pub fn open_persistent(&self, path: &Path, size: u64) -> Result<MappedFile> {
        let file = self.pool.acquire();
        file.open_existing(path)?;
        if file.size() < size {
            file.resize(size)?;
        }
        let id = self.ctx.allocate_persistent_id();
        file.set_identity(Some(id), false);

        tracing::debug!("Opened persistent file {} ({} bytes) at {:?}", id, file.size(), path);
        Ok(file)
    }

    /// Move `src`'s handles, size and identity onto `dst`
    ///
    /// Whatever `dst` owned before is retired (views unloaded, temp file
    /// deleted, id released). `src` ends up closed and without identity.
    pub fn move_file(&self, dst: &MappedFile, src: &MappedFile) -> Result<()> {
        let id = src.id();
        dst.take_over(src)?;
        tracing::debug!("Moved file {:?} ({} bytes)", id, dst.size());
        Ok(())
    }

    /// Retire `file` and return the instance to the pool
    ///
    /// A temp backing file is deleted (best effort) and its id released.
    pub fn free(&self, file: MappedFile) {
        let id = file.id();
        self.pool.release(file);
        tracing::debug!("Freed file {:?}", id);
    }

    // =========================================================================
    // Temp Directory
    // =========================================================================

    /// Change the directory used for new temp files (created if missing)
    pub fn set_temp_dir(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Temp directory set to {:?}", dir);
        *self.temp_dir.write() = dir;
        Ok(())
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.read().clone()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Bytes currently mapped through views of this manager's files
    pub fn used_memory(&self) -> u64 {
        self.ctx.usage().get()
    }

    pub fn granularity(&self) -> u64 {
        self.ctx.granularity()
    }

    pub fn page_size(&self) -> u64 {
        self.ctx.page_size()
    }

    /// Number of idle instances in the pool
    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn context(&self) -> &Arc<StoreContext> {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// "{temp_dir}/{id}.{ext}"
    fn temp_path(&self, id: u64) -> PathBuf {
        self.temp_dir
            .read()
            .join(format!("{}.{}", id, self.config.file_extension))
    }
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("temp_dir", &*self.temp_dir.read())
            .field("granularity", &self.ctx.granularity())
            .field("used_memory", &self.used_memory())
            .field("pool_size", &self.pool.size())
            .finish()
    }
}
