//! Configuration for mapstore
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StoreError};

/// CRC-32/ISO-HDLC generator polynomial (normal form)
pub const CRC32_ISO_HDLC_POLY: u32 = 0x04C1_1DB7;

/// CRC-64/XZ generator polynomial (normal form)
pub const CRC64_XZ_POLY: u64 = 0x42F0_E1EB_A9EA_3693;

/// Main configuration for a storage manager
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Backing Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding temporary backing files
    /// Internal structure:
    ///   {temp_dir}/
    ///     ├── 0.tmpbin
    ///     ├── 1.tmpbin
    ///     └── ...
    pub temp_dir: PathBuf,

    /// Extension of temporary backing files (without the dot)
    pub file_extension: String,

    /// Logical file sizes are rounded up to a multiple of this (power of two)
    pub alignment: u64,

    // -------------------------------------------------------------------------
    // Checksum Configuration
    // -------------------------------------------------------------------------
    /// CRC-32 polynomial in normal form; reflected when tables are built
    pub crc32_poly: u32,

    /// CRC-64 polynomial in normal form; reflected when tables are built
    pub crc64_poly: u64,

    // -------------------------------------------------------------------------
    // Parallelism Configuration
    // -------------------------------------------------------------------------
    /// Chunk size of the plain parallel copy, in allocation-granularity units
    pub copy_chunk_units: u64,

    /// Maximum number of concurrent chunks of the wide (vectorized) copy
    pub max_copy_workers: usize,

    /// Number of threads of the default worker pool
    pub worker_threads: usize,

    // -------------------------------------------------------------------------
    // Pool Configuration
    // -------------------------------------------------------------------------
    /// Maximum number of idle file instances kept for reuse
    pub pool_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("./mapstore_tmp"),
            file_extension: "tmpbin".to_string(),
            alignment: 64,
            crc32_poly: CRC32_ISO_HDLC_POLY,
            crc64_poly: CRC64_XZ_POLY,
            copy_chunk_units: 1024,
            max_copy_workers: 100,
            worker_threads: num_cpus::get().max(1),
            pool_capacity: 64,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(StoreError::Config(format!(
                "alignment must be a power of two, got {}",
                self.alignment
            )));
        }
        if self.file_extension.is_empty() {
            return Err(StoreError::Config("file extension must not be empty".to_string()));
        }
        if self.copy_chunk_units == 0 {
            return Err(StoreError::Config("copy_chunk_units must be at least 1".to_string()));
        }
        if self.max_copy_workers == 0 {
            return Err(StoreError::Config("max_copy_workers must be at least 1".to_string()));
        }
        if self.worker_threads == 0 {
            return Err(StoreError::Config("worker_threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the temp directory (created on first use)
    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = path.into();
        self
    }

    /// Set the extension of temporary backing files
    pub fn file_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.file_extension = ext.into();
        self
    }

    /// Set the logical size alignment (in bytes)
    pub fn alignment(mut self, alignment: u64) -> Self {
        self.config.alignment = alignment;
        self
    }

    /// Set the CRC polynomial pair (normal form)
    pub fn crc_polynomials(mut self, poly32: u32, poly64: u64) -> Self {
        self.config.crc32_poly = poly32;
        self.config.crc64_poly = poly64;
        self
    }

    /// Set the plain copy chunk size (in granularity units)
    pub fn copy_chunk_units(mut self, units: u64) -> Self {
        self.config.copy_chunk_units = units;
        self
    }

    /// Set the worker cap of the wide copy
    pub fn max_copy_workers(mut self, count: usize) -> Self {
        self.config.max_copy_workers = count;
        self
    }

    /// Set the number of worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    /// Set the number of idle instances retained by the file pool
    pub fn pool_capacity(mut self, count: usize) -> Self {
        self.config.pool_capacity = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
