//! Parallel whole-file CRC
//!
//! ```text
//!   file   [ rem | gran | gran | ... | gran ]
//!            c0    c1     c2           cn        per-chunk CRC (parallel)
//!
//!   crc = combine(...combine(combine(c0, c1, gran), c2, gran)..., cn, gran)
//! ```
//! The chunk CRCs are folded serially in file order. Each chunk uses its
//! own engine, so tasks share nothing but the read-only tables.

use std::sync::Arc;

use crate::crc::{CrcEngine, CrcTables};
use crate::error::{Result, StoreError};
use crate::mmap::MappedFile;

use super::chunks::{self, Chunk};
use super::executor::{join_all, Job};
use super::StorageManager;

impl StorageManager {
    /// CRC-32 of the whole file; also stored on the file
    ///
    /// An empty file has CRC 0. Writing to the file while it is being
    /// checksummed gives an unspecified result.
    pub fn calc_crc32(&self, file: &MappedFile) -> Result<u32> {
        let plan = self.checksum_plan(file)?;
        let crcs = self.chunk_checksums(file, &plan, |engine, bytes| {
            engine.reset32();
            engine.append_crc32(bytes);
            engine.finalize32()
        })?;
        let crc = fold(&plan, crcs, |acc, crc, len| self.context().tables().combine32(acc, crc, len));

        file.store_crc32(crc);
        tracing::debug!("CRC-32 of file {:?} over {} chunks: {:#010x}", file.id(), plan.len(), crc);
        Ok(crc)
    }

    /// CRC-64 of the whole file; also stored on the file
    ///
    /// An empty file has CRC 0. Concurrent writes give an unspecified result.
    pub fn calc_crc64(&self, file: &MappedFile) -> Result<u64> {
        let plan = self.checksum_plan(file)?;
        let crcs = self.chunk_checksums(file, &plan, |engine, bytes| {
            engine.reset64();
            engine.append_crc64(bytes);
            engine.finalize64()
        })?;
        let crc = fold(&plan, crcs, |acc, crc, len| self.context().tables().combine64(acc, crc, len));

        file.store_crc64(crc);
        tracing::debug!("CRC-64 of file {:?} over {} chunks: {:#018x}", file.id(), plan.len(), crc);
        Ok(crc)
    }

    fn checksum_plan(&self, file: &MappedFile) -> Result<Vec<Chunk>> {
        if !file.is_open() {
            return Err(StoreError::NotOpen);
        }
        Ok(chunks::leading_remainder(file.size(), self.context().granularity()))
    }

    /// Map each chunk as its own view and checksum it with a fresh engine
    fn chunk_checksums<R, F>(&self, file: &MappedFile, plan: &[Chunk], checksum: F) -> Result<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(&mut CrcEngine, &[u8]) -> R + Sync,
    {
        let tables: &Arc<CrcTables> = self.context().tables();
        let checksum = &checksum;

        let jobs: Vec<Job<'_, R>> = plan
            .iter()
            .map(|&chunk| {
                Box::new(move || {
                    let view = file.load(chunk.offset, chunk.len)?;
                    let mut engine = CrcEngine::new(Arc::clone(tables));
                    // SAFETY: chunks never overlap each other and the file
                    // is not written while it is checksummed.
                    let crc = unsafe { view.with_bytes(|bytes| checksum(&mut engine, bytes)) };
                    file.unload(&view);
                    crc
                }) as Job<'_, R>
            })
            .collect();

        join_all(self.executor(), jobs)
    }
}

/// Fold chunk CRCs in file order, shifting by each following chunk's length
fn fold<T: Copy + Default>(plan: &[Chunk], crcs: Vec<T>, combine: impl Fn(T, T, u64) -> T) -> T {
    let mut iter = plan.iter().zip(crcs);
    let mut acc = match iter.next() {
        Some((_, first)) => first,
        None => return T::default(),
    };
    for (chunk, crc) in iter {
        acc = combine(acc, crc, chunk.len);
    }
    acc
}
