//! Parallel copy into mapped files
//!
//! ```text
//!   src bytes  [ chunk 0 | chunk 1 | ... | chunk n ]
//!                  │         │               │
//!                task 0    task 1   ...    task n      (executor)
//!                  ▼         ▼               ▼
//!   dst file   [ view 0  | view 1  | ... | view n  ]   load, copy, unload
//! ```
//! The plain copy uses fixed chunks of `copy_chunk_units` granularity units.
//! The wide copy spreads whole granularity units over at most
//! `max_copy_workers` chunks and moves 32-byte lanes per step.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::{__m256i, _mm256_loadu_si256, _mm256_storeu_si256};

use crate::error::{Result, StoreError};
use crate::mmap::MappedFile;

use super::chunks::{self, Chunk};
use super::executor::{join_all, Job};
use super::StorageManager;

/// Bytes moved per step of the wide copy
pub const VECTOR_WIDTH: usize = 32;

/// Copy `src` into `dst` in 32-byte lanes
///
/// Uses AVX2 when the CPU has it, otherwise a portable lane loop. The tail
/// shorter than one lane is copied byte-wise. Panics if the lengths differ.
pub fn copy_wide(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "copy_wide length mismatch");

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 availability checked at runtime.
            unsafe { copy_lanes_avx2(dst, src) };
            return;
        }
    }
    copy_lanes_portable(dst, src);
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn copy_lanes_avx2(dst: &mut [u8], src: &[u8]) {
    let len = dst.len();
    let lanes = len / VECTOR_WIDTH;

    unsafe {
        for i in 0..lanes {
            let off = i * VECTOR_WIDTH;
            let v = _mm256_loadu_si256(src.as_ptr().add(off) as *const __m256i);
            _mm256_storeu_si256(dst.as_mut_ptr().add(off) as *mut __m256i, v);
        }
    }
    let tail = lanes * VECTOR_WIDTH;
    dst[tail..].copy_from_slice(&src[tail..]);
}

fn copy_lanes_portable(dst: &mut [u8], src: &[u8]) {
    let mut dst_lanes = dst.chunks_exact_mut(VECTOR_WIDTH);
    let mut src_lanes = src.chunks_exact(VECTOR_WIDTH);
    for (d, s) in (&mut dst_lanes).zip(&mut src_lanes) {
        d.copy_from_slice(s);
    }
    dst_lanes.into_remainder().copy_from_slice(src_lanes.remainder());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Plain,
    Wide,
}

impl StorageManager {
    /// Copy `src` into `dst`, creating a temp file when `dst` is `None`
    ///
    /// The destination grows to at least `src.len()` before any task runs.
    /// An empty source is a no-op. On error the destination may be partially
    /// written.
    pub fn memcopy(&self, dst: &mut Option<MappedFile>, src: &[u8]) -> Result<()> {
        let size = src.len() as u64;
        if size == 0 {
            return Ok(());
        }
        let chunk_size = self
            .context()
            .granularity()
            .saturating_mul(self.config().copy_chunk_units)
            .min(size);
        self.parallel_copy(dst, src, chunks::fixed(size, chunk_size), Kernel::Plain)
    }

    /// Same contract as [`memcopy`](Self::memcopy), using the wide kernel
    ///
    /// The destination must not be accessed through other views while the
    /// copy runs.
    pub fn memcopy_avx2(&self, dst: &mut Option<MappedFile>, src: &[u8]) -> Result<()> {
        let size = src.len() as u64;
        if size == 0 {
            return Ok(());
        }
        let plan = chunks::spread(size, self.context().granularity(), self.config().max_copy_workers);
        self.parallel_copy(dst, src, plan, Kernel::Wide)
    }

    /// Filesystem-level copy of `src`'s backing file into `dst`
    ///
    /// `dst` is created as a temp file when `None`. Both files are closed
    /// around the copy and remapped afterwards; `dst` takes `src`'s size.
    pub fn memcopy_file(&self, dst: &mut Option<MappedFile>, src: &MappedFile) -> Result<()> {
        if !src.is_open() {
            return Err(StoreError::NotOpen);
        }
        if dst.is_none() {
            *dst = Some(self.create_tmp(src.size())?);
        }
        let target = dst.as_ref().ok_or(StoreError::NotOpen)?;
        target.copy_backing_from(src)?;

        tracing::debug!("Copied file {:?} into {:?} ({} bytes)", src.id(), target.id(), target.size());
        Ok(())
    }

    fn parallel_copy(
        &self,
        dst: &mut Option<MappedFile>,
        src: &[u8],
        plan: Vec<Chunk>,
        kernel: Kernel,
    ) -> Result<()> {
        let size = src.len() as u64;
        if dst.is_none() {
            *dst = Some(self.create_tmp(size)?);
        }
        let target = dst.as_ref().ok_or(StoreError::NotOpen)?;
        if !target.is_open() {
            return Err(StoreError::NotOpen);
        }
        if target.size() < size {
            target.resize(size)?;
        }

        let task_count = plan.len();
        let jobs: Vec<Job<'_, ()>> = plan
            .into_iter()
            .map(|chunk| Box::new(move || copy_chunk(target, src, chunk, kernel)) as Job<'_, ()>)
            .collect();
        join_all(self.executor(), jobs)?;

        tracing::debug!(
            "Copied {} bytes into file {:?} with {} {:?} tasks",
            size,
            target.id(),
            task_count,
            kernel
        );
        Ok(())
    }
}

fn copy_chunk(dst: &MappedFile, src: &[u8], chunk: Chunk, kernel: Kernel) -> Result<()> {
    let view = dst.load(chunk.offset, chunk.len)?;
    let start = chunk.offset as usize;
    let source = &src[start..start + chunk.len as usize];

    match kernel {
        Kernel::Plain => view.write(0, source)?,
        // SAFETY: chunks of one copy never overlap and the destination is
        // not accessed through other views during the copy.
        Kernel::Wide => unsafe { view.with_bytes_mut(|bytes| copy_wide(bytes, source))? },
    }
    dst.unload(&view);
    Ok(())
}
