//! Mapped View
//!
//! A bounds-checked window onto a byte range of one file.

use std::mem::size_of;
use std::sync::{Arc, Weak};

use bytemuck::Pod;
use memmap2::MmapRaw;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};

use super::file::FileInner;
use super::ViewGeometry;

/// Registry entry shared between a file and the view handed to the caller
///
/// The region lock is the view's own lock: element access only ever takes
/// this lock, never the owning file's lock.
pub(crate) struct ViewSlot {
    geometry: ViewGeometry,
    /// Address of the first mapped byte (registry key)
    base: usize,
    page_size: u64,
    /// `None` once unloaded
    region: RwLock<Option<MmapRaw>>,
}

impl ViewSlot {
    pub(crate) fn new(geometry: ViewGeometry, region: MmapRaw, page_size: u64) -> Self {
        Self {
            geometry,
            base: region.as_ptr() as usize,
            page_size,
            region: RwLock::new(Some(region)),
        }
    }

    pub(crate) fn base(&self) -> usize {
        self.base
    }

    pub(crate) fn mapped_size(&self) -> u64 {
        self.geometry.mapped_size
    }

    /// Unmap the region. Returns false if it was already unmapped.
    pub(crate) fn release(&self) -> bool {
        self.region.write().take().is_some()
    }

    pub(crate) fn flush(&self) -> Result<()> {
        if let Some(region) = self.region.read().as_ref() {
            region.flush()?;
        }
        Ok(())
    }
}

/// A loaded window onto `[offset, offset + len)` of a [`MappedFile`]
///
/// The view holds only a weak, validated reference to its owner. Dropping
/// the view unloads it if it is still registered; once unloaded (explicitly,
/// by `unload_all`, resize, reset, close or recycling of the owner) every
/// access fails with [`StoreError::ViewUnloaded`].
///
/// Views of overlapping ranges alias the same file bytes. The safe
/// accessors copy in and out of the mapping and never lend references to it;
/// [`with_bytes`](Self::with_bytes) and its mutable twin do, and are unsafe.
///
/// [`MappedFile`]: super::MappedFile
pub struct MappedView {
    slot: Arc<ViewSlot>,
    owner: Weak<FileInner>,
}

impl MappedView {
    pub(crate) fn new(slot: Arc<ViewSlot>, owner: Weak<FileInner>) -> Self {
        Self { slot, owner }
    }

    pub(crate) fn slot(&self) -> &Arc<ViewSlot> {
        &self.slot
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Requested start offset within the file
    pub fn offset(&self) -> u64 {
        self.slot.geometry.offset
    }

    /// Usable length in bytes (the requested length)
    pub fn len(&self) -> usize {
        self.slot.geometry.length as usize
    }

    /// Always false: zero-length views cannot be loaded
    pub fn is_empty(&self) -> bool {
        self.slot.geometry.length == 0
    }

    /// Bytes actually mapped (delta + length)
    pub fn mapped_size(&self) -> u64 {
        self.slot.geometry.mapped_size
    }

    /// Distance from the mapping base to the first usable byte
    pub fn delta(&self) -> u64 {
        self.slot.geometry.delta
    }

    /// Granularity-aligned file offset of the mapping base
    pub fn mapping_start(&self) -> u64 {
        self.slot.geometry.mapping_start
    }

    /// Address of the mapping base
    pub fn base_address(&self) -> usize {
        self.slot.base
    }

    /// Full placement of this view
    pub fn geometry(&self) -> ViewGeometry {
        self.slot.geometry
    }

    /// Whether the region is still mapped
    pub fn is_loaded(&self) -> bool {
        self.slot.region.read().is_some()
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Pointer to the first usable byte (`base + delta`)
    ///
    /// The pointer is valid only while the view stays loaded.
    pub fn get_ptr(&self) -> Result<*mut u8> {
        let guard = self.slot.region.read();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;
        // SAFETY: delta < mapped_size, inside the mapping.
        Ok(unsafe { region.as_mut_ptr().add(self.slot.geometry.delta as usize) })
    }

    /// Read the `index`-th element of type `T`
    pub fn at<T: Pod>(&self, index: usize) -> Result<T> {
        let byte_offset = self.element_offset::<T>(index)?;
        let guard = self.slot.region.read();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: element_offset checked the element lies inside the usable
        // range; T is Pod so any bit pattern is valid; read is unaligned.
        Ok(unsafe { (region.as_ptr().add(byte_offset) as *const T).read_unaligned() })
    }

    /// Overwrite the `index`-th element of type `T`
    pub fn set_at<T: Pod>(&self, index: usize, value: T) -> Result<()> {
        let byte_offset = self.element_offset::<T>(index)?;
        let guard = self.slot.region.write();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: bounds checked above; write is unaligned.
        unsafe { (region.as_mut_ptr().add(byte_offset) as *mut T).write_unaligned(value) };
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `offset` (relative to the view)
    pub fn read(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_span(offset, buf.len())?;
        let guard = self.slot.region.read();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: the span lies inside the usable range; no reference into
        // the mapping is formed, so overlapping views cannot alias it.
        unsafe {
            let from = region.as_ptr().add(self.slot.geometry.delta as usize + offset);
            std::ptr::copy_nonoverlapping(from, buf.as_mut_ptr(), buf.len());
        }
        Ok(())
    }

    /// Copy `data` into the view starting at `offset` (relative to the view)
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_span(offset, data.len())?;
        let guard = self.slot.region.write();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: as in read.
        unsafe {
            let to = region.as_mut_ptr().add(self.slot.geometry.delta as usize + offset);
            std::ptr::copy_nonoverlapping(data.as_ptr(), to, data.len());
        }
        Ok(())
    }

    /// Copy the whole usable range out of the mapping
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.len()];
        self.read(0, &mut out)?;
        Ok(out)
    }

    /// Set every usable byte to `value`
    pub fn fill(&self, value: u8) -> Result<()> {
        let guard = self.slot.region.write();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: [delta, mapped_size) lies inside the live mapping.
        unsafe {
            let to = region.as_mut_ptr().add(self.slot.geometry.delta as usize);
            std::ptr::write_bytes(to, value, self.len());
        }
        Ok(())
    }

    /// Run `f` over the usable bytes under the view's shared lock
    ///
    /// # Safety
    ///
    /// The slice borrows file memory that other views of the same file can
    /// reach. No view overlapping this range may be written while `f` runs.
    pub unsafe fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let guard = self.slot.region.read();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: [delta, mapped_size) lies inside the live mapping, which
        // cannot be unmapped while the guard is held.
        let bytes = unsafe {
            std::slice::from_raw_parts(
                region.as_ptr().add(self.slot.geometry.delta as usize),
                self.len(),
            )
        };
        Ok(f(bytes))
    }

    /// Run `f` over the usable bytes under the view's exclusive lock
    ///
    /// # Safety
    ///
    /// No view overlapping this range may be read or written while `f` runs.
    pub unsafe fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let guard = self.slot.region.write();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        // SAFETY: as in with_bytes.
        let bytes = unsafe {
            std::slice::from_raw_parts_mut(
                region.as_mut_ptr().add(self.slot.geometry.delta as usize),
                self.len(),
            )
        };
        Ok(f(bytes))
    }

    /// Touch one byte per OS page across the usable range
    ///
    /// A prefetch hint only. Returns the number of pages touched.
    pub fn warm_pages(&self) -> Result<u64> {
        let guard = self.slot.region.read();
        let region = guard.as_ref().ok_or(StoreError::ViewUnloaded)?;

        let start = self.slot.geometry.delta as usize;
        let end = self.slot.geometry.mapped_size as usize;
        let step = self.slot.page_size.max(1) as usize;

        let mut touched = 0;
        let mut pos = start;
        while pos < end {
            // SAFETY: pos < mapped_size.
            unsafe { std::ptr::read_volatile(region.as_ptr().add(pos)) };
            touched += 1;
            pos += step;
        }
        Ok(touched)
    }

    /// Flush dirty pages of this view to the backing file
    pub fn flush(&self) -> Result<()> {
        if !self.is_loaded() {
            return Err(StoreError::ViewUnloaded);
        }
        self.slot.flush()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Byte offset of element `index` from the mapping base
    fn element_offset<T>(&self, index: usize) -> Result<usize> {
        let elem_size = size_of::<T>();
        if elem_size == 0 {
            return Err(StoreError::InvalidArgument(
                "zero-sized element type".to_string(),
            ));
        }
        let len = self.len();
        if index >= len / elem_size {
            return Err(StoreError::IndexOutOfBounds { index, elem_size, len });
        }
        Ok(self.slot.geometry.delta as usize + index * elem_size)
    }

    fn check_span(&self, offset: usize, count: usize) -> Result<()> {
        match offset.checked_add(count) {
            Some(end) if end <= self.len() => Ok(()),
            _ => Err(StoreError::RangeOutOfBounds {
                offset: offset as u64,
                length: count as u64,
                size: self.len() as u64,
            }),
        }
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.unload_slot(&self.slot);
        }
    }
}

impl std::fmt::Debug for MappedView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedView")
            .field("offset", &self.slot.geometry.offset)
            .field("length", &self.slot.geometry.length)
            .field("mapped_size", &self.slot.geometry.mapped_size)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
