//! Mapped File
//!
//! Owns one backing file, its mapping object and the registry of live views.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmap2::MmapOptions;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::context::StoreContext;
use crate::crc::CrcEngine;
use crate::error::{Result, StoreError};

use super::view::{MappedView, ViewSlot};
use super::{align_up, ViewGeometry};

/// Whole-file mapping source
///
/// Always covers exactly `[0, len)` of the file. Views are mapped from it;
/// it is dropped and rebuilt whenever the file size changes.
struct MapObject {
    handle: File,
    len: u64,
}

impl MapObject {
    fn try_clone(&self) -> io::Result<Self> {
        Ok(Self {
            handle: self.handle.try_clone()?,
            len: self.len,
        })
    }
}

/// Handle, size and registry of one file (guarded by the file lock)
#[derive(Default)]
struct FileState {
    /// Temp or persistent id (`None` while pooled or after a move)
    id: Option<u64>,
    /// Backing path, kept across close so the file can be reopened
    path: Option<PathBuf>,
    /// Temp files are deleted and their id recycled on retirement
    temporary: bool,
    /// Backing file handle
    file: Option<File>,
    /// Mapping object covering `[0, size)`, present iff open and `size > 0`
    map: Option<MapObject>,
    /// Logical size, always a multiple of the context alignment
    size: u64,
    /// Bumped every time the mapping object is dropped or rebuilt
    generation: u64,
    /// Live views keyed by mapping base address
    views: HashMap<usize, Arc<ViewSlot>>,
}

/// Shared part of a [`MappedFile`]; views hold a weak reference to it
pub(crate) struct FileInner {
    ctx: Arc<StoreContext>,
    state: RwLock<FileState>,
    crc: Mutex<CrcEngine>,
}

/// A backing file addressable through memory-mapped views
///
/// ## Concurrency:
/// - `state`: RwLock (shared for queries and view mapping, exclusive for
///   registry mutation, resize, reset and close)
/// - each view carries its own lock, so element access never touches `state`
/// - callers must not hold a view across `resize`; it is unloaded under them
pub struct MappedFile {
    inner: Arc<FileInner>,
}

impl MappedFile {
    /// Create a closed file bound to a context
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        let crc = CrcEngine::new(Arc::clone(ctx.tables()));
        Self {
            inner: Arc::new(FileInner {
                ctx,
                state: RwLock::new(FileState::default()),
                crc: Mutex::new(crc),
            }),
        }
    }

    // =========================================================================
    // Open / Close
    // =========================================================================

    /// Create (or truncate) the backing file at `path`
    ///
    /// Any previously held handle and views are released first. The file
    /// starts at size 0 with no mapping object.
    pub fn open(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| StoreError::Create {
                path: path.to_path_buf(),
                source,
            })?;

        let mut state = self.inner.state.write();
        self.inner.close_locked(&mut state);
        state.file = Some(file);
        state.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Open an existing backing file without truncating it
    ///
    /// The file is created if missing and extended to the alignment.
    pub fn open_existing(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| StoreError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        let len = file.metadata()?.len();

        let mut state = self.inner.state.write();
        self.inner.close_locked(&mut state);
        state.file = Some(file);
        state.path = Some(path.to_path_buf());
        self.inner.resize_locked(&mut state, len)
    }

    /// Unload every view and close the mapping object and file handle
    ///
    /// The path and id stay associated with the instance.
    pub fn close(&self) {
        let mut state = self.inner.state.write();
        self.inner.close_locked(&mut state);
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Map `[offset, offset + length)` and register the new view
    ///
    /// Requires an open file, `length > 0` and `offset + length <= size`.
    pub fn load(&self, offset: u64, length: u64) -> Result<MappedView> {
        // Map under the shared lock so concurrent loads do not serialize.
        let (slot, generation) = {
            let state = self.inner.state.read();
            if state.file.is_none() {
                return Err(StoreError::NotOpen);
            }
            check_range(offset, length, state.size)?;
            let map = state.map.as_ref().ok_or(StoreError::NotMapped)?;

            let geometry = ViewGeometry::new(offset, length, self.inner.ctx.granularity());
            debug_assert!(geometry.mapping_start + geometry.mapped_size <= map.len);

            // SAFETY: the range lies inside the file (checked against the
            // logical size, which equals the file length). Concurrent
            // truncation by other processes is outside our contract.
            let region = unsafe {
                MmapOptions::new()
                    .offset(geometry.mapping_start)
                    .len(geometry.mapped_size as usize)
                    .map_raw(&map.handle)
            }
            .map_err(|source| StoreError::Map {
                offset,
                length,
                source,
            })?;

            let slot = Arc::new(ViewSlot::new(geometry, region, self.inner.ctx.page_size()));
            (slot, state.generation)
        };

        let mut state = self.inner.state.write();
        if state.generation != generation {
            // The mapping object changed in between; the slot unmaps on drop.
            return Err(StoreError::MappingInvalidated);
        }
        state.views.insert(slot.base(), Arc::clone(&slot));
        self.inner.ctx.usage().add(slot.mapped_size());
        drop(state);

        tracing::trace!("Loaded view offset={} length={} mapped={}", offset, length, slot.mapped_size());
        Ok(MappedView::new(slot, Arc::downgrade(&self.inner)))
    }

    /// Unload a view; no-op if it is not registered with this file
    pub fn unload(&self, view: &MappedView) {
        self.inner.unload_slot(view.slot());
    }

    /// Unload every registered view
    pub fn unload_all(&self) {
        let mut state = self.inner.state.write();
        self.inner.unload_all_locked(&mut state);
    }

    /// Number of registered views
    pub fn view_count(&self) -> usize {
        self.inner.state.read().views.len()
    }

    /// Flush every registered view to the backing file
    pub fn flush(&self) -> Result<()> {
        let state = self.inner.state.read();
        for slot in state.views.values() {
            slot.flush()?;
        }
        Ok(())
    }

    // =========================================================================
    // Size / Mapping Object
    // =========================================================================

    /// Resize the backing file to `new_size` rounded up to the alignment
    ///
    /// No-op when the aligned size is unchanged. Otherwise every view is
    /// unloaded, the mapping object is dropped, the file is truncated or
    /// extended and the mapping object is rebuilt.
    pub fn resize(&self, new_size: u64) -> Result<()> {
        let mut state = self.inner.state.write();
        self.inner.resize_locked(&mut state, new_size)
    }

    /// Unload all views, drop the mapping object and zero the size
    ///
    /// The file handle stays open.
    pub fn reset(&self) {
        let mut state = self.inner.state.write();
        self.inner.unload_all_locked(&mut state);
        self.inner.drop_map_locked(&mut state);
        state.size = 0;
        self.inner.crc.lock().reset();
    }

    /// Rebuild the mapping object to cover the current size
    pub fn create_map_obj(&self) -> Result<()> {
        let mut state = self.inner.state.write();
        self.inner.unload_all_locked(&mut state);
        self.inner.create_map_obj_locked(&mut state)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Open and, when non-empty, mapped
    pub fn is_valid(&self) -> bool {
        let state = self.inner.state.read();
        state.file.is_some() && (state.size == 0 || state.map.is_some())
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.read().file.is_some()
    }

    pub fn is_mapped(&self) -> bool {
        self.inner.state.read().map.is_some()
    }

    /// Id of the file within its kind
    ///
    /// Temp and persistent files draw ids from separate sequences, so the
    /// same number can name one of each; check [`is_temporary`] to tell
    /// them apart.
    ///
    /// [`is_temporary`]: MappedFile::is_temporary
    pub fn id(&self) -> Option<u64> {
        self.inner.state.read().id
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.state.read().path.clone()
    }

    /// Current logical size (a multiple of the alignment)
    pub fn size(&self) -> u64 {
        self.inner.state.read().size
    }

    pub fn is_temporary(&self) -> bool {
        self.inner.state.read().temporary
    }

    /// View start alignment
    pub fn granularity(&self) -> u64 {
        self.inner.ctx.granularity()
    }

    /// Last whole-file CRC-32 stored by a checksum run
    pub fn crc32(&self) -> u32 {
        self.inner.crc.lock().crc32()
    }

    /// Last whole-file CRC-64 stored by a checksum run
    pub fn crc64(&self) -> u64 {
        self.inner.crc.lock().crc64()
    }

    pub(crate) fn store_crc32(&self, crc: u32) {
        self.inner.crc.lock().set_crc32(crc);
    }

    pub(crate) fn store_crc64(&self, crc: u64) {
        self.inner.crc.lock().set_crc64(crc);
    }

    pub(crate) fn context(&self) -> &Arc<StoreContext> {
        &self.inner.ctx
    }

    pub(crate) fn set_identity(&self, id: Option<u64>, temporary: bool) {
        let mut state = self.inner.state.write();
        state.id = id;
        state.temporary = temporary;
    }

    // =========================================================================
    // Retirement / Transfer
    // =========================================================================

    /// Close everything, delete a temp backing file and release its id
    ///
    /// Leaves the instance clean and without identity.
    pub(crate) fn retire(&self) {
        let mut state = self.inner.state.write();
        self.inner.retire_locked(&mut state);
    }

    /// Take over `src`'s handles, size and identity; `src` ends up closed
    ///
    /// Handles are duplicated before anything is released, so a failed
    /// duplication leaves both files untouched.
    pub(crate) fn take_over(&self, src: &MappedFile) -> Result<()> {
        if Arc::ptr_eq(&self.inner, &src.inner) {
            return Err(StoreError::InvalidArgument("cannot move a file onto itself".to_string()));
        }

        let (mut dst_state, mut src_state) = lock_pair(&self.inner, &src.inner);

        let file = match src_state.file.as_ref() {
            Some(f) => Some(f.try_clone().map_err(|source| StoreError::Duplicate { source })?),
            None => None,
        };
        let map = match src_state.map.as_ref() {
            Some(m) => Some(m.try_clone().map_err(|source| StoreError::Duplicate { source })?),
            None => None,
        };

        self.inner.retire_locked(&mut dst_state);
        dst_state.file = file;
        dst_state.map = map;
        dst_state.size = src_state.size;
        dst_state.id = src_state.id.take();
        dst_state.path = src_state.path.take();
        dst_state.temporary = src_state.temporary;
        dst_state.generation += 1;

        src.inner.close_locked(&mut src_state);
        src_state.temporary = false;

        let (crc32, crc64) = {
            let crc = src.inner.crc.lock();
            (crc.crc32(), crc.crc64())
        };
        let mut crc = self.inner.crc.lock();
        crc.set_crc32(crc32);
        crc.set_crc64(crc64);
        Ok(())
    }

    /// Replace this file's contents with a filesystem-level copy of `src`
    ///
    /// Both files are unmapped and closed around the copy, then reopened and
    /// remapped. The destination takes the size of the source.
    pub(crate) fn copy_backing_from(&self, src: &MappedFile) -> Result<()> {
        if Arc::ptr_eq(&self.inner, &src.inner) {
            return Err(StoreError::InvalidArgument("cannot copy a file onto itself".to_string()));
        }

        let (mut dst_state, mut src_state) = lock_pair(&self.inner, &src.inner);

        let src_path = open_path(&src_state)?;
        let dst_path = open_path(&dst_state)?;

        self.inner.close_locked(&mut dst_state);
        src.inner.close_locked(&mut src_state);

        let copied = fs::copy(&src_path, &dst_path).map_err(|source| StoreError::Copy {
            from: src_path.clone(),
            to: dst_path.clone(),
            source,
        });

        // Reopen both even if the copy or one reopen failed.
        let src_reopened = src.inner.reopen_locked(&mut src_state, &src_path);
        let dst_reopened = self.inner.reopen_locked(&mut dst_state, &dst_path);

        copied?;
        src_reopened?;
        dst_reopened
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        let mut state = self.inner.state.write();
        self.inner.retire_locked(&mut state);
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("MappedFile")
            .field("id", &state.id)
            .field("temporary", &state.temporary)
            .field("path", &state.path)
            .field("size", &state.size)
            .field("open", &state.file.is_some())
            .field("mapped", &state.map.is_some())
            .field("views", &state.views.len())
            .finish()
    }
}

// =============================================================================
// Locked Operations
// =============================================================================

impl FileInner {
    /// Unload one view if it is registered (checked by identity, not address)
    pub(crate) fn unload_slot(&self, slot: &Arc<ViewSlot>) {
        let mut state = self.state.write();
        match state.views.get(&slot.base()) {
            Some(registered) if Arc::ptr_eq(registered, slot) => {}
            _ => return,
        }
        state.views.remove(&slot.base());
        self.release_slot(slot);
    }

    fn release_slot(&self, slot: &ViewSlot) {
        if slot.release() {
            self.ctx.usage().sub(slot.mapped_size());
        }
    }

    fn unload_all_locked(&self, state: &mut FileState) {
        for (_, slot) in state.views.drain() {
            self.release_slot(&slot);
        }
    }

    fn drop_map_locked(&self, state: &mut FileState) {
        state.map = None;
        state.generation += 1;
    }

    fn create_map_obj_locked(&self, state: &mut FileState) -> Result<()> {
        self.drop_map_locked(state);
        if state.size == 0 {
            return Ok(());
        }
        let file = state.file.as_ref().ok_or(StoreError::NotOpen)?;
        let handle = file.try_clone().map_err(|source| StoreError::Duplicate { source })?;
        state.map = Some(MapObject {
            handle,
            len: state.size,
        });
        Ok(())
    }

    fn resize_locked(&self, state: &mut FileState, new_size: u64) -> Result<()> {
        let aligned = align_up(new_size, self.ctx.alignment()).ok_or_else(|| {
            StoreError::InvalidArgument(format!("size {} overflows alignment", new_size))
        })?;
        if aligned == state.size {
            return Ok(());
        }
        if state.file.is_none() {
            return Err(StoreError::NotOpen);
        }

        self.unload_all_locked(state);
        self.drop_map_locked(state);

        if let Some(file) = state.file.as_ref() {
            if let Err(source) = file.set_len(aligned) {
                // Size is unchanged; remap it so the file stays usable.
                self.create_map_obj_locked(state)?;
                return Err(StoreError::Resize { size: aligned, source });
            }
        }
        tracing::debug!("Resized file {:?} from {} to {} bytes", state.id, state.size, aligned);
        state.size = aligned;

        self.create_map_obj_locked(state)
    }

    fn close_locked(&self, state: &mut FileState) {
        self.unload_all_locked(state);
        self.drop_map_locked(state);
        state.file = None;
        state.size = 0;
    }

    fn reopen_locked(&self, state: &mut FileState, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| StoreError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        state.size = file.metadata()?.len();
        state.file = Some(file);
        self.create_map_obj_locked(state)
    }

    fn retire_locked(&self, state: &mut FileState) {
        self.close_locked(state);

        if state.temporary {
            if let Some(path) = state.path.as_ref() {
                if let Err(e) = fs::remove_file(path) {
                    if e.kind() != io::ErrorKind::NotFound {
                        tracing::warn!("Failed to delete temp file {:?}: {}", path, e);
                    }
                }
            }
            if let Some(id) = state.id {
                self.ctx.ids().release(id);
            }
        }

        state.id = None;
        state.path = None;
        state.temporary = false;
        self.crc.lock().reset();
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn check_range(offset: u64, length: u64, size: u64) -> Result<()> {
    let in_bounds = length > 0 && offset.checked_add(length).map_or(false, |end| end <= size);
    if in_bounds {
        Ok(())
    } else {
        Err(StoreError::RangeOutOfBounds { offset, length, size })
    }
}

fn open_path(state: &FileState) -> Result<PathBuf> {
    match (&state.file, &state.path) {
        (Some(_), Some(path)) => Ok(path.clone()),
        _ => Err(StoreError::NotOpen),
    }
}

/// Lock two files exclusively in address order
fn lock_pair<'a>(
    a: &'a FileInner,
    b: &'a FileInner,
) -> (RwLockWriteGuard<'a, FileState>, RwLockWriteGuard<'a, FileState>) {
    if (a as *const FileInner) < (b as *const FileInner) {
        let first = a.state.write();
        let second = b.state.write();
        (first, second)
    } else {
        let second = b.state.write();
        let first = a.state.write();
        (first, second)
    }
}
