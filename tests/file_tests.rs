//! Tests for MappedFile and MappedView
//!
//! These tests verify:
//! - Loading and unloading views (used-memory accounting, bounds)
//! - View geometry for unaligned offsets
//! - Resize alignment, idempotence and view invalidation
//! - Reset / close semantics
//! - Typed element access and raw byte access
//! - Views outliving their file or being dropped early

use std::sync::Arc;

use mapstore::{ErrorKind, MappedFile, StoreContext, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Open a fresh file of `size` bytes in its own temp directory
fn setup_file(size: u64) -> (TempDir, Arc<StoreContext>, MappedFile) {
    let temp_dir = TempDir::new().unwrap();
    let ctx = StoreContext::with_defaults();
    let file = MappedFile::new(Arc::clone(&ctx));
    file.open(&temp_dir.path().join("data.bin")).unwrap();
    file.resize(size).unwrap();
    (temp_dir, ctx, file)
}

// =============================================================================
// Load / Unload Tests
// =============================================================================

#[test]
fn test_load_unload_restores_used_memory() {
    let (_temp, ctx, file) = setup_file(64 * 1024);
    let gran = ctx.granularity();
    let before = ctx.usage().get();

    for (offset, length) in [(0, 1), (0, 64 * 1024), (10, 100), (gran + 7, 3 * 1024), (64 * 1024 - 1, 1)] {
        let view = file.load(offset, length).unwrap();
        assert_eq!(ctx.usage().get(), before + (offset % gran) + length);
        file.unload(&view);
        assert_eq!(ctx.usage().get(), before, "offset {} length {}", offset, length);
    }
}

#[test]
fn test_unload_is_idempotent() {
    let (_temp, ctx, file) = setup_file(4096);
    let view = file.load(0, 128).unwrap();

    file.unload(&view);
    file.unload(&view);
    assert_eq!(ctx.usage().get(), 0);
    assert_eq!(file.view_count(), 0);
    assert!(!view.is_loaded());
}

#[test]
fn test_unload_foreign_view_is_noop() {
    let (_temp_a, ctx_a, file_a) = setup_file(4096);
    let (_temp_b, _ctx_b, file_b) = setup_file(4096);

    let view = file_a.load(0, 64).unwrap();
    file_b.unload(&view);

    assert!(view.is_loaded());
    assert_eq!(file_a.view_count(), 1);
    assert_eq!(ctx_a.usage().get(), 64);
}

#[test]
fn test_drop_view_unloads() {
    let (_temp, ctx, file) = setup_file(8192);
    {
        let _a = file.load(0, 100).unwrap();
        let _b = file.load(4096, 100).unwrap();
        assert_eq!(file.view_count(), 2);
    }
    assert_eq!(file.view_count(), 0);
    assert_eq!(ctx.usage().get(), 0);
}

#[test]
fn test_unload_all() {
    let (_temp, ctx, file) = setup_file(8192);
    let views: Vec<_> = (0..4).map(|i| file.load(i * 100, 50).unwrap()).collect();

    file.unload_all();

    assert_eq!(file.view_count(), 0);
    assert_eq!(ctx.usage().get(), 0);
    assert!(views.iter().all(|v| !v.is_loaded()));
}

#[test]
fn test_view_geometry_unaligned_offset() {
    let (_temp, ctx, file) = setup_file(64 * 1024);
    let gran = ctx.granularity();

    let view = file.load(gran + 10, 100).unwrap();
    assert_eq!(view.offset(), gran + 10);
    assert_eq!(view.len(), 100);
    assert_eq!(view.mapping_start(), gran);
    assert_eq!(view.delta(), 10);
    assert_eq!(view.mapped_size(), 110);
    assert!(view.delta() < gran);
}

// =============================================================================
// Bounds Tests
// =============================================================================

#[test]
fn test_load_up_to_end_of_file() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(4000, 96).unwrap();
    assert_eq!(view.len(), 96);
}

#[test]
fn test_load_past_end_fails() {
    let (_temp, ctx, file) = setup_file(4096);

    let err = file.load(4000, 97).unwrap_err();
    assert!(matches!(err, StoreError::RangeOutOfBounds { offset: 4000, length: 97, size: 4096 }));
    assert!(err.is_precondition());

    assert!(file.load(4096, 1).is_err());
    assert!(file.load(u64::MAX, 2).is_err());
    assert_eq!(ctx.usage().get(), 0);
}

#[test]
fn test_load_zero_length_fails() {
    let (_temp, _ctx, file) = setup_file(4096);
    assert!(matches!(file.load(0, 0), Err(StoreError::RangeOutOfBounds { .. })));
}

#[test]
fn test_load_on_closed_file_fails() {
    let ctx = StoreContext::with_defaults();
    let file = MappedFile::new(ctx);
    assert!(matches!(file.load(0, 1), Err(StoreError::NotOpen)));
    assert!(!file.is_valid());
}

#[test]
fn test_load_on_empty_file_fails() {
    let (_temp, _ctx, file) = setup_file(0);
    assert!(file.is_valid());
    assert!(!file.is_mapped());
    assert!(file.load(0, 1).is_err());
}

// =============================================================================
// Resize Tests
// =============================================================================

#[test]
fn test_resize_rounds_to_alignment() {
    let (_temp, _ctx, file) = setup_file(10_000);
    assert_eq!(file.size(), 10_048);

    file.resize(1).unwrap();
    assert_eq!(file.size(), 64);

    file.resize(128).unwrap();
    assert_eq!(file.size(), 128);

    let path = file.path().unwrap();
    assert_eq!(std::fs::metadata(path).unwrap().len(), 128);
}

#[test]
fn test_resize_same_size_is_noop() {
    let (_temp, _ctx, file) = setup_file(1000);
    let view = file.load(0, 64).unwrap();

    // 1000 and 1024 align to the same size: no remap, view survives
    file.resize(1000).unwrap();
    file.resize(1024).unwrap();
    assert_eq!(file.size(), 1024);
    assert!(view.is_loaded());
    assert_eq!(file.view_count(), 1);
}

#[test]
fn test_resize_unloads_views() {
    let (_temp, ctx, file) = setup_file(4096);
    let view = file.load(0, 64).unwrap();

    file.resize(8192).unwrap();

    assert!(!view.is_loaded());
    assert!(matches!(view.at::<u8>(0), Err(StoreError::ViewUnloaded)));
    assert_eq!(file.view_count(), 0);
    assert_eq!(ctx.usage().get(), 0);
    assert!(file.is_mapped());
}

#[test]
fn test_resize_keeps_data() {
    let (_temp, _ctx, file) = setup_file(4096);
    {
        let view = file.load(0, 8).unwrap();
        view.set_at::<u64>(0, 0xDEAD_BEEF_CAFE_F00D).unwrap();
    }

    file.resize(3 * 4096).unwrap();

    let view = file.load(0, 8).unwrap();
    assert_eq!(view.at::<u64>(0).unwrap(), 0xDEAD_BEEF_CAFE_F00D);
    let tail = file.load(3 * 4096 - 8, 8).unwrap();
    assert_eq!(tail.at::<u64>(0).unwrap(), 0);
}

#[test]
fn test_resize_closed_file_fails() {
    let ctx = StoreContext::with_defaults();
    let file = MappedFile::new(ctx);
    assert!(matches!(file.resize(64), Err(StoreError::NotOpen)));
}

#[test]
fn test_failed_resize_leaves_file_usable() {
    let (_temp, _ctx, file) = setup_file(4096);
    {
        let view = file.load(0, 8).unwrap();
        view.set_at::<u64>(0, 0xFEED).unwrap();
    }

    match file.resize(1 << 62) {
        Err(err) => {
            assert!(matches!(err, StoreError::Resize { .. }));
            assert_eq!(err.kind(), ErrorKind::Io);
            assert!(err.os_error_code().is_some());
        }
        // Some filesystems accept a sparse file this large.
        Ok(()) => file.resize(4096).unwrap(),
    }

    assert_eq!(file.size(), 4096);
    assert!(file.is_valid());
    let view = file.load(0, 8).unwrap();
    assert_eq!(view.at::<u64>(0).unwrap(), 0xFEED);
}

// =============================================================================
// Reset / Close Tests
// =============================================================================

#[test]
fn test_reset_keeps_handle() {
    let (_temp, ctx, file) = setup_file(4096);
    let view = file.load(0, 64).unwrap();

    file.reset();

    assert!(!view.is_loaded());
    assert_eq!(file.size(), 0);
    assert!(file.is_open());
    assert!(!file.is_mapped());
    assert_eq!(ctx.usage().get(), 0);

    // Still usable after a reset
    file.resize(256).unwrap();
    assert!(file.load(0, 256).is_ok());
}

#[test]
fn test_close_releases_everything() {
    let (_temp, ctx, file) = setup_file(4096);
    let _view = file.load(0, 64).unwrap();

    file.close();

    assert!(!file.is_open());
    assert!(!file.is_mapped());
    assert_eq!(file.size(), 0);
    assert_eq!(file.view_count(), 0);
    assert_eq!(ctx.usage().get(), 0);
    assert!(matches!(file.load(0, 1), Err(StoreError::NotOpen)));
}

#[test]
fn test_create_map_obj_unloads_views() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(0, 64).unwrap();

    file.create_map_obj().unwrap();

    assert!(!view.is_loaded());
    assert!(file.is_mapped());
    assert!(file.load(0, 64).is_ok());
}

#[test]
fn test_open_existing_keeps_contents() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("persist.bin");
    let ctx = StoreContext::with_defaults();

    {
        let file = MappedFile::new(Arc::clone(&ctx));
        file.open(&path).unwrap();
        file.resize(100).unwrap();
        let view = file.load(0, 100).unwrap();
        view.write(0, b"hello mapped world").unwrap();
        file.unload(&view);
        file.flush().unwrap();
    }

    let file = MappedFile::new(ctx);
    file.open_existing(&path).unwrap();
    assert_eq!(file.size(), 128);

    let view = file.load(0, 18).unwrap();
    let mut buf = [0u8; 18];
    view.read(0, &mut buf).unwrap();
    assert_eq!(&buf, b"hello mapped world");
}

// =============================================================================
// Element Access Tests
// =============================================================================

#[test]
fn test_at_and_set_at() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(64, 400).unwrap();

    for i in 0..100 {
        view.set_at::<u32>(i, (i as u32) * 3).unwrap();
    }
    for i in 0..100 {
        assert_eq!(view.at::<u32>(i).unwrap(), (i as u32) * 3);
    }
    assert_eq!(view.at::<u64>(49).unwrap(), (99u64 * 3) << 32 | (98 * 3));
}

#[test]
fn test_at_index_out_of_range() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(0, 10).unwrap();

    assert!(view.at::<u32>(1).is_ok());
    let err = view.at::<u32>(2).unwrap_err();
    assert!(matches!(err, StoreError::IndexOutOfBounds { index: 2, elem_size: 4, len: 10 }));
    assert!(view.set_at::<u16>(5, 1).is_err());
}

#[test]
fn test_overlapping_views_alias() {
    let (_temp, _ctx, file) = setup_file(8192);
    let wide = file.load(0, 8192).unwrap();
    let narrow = file.load(4100, 4).unwrap();

    narrow.set_at::<u32>(0, 0xAABB_CCDD).unwrap();
    let mut buf = [0u8; 4];
    wide.read(4100, &mut buf).unwrap();
    assert_eq!(u32::from_le_bytes(buf), 0xAABB_CCDD);
}

#[test]
fn test_read_write_bounds() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(0, 16).unwrap();

    assert!(view.write(8, &[1; 8]).is_ok());
    assert!(matches!(view.write(9, &[1; 8]), Err(StoreError::RangeOutOfBounds { .. })));
    let mut buf = [0u8; 17];
    assert!(view.read(0, &mut buf).is_err());
}

#[test]
fn test_get_ptr_points_at_offset() {
    let (_temp, _ctx, file) = setup_file(8192);
    let view = file.load(4097, 16).unwrap();
    view.write(0, &[0x5A]).unwrap();

    let ptr = view.get_ptr().unwrap();
    // SAFETY: the view is loaded and at least one byte long.
    assert_eq!(unsafe { *ptr }, 0x5A);
    assert_eq!(ptr as usize, view.base_address() + view.delta() as usize);
}

#[test]
fn test_with_bytes_sees_whole_range() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(10, 300).unwrap();
    view.fill(7).unwrap();

    // SAFETY: no other view of the file exists.
    let sum: u64 = unsafe { view.with_bytes(|bytes| bytes.iter().map(|&b| b as u64).sum()) }.unwrap();
    assert_eq!(sum, 7 * 300);
}

#[test]
fn test_overlapping_views_copy_rather_than_borrow() {
    let (_temp, _ctx, file) = setup_file(4096);
    let a = file.load(0, 64).unwrap();
    let b = file.load(0, 64).unwrap();

    let before = a.to_vec().unwrap();
    b.write(0, &[0xAB]).unwrap();

    // Earlier reads are snapshots; later reads see the shared bytes.
    assert_eq!(before[0], 0);
    assert_eq!(a.to_vec().unwrap()[0], 0xAB);
    assert_eq!(a.at::<u8>(0).unwrap(), 0xAB);
}

#[test]
fn test_fill_and_to_vec_fail_after_unload() {
    let (_temp, _ctx, file) = setup_file(4096);
    let view = file.load(0, 16).unwrap();
    file.unload(&view);

    assert!(matches!(view.fill(1), Err(StoreError::ViewUnloaded)));
    assert!(matches!(view.to_vec(), Err(StoreError::ViewUnloaded)));
}

#[test]
fn test_warm_pages() {
    let (_temp, ctx, file) = setup_file(64 * 1024);
    let page = ctx.page_size();

    let view = file.load(0, 3 * page).unwrap();
    assert_eq!(view.warm_pages().unwrap(), 3);

    let small = file.load(5, 1).unwrap();
    assert_eq!(small.warm_pages().unwrap(), 1);
}

// =============================================================================
// Lifetime Tests
// =============================================================================

#[test]
fn test_view_outlives_file() {
    let (_temp, ctx, file) = setup_file(4096);
    let view = file.load(0, 64).unwrap();

    drop(file);

    assert!(!view.is_loaded());
    assert!(matches!(view.at::<u8>(0), Err(StoreError::ViewUnloaded)));
    assert!(matches!(view.get_ptr(), Err(StoreError::ViewUnloaded)));
    drop(view);
    assert_eq!(ctx.usage().get(), 0);
}

#[test]
fn test_concurrent_views() {
    let (_temp, ctx, file) = setup_file(16 * 4096);

    std::thread::scope(|s| {
        for t in 0..8u64 {
            let file = &file;
            s.spawn(move || {
                for round in 0..50u64 {
                    let view = file.load(t * 8192 + round, 512).unwrap();
                    view.set_at::<u64>(0, t * 1000 + round).unwrap();
                    assert_eq!(view.at::<u64>(0).unwrap(), t * 1000 + round);
                }
            });
        }
    });

    assert_eq!(file.view_count(), 0);
    assert_eq!(ctx.usage().get(), 0);
}
