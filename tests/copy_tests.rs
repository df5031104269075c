//! Tests for parallel copy
//!
//! These tests verify:
//! - memcopy and memcopy_avx2 match a naive copy for sizes below one
//!   granularity unit, exactly one unit, and several units plus a remainder
//! - Destination creation and growth before dispatch
//! - Chunk task counts of both planners
//! - The wide copy kernel on its own

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mapstore::storage::{copy_wide, Task, VECTOR_WIDTH};
use mapstore::{Config, Executor, InlineExecutor, MappedFile, StorageManager, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// Counts submitted tasks, runs them inline
#[derive(Default)]
struct CountingExecutor {
    tasks: AtomicUsize,
}

impl Executor for CountingExecutor {
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>) {
        self.tasks.fetch_add(tasks.len(), Ordering::SeqCst);
        InlineExecutor.run_all(tasks);
    }

    fn parallelism(&self) -> usize {
        1
    }
}

/// Manager with one-unit copy chunks so small buffers still split
fn setup_manager() -> (TempDir, StorageManager) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .temp_dir(temp_dir.path())
        .copy_chunk_units(1)
        .worker_threads(4)
        .build();
    let manager = StorageManager::new(config).unwrap();
    (temp_dir, manager)
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
}

fn file_contents(file: &MappedFile) -> Vec<u8> {
    let view = file.load(0, file.size()).unwrap();
    view.to_vec().unwrap()
}

fn test_sizes(gran: usize) -> Vec<usize> {
    vec![100, gran / 2 + 3, gran, 3 * gran + 100]
}

/// Naive single-threaded copy into a zeroed buffer of the file's size
fn naive_copy(src: &[u8], file_size: u64) -> Vec<u8> {
    let mut expected = vec![0u8; file_size as usize];
    expected[..src.len()].copy_from_slice(src);
    expected
}

// =============================================================================
// Plain Copy Tests
// =============================================================================

#[test]
fn test_memcopy_matches_naive_copy() {
    let (_temp, manager) = setup_manager();
    let gran = manager.granularity() as usize;

    for size in test_sizes(gran) {
        let src = pattern(size, 1);
        let mut dst = None;
        manager.memcopy(&mut dst, &src).unwrap();

        let file = dst.unwrap();
        assert!(file.size() >= size as u64);
        assert_eq!(file_contents(&file), naive_copy(&src, file.size()), "size {}", size);
        assert_eq!(manager.used_memory(), 0);
    }
}

#[test]
fn test_memcopy_default_chunking() {
    let temp_dir = TempDir::new().unwrap();
    let manager = StorageManager::new(Config::builder().temp_dir(temp_dir.path()).build()).unwrap();
    let src = pattern(5 * manager.granularity() as usize + 17, 9);

    let mut dst = None;
    manager.memcopy(&mut dst, &src).unwrap();
    let file = dst.unwrap();
    assert_eq!(file_contents(&file)[..src.len()], src[..]);
}

#[test]
fn test_memcopy_grows_existing_destination() {
    let (_temp, manager) = setup_manager();
    let src = pattern(10_000, 3);

    let mut dst = Some(manager.create_tmp(64).unwrap());
    manager.memcopy(&mut dst, &src).unwrap();

    let file = dst.unwrap();
    assert_eq!(file.size(), 10_048);
    assert_eq!(file.id(), Some(0));
    assert_eq!(file_contents(&file)[..10_000], src[..]);
}

#[test]
fn test_memcopy_keeps_larger_destination() {
    let (_temp, manager) = setup_manager();
    let gran = manager.granularity();
    let file = manager.create_tmp(4 * gran).unwrap();
    {
        let view = file.load(0, 4 * gran).unwrap();
        view.fill(0xEE).unwrap();
    }

    let src = pattern(100, 5);
    let mut dst = Some(file);
    manager.memcopy(&mut dst, &src).unwrap();

    let file = dst.unwrap();
    assert_eq!(file.size(), 4 * gran);
    let contents = file_contents(&file);
    assert_eq!(contents[..100], src[..]);
    assert!(contents[100..].iter().all(|&b| b == 0xEE));
}

#[test]
fn test_memcopy_empty_source_is_noop() {
    let (_temp, manager) = setup_manager();
    let mut dst = None;
    manager.memcopy(&mut dst, &[]).unwrap();
    manager.memcopy_avx2(&mut dst, &[]).unwrap();
    assert!(dst.is_none());
}

#[test]
fn test_memcopy_closed_destination_fails() {
    let (_temp, manager) = setup_manager();
    let file = manager.create_tmp(4096).unwrap();
    file.close();

    let mut dst = Some(file);
    let err = manager.memcopy(&mut dst, &pattern(100, 0)).unwrap_err();
    assert!(matches!(err, StoreError::NotOpen));
}

#[test]
fn test_memcopy_task_count() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().temp_dir(temp_dir.path()).copy_chunk_units(2).build();
    let executor = Arc::new(CountingExecutor::default());
    let manager = StorageManager::with_executor(config, executor.clone()).unwrap();
    let gran = manager.granularity() as usize;

    // 5 units + 1 byte in 2-unit chunks: [2 units] [2 units] [1 unit + 1 byte]
    let mut dst = None;
    manager.memcopy(&mut dst, &pattern(5 * gran + 1, 0)).unwrap();
    assert_eq!(executor.tasks.load(Ordering::SeqCst), 3);
}

// =============================================================================
// Wide Copy Tests
// =============================================================================

#[test]
fn test_memcopy_avx2_matches_naive_copy() {
    let (_temp, manager) = setup_manager();
    let gran = manager.granularity() as usize;

    for size in test_sizes(gran) {
        let src = pattern(size, 11);
        let mut dst = None;
        manager.memcopy_avx2(&mut dst, &src).unwrap();

        let file = dst.unwrap();
        assert_eq!(file_contents(&file), naive_copy(&src, file.size()), "size {}", size);
    }
}

#[test]
fn test_memcopy_avx2_respects_worker_cap() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().temp_dir(temp_dir.path()).max_copy_workers(3).build();
    let executor = Arc::new(CountingExecutor::default());
    let manager = StorageManager::with_executor(config, executor.clone()).unwrap();
    let gran = manager.granularity() as usize;

    let src = pattern(10 * gran + 33, 4);
    let mut dst = None;
    manager.memcopy_avx2(&mut dst, &src).unwrap();

    assert_eq!(executor.tasks.load(Ordering::SeqCst), 3);
    assert_eq!(file_contents(dst.as_ref().unwrap())[..src.len()], src[..]);
}

#[test]
fn test_memcopy_avx2_small_buffer_single_task() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().temp_dir(temp_dir.path()).build();
    let executor = Arc::new(CountingExecutor::default());
    let manager = StorageManager::with_executor(config, executor.clone()).unwrap();

    let src = pattern(VECTOR_WIDTH * 3 + 5, 2);
    let mut dst = None;
    manager.memcopy_avx2(&mut dst, &src).unwrap();

    assert_eq!(executor.tasks.load(Ordering::SeqCst), 1);
    assert_eq!(file_contents(dst.as_ref().unwrap())[..src.len()], src[..]);
}

#[test]
fn test_plain_and_wide_agree() {
    let (_temp, manager) = setup_manager();
    let src = pattern(7 * manager.granularity() as usize + 1234, 77);

    let mut plain = None;
    let mut wide = None;
    manager.memcopy(&mut plain, &src).unwrap();
    manager.memcopy_avx2(&mut wide, &src).unwrap();

    assert_eq!(file_contents(plain.as_ref().unwrap()), file_contents(wide.as_ref().unwrap()));
}

#[test]
fn test_copy_wide_kernel() {
    for len in [0, 1, VECTOR_WIDTH - 1, VECTOR_WIDTH, VECTOR_WIDTH + 1, 10 * VECTOR_WIDTH + 7] {
        let src = pattern(len, 200);
        let mut dst = vec![0u8; len];
        copy_wide(&mut dst, &src);
        assert_eq!(dst, src, "len {}", len);
    }
}
