//! End-to-end tests for mapstore

use mapstore::{Config, CrcTables, StorageManager};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_manager() -> (TempDir, StorageManager) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder().temp_dir(temp_dir.path()).build();
    (temp_dir, StorageManager::new(config).unwrap())
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_create_write_checksum_reload() {
    let (_temp, manager) = setup_manager();

    // Step 1: 10000 bytes requested, 10048 observed
    let file = manager.create_tmp(10_000).unwrap();
    assert_eq!(file.size(), 10_048);

    // Step 2: write a known pattern across the full mapped range
    let view = file.load(0, file.size()).unwrap();
    let expected: Vec<u8> = (0..view.len()).map(|i| (i * 37 % 256) as u8).collect();
    view.write(0, &expected).unwrap();
    assert_eq!(view.to_vec().unwrap(), expected);

    // Step 3: checksum, unload, reload, checksum again
    let crc32 = manager.calc_crc32(&file).unwrap();
    let crc64 = manager.calc_crc64(&file).unwrap();
    file.unload(&view);
    assert_eq!(manager.used_memory(), 0);

    let reloaded = file.load(0, file.size()).unwrap();
    let again = reloaded.to_vec().unwrap();
    assert_eq!(again, expected);
    drop(reloaded);

    assert_eq!(manager.calc_crc32(&file).unwrap(), crc32);
    assert_eq!(manager.calc_crc64(&file).unwrap(), crc64);
    assert_eq!(crc32, crc32fast::hash(&expected));
    assert_eq!(crc64, CrcTables::standard().checksum64(&expected));

    manager.free(file);
    assert_eq!(manager.used_memory(), 0);
}

#[test]
fn test_copy_move_free_cycle() {
    let (temp_dir, manager) = setup_manager();
    let src: Vec<u8> = (0..3 * manager.granularity() as usize + 5).map(|i| (i % 199) as u8).collect();

    let mut copy = None;
    manager.memcopy_avx2(&mut copy, &src).unwrap();
    let copy = copy.unwrap();
    let crc = manager.calc_crc32(&copy).unwrap();

    let mut duplicate = None;
    manager.memcopy_file(&mut duplicate, &copy).unwrap();
    let duplicate = duplicate.unwrap();
    assert_eq!(manager.calc_crc32(&duplicate).unwrap(), crc);

    let holder = manager.create_tmp(64).unwrap();
    manager.move_file(&holder, &duplicate).unwrap();
    assert_eq!(manager.calc_crc32(&holder).unwrap(), crc);

    manager.free(duplicate);
    manager.free(holder);
    manager.free(copy);

    assert_eq!(manager.used_memory(), 0);
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}
