//! Snapshot companion records
//!
//! A snapshot list tracks the versions retained for one file; each snapshot
//! chunk maps a range of the original file to where its saved copy lives.
//! Both are plain bincode records.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Snapshot bookkeeping of one file (payload of a `SNAPLIST` container)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotList {
    pub current_snapshot_id: u64,
    pub last_snapshot_id: u64,
    pub current_offset: u64,
    pub last_offset: u64,
    /// Oldest snapshots beyond this count are dropped
    pub max_snapshots: u64,
    /// Name of the file the snapshots belong to
    pub file_name: String,
}

impl SnapshotList {
    pub fn new(file_name: impl Into<String>, max_snapshots: u64) -> Self {
        Self {
            max_snapshots,
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    /// Advance to a new snapshot written at `offset`
    pub fn push(&mut self, offset: u64) -> u64 {
        self.last_snapshot_id = self.current_snapshot_id;
        self.last_offset = self.current_offset;
        self.current_snapshot_id += 1;
        self.current_offset = offset;
        self.current_snapshot_id
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// One saved range (payload of a `SNAPDATA` container)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotChunk {
    pub original_offset: u64,
    pub original_size: u64,
    pub snapshot_offset: u64,
    pub snapshot_size: u64,
}

impl SnapshotChunk {
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    bincode::serialize(record).map_err(|e| StoreError::Format(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Format(e.to_string()))
}
