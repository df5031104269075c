//! Incremental CRC engine
//!
//! Holds a running CRC-32 and CRC-64 register over shared tables.

use std::sync::Arc;

use super::CrcTables;

/// Running CRC-32 / CRC-64 accumulator
///
/// Both registers follow the reflected convention: reset to all-ones,
/// finalize by XOR with all-ones. After `finalize*` the register holds the
/// checksum, which is what [`CrcEngine::crc32`] / [`CrcEngine::crc64`] report.
#[derive(Clone)]
pub struct CrcEngine {
    tables: Arc<CrcTables>,
    crc32: u32,
    crc64: u64,
}

impl CrcEngine {
    /// Create an engine over the given tables, both registers reset
    pub fn new(tables: Arc<CrcTables>) -> Self {
        Self {
            tables,
            crc32: u32::MAX,
            crc64: u64::MAX,
        }
    }

    /// Create an engine over CRC-32/ISO-HDLC and CRC-64/XZ
    pub fn standard() -> Self {
        Self::new(CrcTables::standard())
    }

    /// Reset both registers
    pub fn reset(&mut self) {
        self.reset32();
        self.reset64();
    }

    pub fn reset32(&mut self) {
        self.crc32 = u32::MAX;
    }

    pub fn reset64(&mut self) {
        self.crc64 = u64::MAX;
    }

    /// Fold `data` into the CRC-32 register, returning the raw register
    pub fn append_crc32(&mut self, data: &[u8]) -> u32 {
        self.crc32 = self.tables.update32(self.crc32, data);
        self.crc32
    }

    /// Fold `data` into the CRC-64 register, returning the raw register
    pub fn append_crc64(&mut self, data: &[u8]) -> u64 {
        self.crc64 = self.tables.update64(self.crc64, data);
        self.crc64
    }

    /// Finalize both registers
    pub fn finalize(&mut self) {
        self.finalize32();
        self.finalize64();
    }

    pub fn finalize32(&mut self) -> u32 {
        self.crc32 ^= u32::MAX;
        self.crc32
    }

    pub fn finalize64(&mut self) -> u64 {
        self.crc64 ^= u64::MAX;
        self.crc64
    }

    /// Current CRC-32 register (the checksum once finalized)
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Current CRC-64 register (the checksum once finalized)
    pub fn crc64(&self) -> u64 {
        self.crc64
    }

    pub(crate) fn set_crc32(&mut self, crc: u32) {
        self.crc32 = crc;
    }

    pub(crate) fn set_crc64(&mut self, crc: u64) {
        self.crc64 = crc;
    }

    /// Checksum of `A ‖ B` from the finalized checksums of `A` and `B`
    pub fn combine_crc32(&self, crc1: u32, crc2: u32, len2: u64) -> u32 {
        self.tables.combine32(crc1, crc2, len2)
    }

    /// Checksum of `A ‖ B` from the finalized checksums of `A` and `B`
    pub fn combine_crc64(&self, crc1: u64, crc2: u64, len2: u64) -> u64 {
        self.tables.combine64(crc1, crc2, len2)
    }

    /// Tables this engine accumulates with
    pub fn tables(&self) -> &Arc<CrcTables> {
        &self.tables
    }
}

impl std::fmt::Debug for CrcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrcEngine")
            .field("crc32", &format_args!("{:#010x}", self.crc32))
            .field("crc64", &format_args!("{:#018x}", self.crc64))
            .finish()
    }
}
