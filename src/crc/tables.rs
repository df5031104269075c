//! CRC lookup tables and GF(2) shift matrices
//!
//! Tables are immutable once built and shared behind an `Arc`.

use std::sync::{Arc, OnceLock};

use crate::config::{CRC32_ISO_HDLC_POLY, CRC64_XZ_POLY};

/// Column representation of a GF(2) linear operator on a CRC register.
/// Entry `i` is the image of register bit `i`. A 32-bit operator only uses
/// the first 32 entries.
type Matrix = [u64; 64];

/// Lazily built tables for the default polynomial pair
static STANDARD: OnceLock<Arc<CrcTables>> = OnceLock::new();

/// Immutable per-polynomial CRC state shared by every engine
pub struct CrcTables {
    /// Reflected CRC-32 polynomial
    poly32: u32,
    /// Reflected CRC-64 polynomial
    poly64: u64,
    /// Sarwate byte table for CRC-32
    table32: [u32; 256],
    /// Sarwate byte table for CRC-64
    table64: [u64; 256],
    /// x^(2^k) operators, k in 0..32
    shift32: ShiftMatrices,
    /// x^(2^k) operators, k in 0..64
    shift64: ShiftMatrices,
}

impl CrcTables {
    /// Build tables from normal-form polynomials (e.g. `0x04C11DB7`)
    pub fn new(poly32: u32, poly64: u64) -> Self {
        let poly32 = poly32.reverse_bits();
        let poly64 = poly64.reverse_bits();

        Self {
            poly32,
            poly64,
            table32: byte_table32(poly32),
            table64: byte_table64(poly64),
            shift32: ShiftMatrices::new(u64::from(poly32), 32),
            shift64: ShiftMatrices::new(poly64, 64),
        }
    }

    /// Shared tables for CRC-32/ISO-HDLC and CRC-64/XZ, built on first use
    pub fn standard() -> Arc<CrcTables> {
        Arc::clone(STANDARD.get_or_init(|| {
            Arc::new(CrcTables::new(CRC32_ISO_HDLC_POLY, CRC64_XZ_POLY))
        }))
    }

    /// Reflected CRC-32 polynomial the tables were built from
    pub fn poly32(&self) -> u32 {
        self.poly32
    }

    /// Reflected CRC-64 polynomial the tables were built from
    pub fn poly64(&self) -> u64 {
        self.poly64
    }

    // =========================================================================
    // Accumulation
    // =========================================================================

    /// Fold `data` into a raw (pre-finalization) CRC-32 register
    #[inline]
    pub fn update32(&self, mut state: u32, data: &[u8]) -> u32 {
        for &byte in data {
            state = (state >> 8) ^ self.table32[((state ^ u32::from(byte)) & 0xFF) as usize];
        }
        state
    }

    /// Fold `data` into a raw (pre-finalization) CRC-64 register
    #[inline]
    pub fn update64(&self, mut state: u64, data: &[u8]) -> u64 {
        for &byte in data {
            state = (state >> 8) ^ self.table64[((state ^ u64::from(byte)) & 0xFF) as usize];
        }
        state
    }

    /// One-shot finalized CRC-32 of `data`
    pub fn checksum32(&self, data: &[u8]) -> u32 {
        !self.update32(u32::MAX, data)
    }

    /// One-shot finalized CRC-64 of `data`
    pub fn checksum64(&self, data: &[u8]) -> u64 {
        !self.update64(u64::MAX, data)
    }

    // =========================================================================
    // Combination
    // =========================================================================

    /// CRC-32 of `A ‖ B` from `crc1 = crc(A)`, `crc2 = crc(B)`, `len2 = len(B)`
    pub fn combine32(&self, crc1: u32, crc2: u32, len2: u64) -> u32 {
        (self.shift32.shift(u64::from(crc1), len2) as u32) ^ crc2
    }

    /// CRC-64 of `A ‖ B` from `crc1 = crc(A)`, `crc2 = crc(B)`, `len2 = len(B)`
    pub fn combine64(&self, crc1: u64, crc2: u64, len2: u64) -> u64 {
        self.shift64.shift(crc1, len2) ^ crc2
    }
}

impl std::fmt::Debug for CrcTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrcTables")
            .field("poly32", &format_args!("{:#010x}", self.poly32))
            .field("poly64", &format_args!("{:#018x}", self.poly64))
            .finish()
    }
}

// =============================================================================
// Byte Tables
// =============================================================================

fn byte_table32(poly: u32) -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ poly } else { crc >> 1 };
        }
        *entry = crc;
    }
    table
}

fn byte_table64(poly: u64) -> [u64; 256] {
    let mut table = [0u64; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u64;
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ poly } else { crc >> 1 };
        }
        *entry = crc;
    }
    table
}

// =============================================================================
// GF(2) Shift Matrices
// =============================================================================

/// Precomputed powers `x^(2^k) mod P` as register operators
struct ShiftMatrices {
    width: usize,
    powers: Vec<Matrix>,
}

impl ShiftMatrices {
    fn new(reflected_poly: u64, width: usize) -> Self {
        // Advancing the reflected register by one zero bit:
        // bit 0 folds the polynomial back in, every other bit moves down one.
        let mut one_bit = [0u64; 64];
        one_bit[0] = reflected_poly;
        for (i, column) in one_bit.iter_mut().enumerate().take(width).skip(1) {
            *column = 1u64 << (i - 1);
        }

        let mut powers = Vec::with_capacity(width);
        powers.push(one_bit);
        for k in 1..width {
            let next = square(&powers[k - 1], width);
            powers.push(next);
        }

        Self { width, powers }
    }

    /// Multiply `crc` by `x^(8 * len_bytes)`
    fn shift(&self, mut crc: u64, len_bytes: u64) -> u64 {
        let mut bits = u128::from(len_bytes) * 8;
        let mut k = 0usize;
        // Powers past the table are derived on the fly.
        let mut spill = self.powers[self.powers.len() - 1];

        while bits != 0 {
            if k >= self.powers.len() {
                spill = square(&spill, self.width);
            }
            if bits & 1 == 1 {
                let mat = if k < self.powers.len() { &self.powers[k] } else { &spill };
                crc = times(mat, crc);
            }
            bits >>= 1;
            k += 1;
        }
        crc
    }
}

fn times(mat: &Matrix, mut vec: u64) -> u64 {
    let mut sum = 0u64;
    let mut i = 0usize;
    while vec != 0 {
        if vec & 1 == 1 {
            sum ^= mat[i];
        }
        vec >>= 1;
        i += 1;
    }
    sum
}

fn square(mat: &Matrix, width: usize) -> Matrix {
    let mut out = [0u64; 64];
    for i in 0..width {
        out[i] = times(mat, mat[i]);
    }
    out
}
