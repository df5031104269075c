//! CRC Module
//!
//! Reflected, table-driven CRC-32 and CRC-64 with O(log n) combination of
//! independently computed checksums.
//!
//! ## Responsibilities
//! - Build the 256-entry byte tables once per polynomial pair
//! - Build the GF(2) "shift by 2^k bits" matrices used by `combine`
//! - Incremental accumulation (reset / append / finalize)
//!
//! ## Combination
//! ```text
//!   crc(A ‖ B) = shift(crc(A), 8·len(B)) ⊕ crc(B)
//! ```
//! Both operands are finalized checksums. The identity holds because the
//! initial value and the final XOR are both all-ones. `combine` is not
//! symmetric: `crc1` always belongs to the earlier range and `len2` is the
//! length of the later range only.

mod engine;
mod tables;

pub use engine::CrcEngine;
pub use tables::CrcTables;

/// Checksum width selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcWidth {
    Crc32,
    Crc64,
}
