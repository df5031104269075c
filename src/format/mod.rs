//! Container Format
//!
//! Byte layout of the 64-byte header that prefixes persisted containers,
//! plus the snapshot companion records.
//!
//! ## Header Layout (little-endian)
//! ```text
//! ┌───────┬─────────┬────────────┬───────────┬───────┬─────┬───────────┬────────────────┬──────────┐
//! │ magic │ version │ chunk_size │ timestamp │ flags │ crc │ sub_magic │ sub_chunk_size │ reserved │
//! │  4 B  │   4 B   │    8 B     │    8 B    │  8 B  │ 8 B │    8 B    │      8 B       │   8 B    │
//! └───────┴─────────┴────────────┴───────────┴───────┴─────┴───────────┴────────────────┴──────────┘
//! ```
//! Compression and encryption are flags only; payloads are never
//! transformed here.

mod header;
mod snapshot;

pub use header::{
    read_header, write_header, ContainerHeader, HeaderFlags, PayloadKind, FORMAT_VERSION, HEADER_SIZE,
    MAGIC,
};
pub use snapshot::{SnapshotChunk, SnapshotList};
