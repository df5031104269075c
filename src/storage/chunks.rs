//! Chunk planning for parallel copy and checksum
//!
//! Every chunk except possibly one starts on a granularity boundary, so each
//! can be mapped as its own view.

/// A byte range `[offset, offset + len)` handled by one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chunk {
    pub offset: u64,
    pub len: u64,
}

/// Consecutive chunks of `chunk_size`; the last one may be shorter
pub(crate) fn fixed(total: u64, chunk_size: u64) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if total == 0 || chunk_size == 0 {
        return chunks;
    }
    let mut offset = 0;
    while offset < total {
        let len = chunk_size.min(total - offset);
        chunks.push(Chunk { offset, len });
        offset += len;
    }
    chunks
}

/// Split `total` bytes into granularity units and spread them as evenly as
/// possible over at most `max_workers` chunks
///
/// The first `units % workers` chunks get one extra unit. The last chunk is
/// clipped to the end of the range.
pub(crate) fn spread(total: u64, granularity: u64, max_workers: usize) -> Vec<Chunk> {
    if total == 0 || granularity == 0 {
        return Vec::new();
    }
    let units = total.div_ceil(granularity);
    let workers = units.min(max_workers.max(1) as u64);
    let per_worker = units / workers;
    let extra = units % workers;

    let mut chunks = Vec::with_capacity(workers as usize);
    let mut offset = 0;
    for i in 0..workers {
        let count = per_worker + u64::from(i < extra);
        let len = (count * granularity).min(total - offset);
        if len == 0 {
            break;
        }
        chunks.push(Chunk { offset, len });
        offset += len;
    }
    chunks
}

/// Checksum partition: the `total % granularity` remainder first, at offset
/// 0, then full granularity chunks
pub(crate) fn leading_remainder(total: u64, granularity: u64) -> Vec<Chunk> {
    if total == 0 || granularity == 0 {
        return Vec::new();
    }
    let remainder = total % granularity;
    let full = total / granularity;

    let mut chunks = Vec::with_capacity(full as usize + 1);
    if remainder > 0 {
        chunks.push(Chunk { offset: 0, len: remainder });
    }
    for k in 0..full {
        chunks.push(Chunk {
            offset: remainder + k * granularity,
            len: granularity,
        });
    }
    chunks
}
