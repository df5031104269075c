//! View geometry and size alignment

/// Placement of a view inside its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewGeometry {
    /// Requested start offset
    pub offset: u64,
    /// Requested length
    pub length: u64,
    /// Granularity-aligned file offset actually mapped
    pub mapping_start: u64,
    /// Bytes actually mapped: `(offset % granularity) + length`
    pub mapped_size: u64,
    /// `offset - mapping_start`, always `< granularity`
    pub delta: u64,
}

impl ViewGeometry {
    /// Compute the mapping window for `(offset, length)`
    pub fn new(offset: u64, length: u64, granularity: u64) -> Self {
        let mapping_start = (offset / granularity) * granularity;
        let delta = offset - mapping_start;
        Self {
            offset,
            length,
            mapping_start,
            mapped_size: delta + length,
            delta,
        }
    }
}

/// Round `size` up to a multiple of `alignment` (a power of two)
///
/// Returns `None` on overflow.
pub fn align_up(size: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two());
    size.checked_add(alignment - 1).map(|v| v & !(alignment - 1))
}
