//! OS memory geometry

/// Allocation granularity on Windows (start-address alignment of a view)
#[cfg(not(unix))]
const WINDOWS_ALLOCATION_GRANULARITY: u64 = 64 * 1024;

/// Fallback page size when the OS query fails
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// OS page size in bytes
pub fn page_size() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as u64
        } else {
            DEFAULT_PAGE_SIZE
        }
    }
    #[cfg(not(unix))]
    {
        DEFAULT_PAGE_SIZE
    }
}

/// Alignment required for the file offset of a mapped view
///
/// Equal to the page size on Unix; 64 KiB on Windows.
pub fn allocation_granularity() -> u64 {
    #[cfg(unix)]
    {
        page_size()
    }
    #[cfg(not(unix))]
    {
        WINDOWS_ALLOCATION_GRANULARITY
    }
}
