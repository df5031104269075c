//! Error types for mapstore
//!
//! Errors are split into categories so callers can tell a programming error
//! (bad offset, closed handle) from an environment failure (the OS refused a
//! mapping or a resize) and from a failed parallel operation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Broad category of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller passed bad input or used a handle in the wrong state.
    /// Checked before any OS call, never retried.
    Precondition,

    /// The operating system failed (mapping, file creation, resize, copy).
    Io,

    /// A chunk task inside a parallel copy/checksum failed abnormally.
    Aggregate,

    /// A persisted record could not be decoded.
    Format,

    /// Invalid configuration.
    Config,
}

/// Unified error type for mapstore operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Precondition Errors
    // -------------------------------------------------------------------------
    #[error("File is not open")]
    NotOpen,

    #[error("File has no mapping object")]
    NotMapped,

    #[error("Range out of bounds: offset {offset} + length {length} exceeds file size {size}")]
    RangeOutOfBounds { offset: u64, length: u64, size: u64 },

    #[error("Index {index} out of range for {elem_size}-byte elements in a {len}-byte view")]
    IndexOutOfBounds { index: usize, elem_size: usize, len: usize },

    #[error("View has been unloaded")]
    ViewUnloaded,

    #[error("Mapping object was replaced while the view was being loaded")]
    MappingInvalidated,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to map view (offset {offset}, length {length}): {source}")]
    Map {
        offset: u64,
        length: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resize file to {size} bytes: {source}")]
    Resize {
        size: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to duplicate handle: {source}")]
    Duplicate {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from:?} to {to:?}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Aggregate Errors
    // -------------------------------------------------------------------------
    #[error("Chunk task panicked: {0}")]
    TaskPanicked(String),

    #[error("Chunk task finished without reporting a result")]
    TaskLost,

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotOpen
            | StoreError::NotMapped
            | StoreError::RangeOutOfBounds { .. }
            | StoreError::IndexOutOfBounds { .. }
            | StoreError::ViewUnloaded
            | StoreError::MappingInvalidated
            | StoreError::InvalidArgument(_) => ErrorKind::Precondition,

            StoreError::Io(_)
            | StoreError::Map { .. }
            | StoreError::Resize { .. }
            | StoreError::Create { .. }
            | StoreError::Duplicate { .. }
            | StoreError::Copy { .. } => ErrorKind::Io,

            StoreError::TaskPanicked(_) | StoreError::TaskLost => ErrorKind::Aggregate,

            StoreError::Format(_) => ErrorKind::Format,

            StoreError::Config(_) => ErrorKind::Config,
        }
    }

    /// True for errors caused by the caller (bad input, wrong handle state)
    pub fn is_precondition(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }

    /// True for errors reported by the operating system
    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// Platform error code carried by an I/O failure, if any
    pub fn os_error_code(&self) -> Option<i32> {
        match self {
            StoreError::Io(source)
            | StoreError::Map { source, .. }
            | StoreError::Resize { source, .. }
            | StoreError::Create { source, .. }
            | StoreError::Duplicate { source }
            | StoreError::Copy { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}
