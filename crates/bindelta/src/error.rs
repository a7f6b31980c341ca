//! Error types for diff and patch operations

use std::collections::TryReserveError;
use thiserror::Error;

/// Result type for diff and patch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while computing or applying a delta
#[derive(Error, Debug)]
pub enum Error {
    /// A working array or buffer could not be allocated
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// A read from an injected source failed
    #[error("read error: {0}")]
    Read(#[source] std::io::Error),

    /// A write to an injected sink failed
    #[error("write error: {0}")]
    Write(#[source] std::io::Error),

    /// Structurally invalid patch data
    #[error("corrupt patch: {0}")]
    CorruptPatch(String),

    /// Declared and actual sizes disagree
    #[error("size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The compressed payload could not be decoded
    #[error("decompression error: {0}")]
    Decompression(String),

    /// A size cannot be represented in a patch header field
    #[error("size {0} cannot be represented in the patch format")]
    TooLarge(u64),

    /// The patch file format cannot describe an empty buffer
    #[error("empty {0} buffer: the patch header requires nonzero sizes")]
    EmptyInput(&'static str),
}
