//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read requested bytes the store does not hold.
    ///
    /// During log replay this usually means the tail record was cut off by
    /// a crash; the replay layer decides whether that is tolerable.
    #[error("short read at offset {offset}: requested {requested} bytes, store holds {len}")]
    ShortRead {
        /// Offset the read started at.
        offset: u64,
        /// Number of bytes the caller asked for.
        requested: usize,
        /// Total length of the store.
        len: u64,
    },

    /// Truncation target lies beyond the end of the store.
    #[error("cannot truncate to {requested} bytes, store holds only {len}")]
    TruncateBeyondEnd {
        /// The requested new length.
        requested: u64,
        /// Total length of the store.
        len: u64,
    },
}
