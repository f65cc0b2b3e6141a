//! Error types for the cedardb engine.

use crate::types::{DbName, TxnId};
use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in cedardb engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] cedar_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The visible state for a read or erase has no such key.
    #[error("key not found")]
    KeyNotFound,

    /// A write without overwrite/duplicate hit an existing key.
    #[error("duplicate key")]
    DuplicateKey,

    /// The operation is blocked by a concurrent active transaction's
    /// operation on the same key.
    #[error("transaction conflict with {other} on key")]
    TxnConflict {
        /// The transaction owning the conflicting operation.
        other: TxnId,
    },

    /// Commit or abort was attempted while cursors are still bound to the
    /// transaction.
    #[error("transaction has {count} open cursor(s)")]
    CursorStillOpen {
        /// Number of cursors still bound.
        count: u32,
    },

    /// Close was attempted while transactions are still active and no
    /// auto-cleanup was requested.
    #[error("{count} transaction(s) still open")]
    TxnStillOpen {
        /// Number of active transactions.
        count: usize,
    },

    /// Malformed parameter (reserved database name, zero cursor, ...).
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the parameter issue.
        message: String,
    },

    /// Key or record exceeds the configured size limits.
    #[error("limits reached: {message}")]
    LimitsReached {
        /// Description of the exceeded limit.
        message: String,
    },

    /// The operation-log arena is exhausted.
    #[error("out of memory: transaction operation arena is full")]
    OutOfMemory,

    /// WAL content is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected in a persisted structure.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Invalid environment file format or version.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Another process holds the environment lock.
    #[error("environment locked: another process has exclusive access")]
    EnvironmentLocked,

    /// The environment has been closed.
    #[error("environment is closed")]
    EnvironmentClosed,

    /// The database has been closed.
    #[error("database {name} is closed")]
    DatabaseClosed {
        /// Name of the closed database.
        name: DbName,
    },

    /// No database with this name exists in the environment.
    #[error("database {name} not found")]
    DatabaseNotFound {
        /// The requested database name.
        name: DbName,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl EngineError {
    /// Creates a transaction conflict error.
    pub(crate) fn conflict(other: TxnId) -> Self {
        Self::TxnConflict { other }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a limits reached error.
    pub fn limits_reached(message: impl Into<String>) -> Self {
        Self::LimitsReached {
            message: message.into(),
        }
    }

    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns true if this error is a transaction conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TxnConflict { .. })
    }

    /// Returns true if this error is a key-not-found result.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound)
    }
}
