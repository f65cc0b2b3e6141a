//! The append-only store contract.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The engine needs exactly three things from its storage: ordered appends,
/// positioned reads of what was appended earlier, and an fsync barrier that
/// a commit acknowledgement can wait on. Record framing, checksums and
/// replay all live above this trait; a store never interprets its bytes.
///
/// Reads fill a caller-supplied buffer. The write-ahead log reads a
/// fixed-size record header first and sizes the body buffer from it, so the
/// store never has to guess an allocation.
pub trait StorageBackend: Send + Sync {
    /// Fills `buf` with the bytes stored at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with `ShortRead` when fewer than `buf.len()` bytes are stored
    /// at `offset`, and with `Io` on an underlying read failure.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()>;

    /// Appends `data` at the end of the store.
    ///
    /// Returns the offset the data was written at.
    ///
    /// # Errors
    ///
    /// Fails with `Io` on an underlying write failure.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Number of bytes in the store; also the offset the next append gets.
    ///
    /// # Errors
    ///
    /// Fails if the length cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Whether the store holds no bytes.
    ///
    /// # Errors
    ///
    /// Fails if the length cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Durability barrier.
    ///
    /// After this returns successfully, every prior append survives process
    /// termination and power loss.
    ///
    /// # Errors
    ///
    /// Fails with `Io` when the barrier cannot be established.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte at or beyond `new_len`.
    ///
    /// Used when a checkpoint has made the log's content redundant.
    ///
    /// # Errors
    ///
    /// Fails with `TruncateBeyondEnd` when `new_len` exceeds the current
    /// length, and with `Io` on an underlying failure.
    fn truncate(&mut self, new_len: u64) -> StorageResult<()>;
}
