//! Streaming WAL record iterator and recovery scan.
//!
//! # Recovery Policy
//!
//! The iterator distinguishes **tolerated** conditions (crash mid-write)
//! from **fatal** conditions (corruption):
//!
//! Tolerated, treated as clean end-of-log:
//! - truncated header: fewer than 11 bytes remain at the end of the WAL
//! - truncated payload: record length exceeds the remaining bytes
//!
//! Fatal, aborting environment open:
//! - CRC mismatch (`ChecksumMismatch`)
//! - invalid magic bytes (`WalCorruption`)
//! - unknown record type (`WalCorruption`)
//! - future format version (`WalCorruption`)
//!
//! A crash mid-write loses at most the record being written, which by the
//! commit protocol can only belong to a transaction without a commit record.

use crate::error::{EngineError, EngineResult};
use crate::types::TxnId;
use crate::wal::record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
use crate::wal::writer::{CRC_SIZE, HEADER_SIZE};
use cedar_storage::StorageBackend;
use parking_lot::MutexGuard;
use std::collections::HashSet;

/// A streaming iterator over WAL records.
///
/// Reads records one-by-one from the storage backend; memory use is bounded
/// by the largest single record.
pub struct WalRecordIterator<'a> {
    backend: MutexGuard<'a, Box<dyn StorageBackend>>,
    total_size: u64,
    current_offset: u64,
    finished: bool,
}

impl<'a> WalRecordIterator<'a> {
    /// Creates a new streaming iterator starting at the given offset.
    pub(crate) fn new(
        backend: MutexGuard<'a, Box<dyn StorageBackend>>,
        start_offset: u64,
    ) -> EngineResult<Self> {
        let total_size = backend.len()?;
        Ok(Self {
            backend,
            total_size,
            current_offset: start_offset,
            finished: false,
        })
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(Some((offset, record)))` for a valid record, `Ok(None)`
    /// at the end of the WAL or on a truncated tail, `Err(...)` on
    /// corruption or I/O error.
    fn read_next_record(&mut self) -> EngineResult<Option<(u64, WalRecord)>> {
        let record_start = self.current_offset;
        let remaining = self.total_size - self.current_offset;

        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            // incomplete header, crash mid-write
            return Ok(None);
        }

        let mut header = [0u8; HEADER_SIZE];
        self.backend.read_exact_at(record_start, &mut header)?;

        if header[0..4] != WAL_MAGIC {
            return Err(EngineError::wal_corruption(format!(
                "invalid magic at offset {record_start}"
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > WAL_VERSION {
            return Err(EngineError::wal_corruption(format!(
                "unsupported version {version} at offset {record_start}"
            )));
        }

        let type_byte = header[6];
        let record_type = WalRecordType::from_byte(type_byte).ok_or_else(|| {
            EngineError::wal_corruption(format!(
                "unknown record type {type_byte} at offset {record_start}"
            ))
        })?;

        let payload_len =
            u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as u64;
        let total_len = HEADER_SIZE as u64 + payload_len + CRC_SIZE as u64;

        if remaining < total_len {
            // incomplete payload, crash mid-write
            return Ok(None);
        }

        let mut body = vec![0u8; (payload_len + CRC_SIZE as u64) as usize];
        self.backend
            .read_exact_at(record_start + HEADER_SIZE as u64, &mut body)?;
        let payload = &body[..payload_len as usize];
        let crc_bytes = &body[payload_len as usize..];
        let stored_crc =
            u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        // CRC covers header + payload
        let mut checked = Vec::with_capacity(HEADER_SIZE + payload.len());
        checked.extend_from_slice(&header);
        checked.extend_from_slice(payload);
        let computed_crc = compute_crc32(&checked);

        if stored_crc != computed_crc {
            return Err(EngineError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let record = WalRecord::decode_payload(record_type, payload)?;
        self.current_offset += total_len;

        Ok(Some((record_start, record)))
    }
}

impl Iterator for WalRecordIterator<'_> {
    type Item = EngineResult<(u64, WalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next_record() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// First recovery pass over the WAL.
///
/// Collects the set of committed transactions and the high-water marks for
/// LSNs and transaction IDs. The second pass then applies the op records of
/// committed transactions in LSN order.
#[derive(Debug, Default)]
pub struct RecoveryScan {
    committed: HashSet<TxnId>,
    max_lsn: u64,
    max_txn_id: u64,
}

impl RecoveryScan {
    /// Creates an empty scan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a record stream and collects commit markers.
    pub fn scan<I>(&mut self, iter: I) -> EngineResult<()>
    where
        I: Iterator<Item = EngineResult<(u64, WalRecord)>>,
    {
        for result in iter {
            let (_, record) = result?;

            self.max_lsn = self.max_lsn.max(record.lsn().as_u64());
            if let Some(txn_id) = record.txn_id() {
                self.max_txn_id = self.max_txn_id.max(txn_id.as_u64());
            }

            match record {
                WalRecord::Commit { txn_id, .. } => {
                    self.committed.insert(txn_id);
                }
                // an abort after a failed commit overrides the commit record
                WalRecord::Abort { txn_id, .. } => {
                    self.committed.remove(&txn_id);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Whether a transaction's commit record was found.
    #[must_use]
    pub fn is_committed(&self, txn_id: TxnId) -> bool {
        self.committed.contains(&txn_id)
    }

    /// Highest LSN seen in the WAL.
    #[must_use]
    pub fn max_lsn(&self) -> u64 {
        self.max_lsn
    }

    /// Highest transaction ID seen in the WAL.
    #[must_use]
    pub fn max_txn_id(&self) -> u64 {
        self.max_txn_id
    }
}
