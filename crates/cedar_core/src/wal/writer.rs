//! WAL writer.

use crate::error::{EngineError, EngineResult};
use crate::wal::record::{compute_crc32, WalRecord, WAL_MAGIC, WAL_VERSION};
use cedar_storage::StorageBackend;
use parking_lot::Mutex;

/// Header size for WAL records.
/// magic (4) + version (2) + type (1) + length (4) = 11 bytes
pub(crate) const HEADER_SIZE: usize = 11;

/// CRC size.
pub(crate) const CRC_SIZE: usize = 4;

/// Manages WAL writes and reads.
///
/// The `WalManager` provides append-only writes to the WAL and supports
/// streaming reads for recovery. Callers serialize appends through the
/// environment lock, which keeps the file in LSN order.
pub struct WalManager {
    /// Storage backend for WAL data.
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl WalManager {
    /// Creates a new WAL manager.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Appends a record to the WAL.
    ///
    /// Returns the offset where the record was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or an I/O error
    /// occurs during the write.
    pub fn append(&self, record: &WalRecord) -> EngineResult<u64> {
        let payload = record.encode_payload()?;
        let record_type = record.record_type();

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);

        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(record_type.as_byte());

        let len = u32::try_from(payload.len())
            .map_err(|_| EngineError::invalid_operation("WAL record payload too large"))?;
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        // CRC32 over everything before it
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;

        Ok(offset)
    }

    /// Syncs all appended records to durable storage.
    pub fn sync(&self) -> EngineResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Returns the current WAL size.
    pub fn size(&self) -> EngineResult<u64> {
        Ok(self.backend.lock().len()?)
    }

    /// Returns a streaming iterator over WAL records.
    ///
    /// Records are decoded one-by-one from the storage backend; memory use
    /// is bounded regardless of WAL size.
    pub fn iter(&self) -> EngineResult<super::WalRecordIterator<'_>> {
        let backend = self.backend.lock();
        super::WalRecordIterator::new(backend, 0)
    }

    /// Reads all records from the WAL.
    ///
    /// For large WALs prefer [`Self::iter`]; this method is retained for
    /// small WALs and tests.
    pub fn read_all(&self) -> EngineResult<Vec<(u64, WalRecord)>> {
        self.iter()?.collect()
    }

    /// Clears all data from the WAL.
    ///
    /// Used after a checkpoint, when everything the WAL holds is covered by
    /// the snapshot.
    pub fn clear(&self) -> EngineResult<()> {
        self.backend.lock().truncate(0)?;
        Ok(())
    }

    /// Returns the backend for testing purposes.
    ///
    /// Allows tests to simulate crash scenarios like truncated writes or
    /// corrupted records.
    #[cfg(test)]
    pub(crate) fn backend_for_testing(&self) -> &Mutex<Box<dyn StorageBackend>> {
        &self.backend
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DbName, Lsn, TxnId};
    use cedar_storage::InMemoryBackend;

    fn create_wal() -> WalManager {
        WalManager::new(Box::new(InMemoryBackend::new()))
    }

    #[test]
    fn append_and_read_begin() {
        let wal = create_wal();
        let record = WalRecord::Begin {
            lsn: Lsn::new(1),
            txn_id: TxnId::new(1),
        };
        wal.append(&record).unwrap();

        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, record);
    }

    #[test]
    fn append_full_transaction_sequence() {
        let wal = create_wal();

        let r1 = WalRecord::Begin {
            lsn: Lsn::new(1),
            txn_id: TxnId::new(1),
        };
        let r2 = WalRecord::Op {
            lsn: Lsn::new(2),
            txn_id: TxnId::new(1),
            db_name: DbName::new(1),
            kind: crate::txn::OpKind::Insert,
            key: b"hello".to_vec(),
            record: b"world".to_vec(),
            duplicate_index: None,
        };
        let r3 = WalRecord::Commit {
            lsn: Lsn::new(3),
            txn_id: TxnId::new(1),
        };

        wal.append(&r1).unwrap();
        wal.append(&r2).unwrap();
        wal.append(&r3).unwrap();

        let records = wal.read_all().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].1, r1);
        assert_eq!(records[1].1, r2);
        assert_eq!(records[2].1, r3);
    }

    #[test]
    fn read_empty_wal() {
        let wal = create_wal();
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn clear_wal() {
        let wal = create_wal();
        wal.append(&WalRecord::Begin {
            lsn: Lsn::new(1),
            txn_id: TxnId::new(1),
        })
        .unwrap();
        assert!(wal.size().unwrap() > 0);

        wal.clear().unwrap();
        assert_eq!(wal.size().unwrap(), 0);
        assert!(wal.read_all().unwrap().is_empty());
    }

    #[test]
    fn offsets_increase() {
        let wal = create_wal();
        let o1 = wal
            .append(&WalRecord::Begin {
                lsn: Lsn::new(1),
                txn_id: TxnId::new(1),
            })
            .unwrap();
        let o2 = wal
            .append(&WalRecord::Commit {
                lsn: Lsn::new(2),
                txn_id: TxnId::new(1),
            })
            .unwrap();
        assert_eq!(o1, 0);
        assert!(o2 > o1);
    }
}
