//! Checkpoint snapshot of the environment.
//!
//! The snapshot holds the database registry and the full content of every
//! base tree as of a checkpoint, together with the highest LSN that has been
//! flushed into the trees. WAL replay skips records at or below that LSN,
//! which makes replay over a freshly loaded snapshot idempotent.
//!
//! The session-level transaction flag is deliberately not part of the
//! image: whether transactions are enabled is decided anew on every open.

use crate::config::DbOptions;
use crate::error::{EngineError, EngineResult};
use crate::types::DbName;
use crate::wal::compute_crc32;

/// Magic bytes for the snapshot file.
pub(crate) const SNAPSHOT_MAGIC: [u8; 4] = *b"CSNP";

/// Current snapshot format version.
pub(crate) const SNAPSHOT_VERSION: u16 = 1;

/// Database flag bit: duplicate keys enabled.
const DB_FLAG_DUPLICATES: u32 = 1;

/// One database inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SnapshotDb {
    pub name: DbName,
    pub options: DbOptions,
    /// Key and duplicate list pairs, in key order.
    pub entries: Vec<(Vec<u8>, Vec<Vec<u8>>)>,
}

/// A decoded snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct Snapshot {
    /// Highest LSN whose effects are contained in the trees below.
    pub flushed_lsn: u64,
    /// Next transaction ID to hand out.
    pub next_txn_id: u64,
    /// All databases with their content.
    pub dbs: Vec<SnapshotDb>,
}

impl Snapshot {
    /// Encodes the snapshot to bytes (deterministic).
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.flushed_lsn.to_le_bytes());
        buf.extend_from_slice(&self.next_txn_id.to_le_bytes());

        buf.extend_from_slice(&(self.dbs.len() as u16).to_le_bytes());
        for db in &self.dbs {
            buf.extend_from_slice(&db.name.as_u16().to_le_bytes());

            let mut flags = 0u32;
            if db.options.enable_duplicate_keys {
                flags |= DB_FLAG_DUPLICATES;
            }
            buf.extend_from_slice(&flags.to_le_bytes());

            buf.extend_from_slice(&(db.entries.len() as u64).to_le_bytes());
            for (key, dups) in &db.entries {
                buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(dups.len() as u32).to_le_bytes());
                for record in dups {
                    buf.extend_from_slice(&(record.len() as u32).to_le_bytes());
                    buf.extend_from_slice(record);
                }
            }
        }

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes a snapshot from bytes.
    pub(crate) fn decode(data: &[u8]) -> EngineResult<Self> {
        if data.len() < 4 {
            return Err(EngineError::invalid_format("snapshot too short"));
        }

        let (body, crc_bytes) = data.split_at(data.len() - 4);
        let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed_crc = compute_crc32(body);
        if stored_crc != computed_crc {
            return Err(EngineError::ChecksumMismatch {
                expected: stored_crc,
                actual: computed_crc,
            });
        }

        let mut cursor = 0usize;

        let read_bytes = |cursor: &mut usize, len: usize| -> EngineResult<Vec<u8>> {
            if *cursor + len > body.len() {
                return Err(EngineError::invalid_format("unexpected end of snapshot"));
            }
            let bytes = body[*cursor..*cursor + len].to_vec();
            *cursor += len;
            Ok(bytes)
        };
        let read_u16 = |cursor: &mut usize| -> EngineResult<u16> {
            let b = read_bytes(cursor, 2)?;
            Ok(u16::from_le_bytes([b[0], b[1]]))
        };
        let read_u32 = |cursor: &mut usize| -> EngineResult<u32> {
            let b = read_bytes(cursor, 4)?;
            Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        };
        let read_u64 = |cursor: &mut usize| -> EngineResult<u64> {
            let b = read_bytes(cursor, 8)?;
            Ok(u64::from_le_bytes([
                b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
            ]))
        };

        let magic = read_bytes(&mut cursor, 4)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(EngineError::invalid_format("invalid snapshot magic"));
        }

        let version = read_u16(&mut cursor)?;
        if version > SNAPSHOT_VERSION {
            return Err(EngineError::invalid_format(format!(
                "unsupported snapshot version {version}"
            )));
        }

        let flushed_lsn = read_u64(&mut cursor)?;
        let next_txn_id = read_u64(&mut cursor)?;

        let db_count = read_u16(&mut cursor)?;
        let mut dbs = Vec::with_capacity(db_count as usize);
        for _ in 0..db_count {
            let name = DbName::new(read_u16(&mut cursor)?);
            let flags = read_u32(&mut cursor)?;
            let options =
                DbOptions::new().enable_duplicate_keys(flags & DB_FLAG_DUPLICATES != 0);

            let entry_count = read_u64(&mut cursor)?;
            let mut entries = Vec::with_capacity(entry_count as usize);
            for _ in 0..entry_count {
                let key_len = read_u32(&mut cursor)? as usize;
                let key = read_bytes(&mut cursor, key_len)?;

                let dup_count = read_u32(&mut cursor)? as usize;
                let mut dups = Vec::with_capacity(dup_count);
                for _ in 0..dup_count {
                    let record_len = read_u32(&mut cursor)? as usize;
                    dups.push(read_bytes(&mut cursor, record_len)?);
                }
                entries.push((key, dups));
            }
            dbs.push(SnapshotDb {
                name,
                options,
                entries,
            });
        }

        if cursor != body.len() {
            return Err(EngineError::invalid_format("trailing bytes in snapshot"));
        }

        Ok(Self {
            flushed_lsn,
            next_txn_id,
            dbs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Snapshot {
        Snapshot {
            flushed_lsn: 42,
            next_txn_id: 7,
            dbs: vec![
                SnapshotDb {
                    name: DbName::new(1),
                    options: DbOptions::new(),
                    entries: vec![
                        (b"hello".to_vec(), vec![b"world".to_vec()]),
                        (b"empty".to_vec(), vec![Vec::new()]),
                    ],
                },
                SnapshotDb {
                    name: DbName::new(13),
                    options: DbOptions::new().enable_duplicate_keys(true),
                    entries: vec![(
                        b"key".to_vec(),
                        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()],
                    )],
                },
            ],
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let snapshot = sample();
        let decoded = Snapshot::decode(&snapshot.encode()).unwrap();

        assert_eq!(decoded.flushed_lsn, 42);
        assert_eq!(decoded.next_txn_id, 7);
        assert_eq!(decoded.dbs.len(), 2);
        assert_eq!(decoded.dbs[0].name, DbName::new(1));
        assert!(!decoded.dbs[0].options.enable_duplicate_keys);
        assert_eq!(decoded.dbs[0].entries.len(), 2);
        assert_eq!(decoded.dbs[1].name, DbName::new(13));
        assert!(decoded.dbs[1].options.enable_duplicate_keys);
        assert_eq!(decoded.dbs[1].entries[0].1.len(), 3);
    }

    #[test]
    fn empty_snapshot_roundtrip() {
        let snapshot = Snapshot::default();
        let decoded = Snapshot::decode(&snapshot.encode()).unwrap();
        assert_eq!(decoded.flushed_lsn, 0);
        assert!(decoded.dbs.is_empty());
    }

    #[test]
    fn corrupted_snapshot_is_rejected() {
        let mut data = sample().encode();
        let middle = data.len() / 2;
        data[middle] ^= 0xFF;

        assert!(matches!(
            Snapshot::decode(&data),
            Err(EngineError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = sample().encode();
        data[0] = b'X';
        // fix up the CRC so the magic check is what fails
        let body_len = data.len() - 4;
        let crc = compute_crc32(&data[..body_len]);
        let crc_bytes = crc.to_le_bytes();
        data[body_len..].copy_from_slice(&crc_bytes);

        assert!(matches!(
            Snapshot::decode(&data),
            Err(EngineError::InvalidFormat { .. })
        ));
    }
}
