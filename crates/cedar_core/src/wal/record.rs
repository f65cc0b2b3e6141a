//! WAL record types and serialization.

use crate::error::{EngineError, EngineResult};
use crate::txn::OpKind;
use crate::types::{DbName, Lsn, TxnId};
use std::sync::OnceLock;

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"CWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Wire value for "no duplicate index" in the op flags field.
const NO_DUPLICATE_INDEX: u32 = u32::MAX;

/// Type of WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Begin a new transaction.
    Begin = 1,
    /// A transaction operation on one key.
    Op = 2,
    /// Commit a transaction.
    Commit = 3,
    /// Abort a transaction.
    Abort = 4,
    /// Checkpoint marker.
    Checkpoint = 5,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Op),
            3 => Some(Self::Commit),
            4 => Some(Self::Abort),
            5 => Some(Self::Checkpoint),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A WAL record.
///
/// Records are appended in LSN order; a transaction's commit record follows
/// all of its op records. Every record carries the LSN that was current when
/// it was written, the owning transaction (0 for checkpoints) and the
/// database name (0 for records that are not tied to one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Begin a new transaction.
    Begin {
        /// Sequence number of the begin itself.
        lsn: Lsn,
        /// Transaction ID.
        txn_id: TxnId,
    },

    /// A transaction operation on one key.
    Op {
        /// Sequence number of the operation.
        lsn: Lsn,
        /// Transaction that produced the operation.
        txn_id: TxnId,
        /// Database the key belongs to.
        db_name: DbName,
        /// What the operation does.
        kind: OpKind,
        /// Key bytes.
        key: Vec<u8>,
        /// Record bytes; empty for erase and nop operations.
        record: Vec<u8>,
        /// Targeted position in the duplicate list, if any.
        duplicate_index: Option<u32>,
    },

    /// Commit a transaction.
    Commit {
        /// Sequence number of the commit.
        lsn: Lsn,
        /// Transaction ID.
        txn_id: TxnId,
    },

    /// Abort a transaction.
    Abort {
        /// Sequence number of the abort.
        lsn: Lsn,
        /// Transaction ID.
        txn_id: TxnId,
    },

    /// Checkpoint marker: everything up to `lsn` is in the snapshot.
    Checkpoint {
        /// Highest LSN fully flushed into the base trees.
        lsn: Lsn,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Op { .. } => WalRecordType::Op,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Abort { .. } => WalRecordType::Abort,
            Self::Checkpoint { .. } => WalRecordType::Checkpoint,
        }
    }

    /// Returns the record's LSN.
    #[must_use]
    pub fn lsn(&self) -> Lsn {
        match self {
            Self::Begin { lsn, .. }
            | Self::Op { lsn, .. }
            | Self::Commit { lsn, .. }
            | Self::Abort { lsn, .. }
            | Self::Checkpoint { lsn } => *lsn,
        }
    }

    /// Returns the transaction ID if this record is associated with one.
    #[must_use]
    pub fn txn_id(&self) -> Option<TxnId> {
        match self {
            Self::Begin { txn_id, .. }
            | Self::Op { txn_id, .. }
            | Self::Commit { txn_id, .. }
            | Self::Abort { txn_id, .. } => Some(*txn_id),
            Self::Checkpoint { .. } => None,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// Payload layout: `lsn (u64) | txn_id (u64) | db_name (u16)`, and for op
    /// records `op_kind (u8) | key_len (u32) | key | record_len (u32) |
    /// record | flags (u32)`.
    pub fn encode_payload(&self) -> EngineResult<Vec<u8>> {
        let mut buf = Vec::new();

        let (lsn, txn_id, db_name) = match self {
            Self::Begin { lsn, txn_id }
            | Self::Commit { lsn, txn_id }
            | Self::Abort { lsn, txn_id } => (*lsn, *txn_id, DbName::new(0)),
            Self::Op {
                lsn,
                txn_id,
                db_name,
                ..
            } => (*lsn, *txn_id, *db_name),
            Self::Checkpoint { lsn } => (*lsn, TxnId::new(0), DbName::new(0)),
        };

        buf.extend_from_slice(&lsn.as_u64().to_le_bytes());
        buf.extend_from_slice(&txn_id.as_u64().to_le_bytes());
        buf.extend_from_slice(&db_name.as_u16().to_le_bytes());

        if let Self::Op {
            kind,
            key,
            record,
            duplicate_index,
            ..
        } = self
        {
            let key_len = u32::try_from(key.len())
                .map_err(|_| EngineError::limits_reached("key too large for WAL record"))?;
            let record_len = u32::try_from(record.len())
                .map_err(|_| EngineError::limits_reached("record too large for WAL record"))?;

            buf.push(kind.as_byte());
            buf.extend_from_slice(&key_len.to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&record_len.to_le_bytes());
            buf.extend_from_slice(record);
            let flags = duplicate_index.unwrap_or(NO_DUPLICATE_INDEX);
            buf.extend_from_slice(&flags.to_le_bytes());
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> EngineResult<Self> {
        let mut cursor = 0;

        let read_u64 = |cursor: &mut usize| -> EngineResult<u64> {
            if *cursor + 8 > payload.len() {
                return Err(EngineError::wal_corruption("unexpected end of payload"));
            }
            let bytes: [u8; 8] = payload[*cursor..*cursor + 8]
                .try_into()
                .map_err(|_| EngineError::wal_corruption("invalid u64"))?;
            *cursor += 8;
            Ok(u64::from_le_bytes(bytes))
        };

        let read_u32 = |cursor: &mut usize| -> EngineResult<u32> {
            if *cursor + 4 > payload.len() {
                return Err(EngineError::wal_corruption("unexpected end of payload"));
            }
            let bytes: [u8; 4] = payload[*cursor..*cursor + 4]
                .try_into()
                .map_err(|_| EngineError::wal_corruption("invalid u32"))?;
            *cursor += 4;
            Ok(u32::from_le_bytes(bytes))
        };

        let read_u16 = |cursor: &mut usize| -> EngineResult<u16> {
            if *cursor + 2 > payload.len() {
                return Err(EngineError::wal_corruption("unexpected end of payload"));
            }
            let bytes: [u8; 2] = payload[*cursor..*cursor + 2]
                .try_into()
                .map_err(|_| EngineError::wal_corruption("invalid u16"))?;
            *cursor += 2;
            Ok(u16::from_le_bytes(bytes))
        };

        let read_bytes = |cursor: &mut usize, len: usize| -> EngineResult<Vec<u8>> {
            if *cursor + len > payload.len() {
                return Err(EngineError::wal_corruption("unexpected end of payload"));
            }
            let bytes = payload[*cursor..*cursor + len].to_vec();
            *cursor += len;
            Ok(bytes)
        };

        let lsn = Lsn::new(read_u64(&mut cursor)?);
        let txn_id = TxnId::new(read_u64(&mut cursor)?);
        let db_name = DbName::new(read_u16(&mut cursor)?);

        let record = match record_type {
            WalRecordType::Begin => Self::Begin { lsn, txn_id },
            WalRecordType::Commit => Self::Commit { lsn, txn_id },
            WalRecordType::Abort => Self::Abort { lsn, txn_id },
            WalRecordType::Checkpoint => Self::Checkpoint { lsn },
            WalRecordType::Op => {
                if cursor >= payload.len() {
                    return Err(EngineError::wal_corruption("unexpected end of op record"));
                }
                let kind_byte = payload[cursor];
                cursor += 1;
                let kind = OpKind::from_byte(kind_byte).ok_or_else(|| {
                    EngineError::wal_corruption(format!("unknown op kind {kind_byte}"))
                })?;

                let key_len = read_u32(&mut cursor)? as usize;
                let key = read_bytes(&mut cursor, key_len)?;
                let record_len = read_u32(&mut cursor)? as usize;
                let record = read_bytes(&mut cursor, record_len)?;
                let flags = read_u32(&mut cursor)?;
                let duplicate_index = if flags == NO_DUPLICATE_INDEX {
                    None
                } else {
                    Some(flags)
                };

                Self::Op {
                    lsn,
                    txn_id,
                    db_name,
                    kind,
                    key,
                    record,
                    duplicate_index,
                }
            }
        };

        if cursor != payload.len() {
            return Err(EngineError::wal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                cursor,
                payload.len()
            )));
        }

        Ok(record)
    }
}

/// Reflected IEEE CRC32 polynomial.
const CRC32_POLYNOMIAL: u32 = 0xEDB8_8320;

/// Byte-at-a-time lookup table, built on first use.
fn crc32_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (byte, entry) in table.iter_mut().enumerate() {
            let mut remainder = byte as u32;
            for _ in 0..8 {
                let feedback = if remainder & 1 == 1 {
                    CRC32_POLYNOMIAL
                } else {
                    0
                };
                remainder = (remainder >> 1) ^ feedback;
            }
            *entry = remainder;
        }
        table
    })
}

/// Computes the CRC32 checksum of `data` (reflected IEEE variant).
pub fn compute_crc32(data: &[u8]) -> u32 {
    let table = crc32_table();
    !data.iter().fold(!0u32, |crc, &byte| {
        table[usize::from((crc as u8) ^ byte)] ^ (crc >> 8)
    })
}
