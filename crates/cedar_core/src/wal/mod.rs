//! Write-Ahead Log for durability and crash recovery.
//!
//! All transactional mutations are appended to the WAL before the
//! transaction is acknowledged as committed. Records are written in LSN
//! order; a transaction's commit record follows all of its op records. On
//! open, the WAL is replayed and only transactions whose commit record is
//! present are applied to the base trees.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! The payload starts with `lsn (u64) | txn_id (u64) | db_name (u16)`; op
//! records continue with `op_kind (u8) | key_len (u32) | key |
//! record_len (u32) | record | flags (u32)`.
//!
//! ## Invariants
//!
//! - the WAL is append-only; records are never modified after write
//! - the WAL is synced before a commit is acknowledged
//! - recovery replays only committed transactions, in LSN order
//! - the file is truncated only at checkpoints that cover its whole content

mod iterator;
mod record;
mod writer;

pub use iterator::{RecoveryScan, WalRecordIterator};
pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::WalManager;
