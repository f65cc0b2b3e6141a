//! # Cedar Core
//!
//! The cedardb engine: an embedded, ordered key/value storage engine with
//! conflict-detected transactions.
//!
//! An [`Environment`] hosts up to 2^16 named databases, a shared
//! write-ahead log and the transaction machinery. Multiple transactions
//! read and modify the databases concurrently; conflicts on a key are
//! reported immediately as [`EngineError::TxnConflict`], committed
//! transactions become durable with the commit and are applied to the base
//! trees in begin order.
//!
//! ## Example
//!
//! ```rust
//! use cedar_core::{DbName, DbOptions, EnvConfig, Environment, InsertMode, TxnFlags};
//!
//! let env = Environment::open_in_memory(
//!     EnvConfig::new().enable_transactions(true),
//! ).unwrap();
//! let db = env.create_db(DbName::new(1), DbOptions::new()).unwrap();
//!
//! let txn = env.begin(TxnFlags::new()).unwrap();
//! db.insert(Some(&txn), b"hello", b"world", InsertMode::Plain).unwrap();
//! txn.commit().unwrap();
//!
//! assert_eq!(db.find(None, b"hello").unwrap(), b"world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod db;
mod dir;
mod env;
mod error;
mod snapshot;
mod tree;
mod txn;
mod types;
pub mod wal;

pub use config::{CloseOptions, CursorMove, DbOptions, EnvConfig, InsertMode, TxnFlags};
pub use cursor::Cursor;
pub use db::Database;
pub use env::{Environment, Txn};
pub use error::{EngineError, EngineResult};
pub use tree::{BaseTree, OrderedTree, TreeInsert};
pub use txn::{OpKind, TxnState};
pub use types::{DbName, Lsn, TxnId};
