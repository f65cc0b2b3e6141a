//! # Cedar Storage
//!
//! Append-only byte stores for cedardb.
//!
//! The engine asks very little of its storage: ordered appends, positioned
//! reads of what was appended, an fsync barrier for commit
//! acknowledgements, and truncation after checkpoints. This crate pins that
//! contract down as [`StorageBackend`] and ships the two stores the engine
//! uses. Record framing, checksums and replay live in the engine; a store
//! never interprets its bytes.
//!
//! ## Available Stores
//!
//! - [`FileBackend`] - the write-ahead log of persistent environments
//! - [`InMemoryBackend`] - in-memory environments and tests
//!
//! ## Example
//!
//! ```rust
//! use cedar_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut store = InMemoryBackend::new();
//! let offset = store.append(b"framed record").unwrap();
//!
//! let mut buf = [0u8; 13];
//! store.read_exact_at(offset, &mut buf).unwrap();
//! assert_eq!(&buf, b"framed record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
