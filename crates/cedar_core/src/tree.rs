//! The base tree: the authoritative index for flushed state.
//!
//! The transaction layer treats the tree behind a narrow contract: point
//! lookups, inserts with overwrite/duplicate semantics, erases, counting,
//! ordered key navigation for cursors, and a scan visitor. A paged on-disk
//! B-tree would implement the same trait; the engine ships an ordered
//! in-memory tree whose content is persisted through the WAL and the
//! checkpoint snapshot.

use crate::config::DbOptions;
use crate::error::{EngineError, EngineResult};
use crate::txn::OpKind;
use std::collections::BTreeMap;
use std::ops::Bound;

/// How a tree-level insert treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeInsert {
    /// Fail with `DuplicateKey` if the key exists.
    Plain,
    /// Replace the key's records. With a position, replace only that
    /// duplicate; without, replace the whole list.
    Overwrite(Option<u32>),
    /// Append to the key's duplicate list.
    Duplicate,
}

/// Narrow contract over the on-disk index.
///
/// Keys are ordered lexicographically. Every committed transaction
/// operation translates into exactly one call on this trait during flush.
pub trait BaseTree: Send + Sync {
    /// Returns the first record of a key, if present.
    fn find(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Returns the full duplicate list of a key, if present.
    fn duplicates(&self, key: &[u8]) -> Option<Vec<Vec<u8>>>;

    /// Inserts a record for a key.
    fn insert(&mut self, key: &[u8], record: &[u8], mode: TreeInsert) -> EngineResult<()>;

    /// Erases a key, or a single duplicate at the given position.
    fn erase(&mut self, key: &[u8], duplicate_index: Option<u32>) -> EngineResult<()>;

    /// Counts keys, or records when duplicates are not skipped.
    fn count(&self, skip_duplicates: bool) -> u64;

    /// Smallest key.
    fn first_key(&self) -> Option<Vec<u8>>;

    /// Greatest key.
    fn last_key(&self) -> Option<Vec<u8>>;

    /// Smallest key strictly greater than the probe.
    fn next_key(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Greatest key strictly smaller than the probe.
    fn prev_key(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Visits every key with its duplicate list, in key order.
    fn scan(&self, visitor: &mut dyn FnMut(&[u8], &[Vec<u8>]));

    /// Removes every key.
    fn clear(&mut self);
}

/// Ordered in-memory tree with per-key duplicate lists.
#[derive(Debug, Default)]
pub struct OrderedTree {
    entries: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl OrderedTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BaseTree for OrderedTree {
    fn find(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).and_then(|dups| dups.first().cloned())
    }

    fn duplicates(&self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: &[u8], record: &[u8], mode: TreeInsert) -> EngineResult<()> {
        match mode {
            TreeInsert::Plain => {
                if self.entries.contains_key(key) {
                    return Err(EngineError::DuplicateKey);
                }
                self.entries.insert(key.to_vec(), vec![record.to_vec()]);
            }
            TreeInsert::Overwrite(None) => {
                self.entries.insert(key.to_vec(), vec![record.to_vec()]);
            }
            TreeInsert::Overwrite(Some(pos)) => {
                let dups = self.entries.entry(key.to_vec()).or_default();
                match dups.get_mut(pos as usize) {
                    Some(slot) => *slot = record.to_vec(),
                    None => dups.push(record.to_vec()),
                }
            }
            TreeInsert::Duplicate => {
                self.entries
                    .entry(key.to_vec())
                    .or_default()
                    .push(record.to_vec());
            }
        }
        Ok(())
    }

    fn erase(&mut self, key: &[u8], duplicate_index: Option<u32>) -> EngineResult<()> {
        match duplicate_index {
            None => {
                self.entries.remove(key).ok_or(EngineError::KeyNotFound)?;
            }
            Some(pos) => {
                let dups = self.entries.get_mut(key).ok_or(EngineError::KeyNotFound)?;
                if (pos as usize) >= dups.len() {
                    return Err(EngineError::KeyNotFound);
                }
                dups.remove(pos as usize);
                if dups.is_empty() {
                    self.entries.remove(key);
                }
            }
        }
        Ok(())
    }

    fn count(&self, skip_duplicates: bool) -> u64 {
        if skip_duplicates {
            self.entries.len() as u64
        } else {
            self.entries.values().map(|dups| dups.len() as u64).sum()
        }
    }

    fn first_key(&self) -> Option<Vec<u8>> {
        self.entries.keys().next().cloned()
    }

    fn last_key(&self) -> Option<Vec<u8>> {
        self.entries.keys().next_back().cloned()
    }

    fn next_key(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone())
    }

    fn prev_key(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(k, _)| k.clone())
    }

    fn scan(&self, visitor: &mut dyn FnMut(&[u8], &[Vec<u8>])) {
        for (key, dups) in &self.entries {
            visitor(key, dups);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Applies one transaction operation to a tree.
///
/// This is the single translation point shared by the commit-time flush and
/// WAL replay: each op kind maps to exactly one tree call.
pub(crate) fn apply_op(
    tree: &mut dyn BaseTree,
    kind: OpKind,
    key: &[u8],
    record: &[u8],
    duplicate_index: Option<u32>,
) -> EngineResult<()> {
    match kind {
        OpKind::Insert => tree.insert(key, record, TreeInsert::Overwrite(None)),
        OpKind::InsertOverwrite => tree.insert(key, record, TreeInsert::Overwrite(duplicate_index)),
        OpKind::InsertDuplicate => tree.insert(key, record, TreeInsert::Duplicate),
        OpKind::Erase => tree.erase(key, None),
        OpKind::EraseDuplicate => tree.erase(key, duplicate_index),
        OpKind::Nop => Ok(()),
    }
}

/// Builds the default base tree for a database.
pub(crate) fn default_tree(_options: &DbOptions) -> Box<dyn BaseTree> {
    Box::new(OrderedTree::new())
}
