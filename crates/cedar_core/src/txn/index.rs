//! Per-database transaction index: ordered map from key to node handle.

use crate::txn::node::NodeId;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Match mode for [`TxnIndex::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LookupMatch {
    /// Exact key match.
    Exact,
    /// Greatest key strictly below the probe.
    LessThan,
    /// Smallest key strictly above the probe.
    GreaterThan,
    /// Exact match, or the greatest key below the probe.
    LessEqual,
    /// Exact match, or the smallest key above the probe.
    GreaterEqual,
}

/// Ordered map from key bytes to [`TxnNode`] handles, one per database.
///
/// Keys compare lexicographically. At most one node exists per key value at
/// any instant; the index never frees nodes, it only links and unlinks them.
///
/// [`TxnNode`]: crate::txn::node::TxnNode
#[derive(Debug, Default)]
pub(crate) struct TxnIndex {
    map: BTreeMap<Vec<u8>, NodeId>,
}

impl TxnIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Looks up a node by key, or a neighbouring node per the match mode.
    pub(crate) fn get(&self, key: &[u8], flags: LookupMatch) -> Option<NodeId> {
        match flags {
            LookupMatch::Exact => self.map.get(key).copied(),
            LookupMatch::LessThan => self
                .map
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
                .next_back()
                .map(|(_, id)| *id),
            LookupMatch::GreaterThan => self
                .map
                .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
                .next()
                .map(|(_, id)| *id),
            LookupMatch::LessEqual => self
                .map
                .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
                .next_back()
                .map(|(_, id)| *id),
            LookupMatch::GreaterEqual => self
                .map
                .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
                .next()
                .map(|(_, id)| *id),
        }
    }

    /// Inserts a freshly created node. The caller must have checked that the
    /// key is absent.
    pub(crate) fn store(&mut self, key: Vec<u8>, node: NodeId) {
        let previous = self.map.insert(key, node);
        debug_assert!(previous.is_none(), "duplicate txn node for key");
    }

    /// Unlinks a node. The caller frees the slot.
    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<NodeId> {
        self.map.remove(key)
    }

    /// Smallest key in the index.
    pub(crate) fn first(&self) -> Option<NodeId> {
        self.map.values().next().copied()
    }

    /// Greatest key in the index.
    pub(crate) fn last(&self) -> Option<NodeId> {
        self.map.values().next_back().copied()
    }

    /// In-order iteration over keys and node handles.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, NodeId)> {
        self.map.iter().map(|(k, id)| (k, *id))
    }
}
