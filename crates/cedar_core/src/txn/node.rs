//! Per-key transaction nodes.

use crate::db::DbState;
use crate::txn::arena::Handle;
use crate::txn::op::OpId;
use std::sync::Arc;

/// Handle of a [`TxnNode`] in the environment's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeId(pub(crate) u32);

impl Handle for NodeId {
    fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

/// The per-key meeting point of all transactions.
///
/// A node holds the operations performed on one key, ordered oldest to
/// newest, and is only reachable through its database's transaction index.
/// It stays alive while it has unflushed operations or a cursor is coupled
/// to it; once the list empties and the pin count drops to zero it is
/// unlinked and its slot reclaimed.
#[derive(Debug)]
pub(crate) struct TxnNode {
    /// Owned key bytes.
    pub key: Vec<u8>,
    /// The database this key belongs to.
    pub db: Arc<DbState>,
    /// Oldest operation on this key.
    pub head: Option<OpId>,
    /// Newest operation on this key.
    pub tail: Option<OpId>,
    /// Number of cursors coupled to this key.
    pub pins: u32,
}

impl TxnNode {
    pub(crate) fn new(db: Arc<DbState>, key: Vec<u8>) -> Self {
        Self {
            db,
            key,
            head: None,
            tail: None,
            pins: 0,
        }
    }

    /// True when the operation list is empty.
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// True when the node can be unlinked and reclaimed.
    pub(crate) fn is_reclaimable(&self) -> bool {
        self.is_empty() && self.pins == 0
    }
}
