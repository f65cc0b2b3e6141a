//! Transaction operations: the per-key log entries.

use crate::txn::arena::Handle;
use crate::txn::node::NodeId;
use crate::types::{Lsn, TxnId};

/// Handle of a [`TxnOperation`] in the environment's operation arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpId(pub(crate) u32);

impl Handle for OpId {
    fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    fn raw(self) -> u32 {
        self.0
    }
}

/// Kind of a transaction operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Insert a key that was absent in the visible state.
    Insert,
    /// Replace a key's record(s); also used when the key was absent.
    InsertOverwrite,
    /// Append a record to the key's duplicate list.
    InsertDuplicate,
    /// Erase the key with all its duplicates.
    Erase,
    /// Erase a single duplicate at the operation's duplicate index.
    EraseDuplicate,
    /// No effect; placeholder kept for log continuity.
    Nop,
}

impl OpKind {
    /// Converts the kind to its wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Insert => 1,
            Self::InsertOverwrite => 2,
            Self::InsertDuplicate => 3,
            Self::Erase => 4,
            Self::EraseDuplicate => 5,
            Self::Nop => 6,
        }
    }

    /// Converts a wire byte to a kind.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Insert),
            2 => Some(Self::InsertOverwrite),
            3 => Some(Self::InsertDuplicate),
            4 => Some(Self::Erase),
            5 => Some(Self::EraseDuplicate),
            6 => Some(Self::Nop),
            _ => None,
        }
    }
}

/// A single logical mutation inside a transaction.
///
/// Operations of one key form a list in LSN order inside their [`TxnNode`];
/// operations of one transaction form a list in append (= commit) order.
/// Both links are established before the operation is observable, and no
/// operation is mutated after its terminal bit is set, except to set the
/// flushed bit.
///
/// [`TxnNode`]: crate::txn::node::TxnNode
#[derive(Debug)]
pub(crate) struct TxnOperation {
    /// Environment-wide sequence number, assigned at creation.
    pub lsn: Lsn,
    /// What the operation does.
    pub kind: OpKind,
    /// The transaction that produced this operation.
    pub txn_id: TxnId,
    /// Record bytes; empty for erase and nop operations.
    pub record: Vec<u8>,
    /// Position within the key's duplicate list, where the kind targets one.
    pub duplicate_index: Option<u32>,
    /// The node this operation belongs to.
    pub node: NodeId,
    /// Previous operation of the owning transaction.
    pub prev_in_txn: Option<OpId>,
    /// Next operation of the owning transaction.
    pub next_in_txn: Option<OpId>,
    /// Previous (older) operation on the same key.
    pub prev_in_node: Option<OpId>,
    /// Next (newer) operation on the same key.
    pub next_in_node: Option<OpId>,

    committed: bool,
    aborted: bool,
    flushed: bool,
}

impl TxnOperation {
    pub(crate) fn new(
        lsn: Lsn,
        kind: OpKind,
        txn_id: TxnId,
        record: Vec<u8>,
        duplicate_index: Option<u32>,
        node: NodeId,
    ) -> Self {
        Self {
            lsn,
            kind,
            txn_id,
            record,
            duplicate_index,
            node,
            prev_in_txn: None,
            next_in_txn: None,
            prev_in_node: None,
            next_in_node: None,
            committed: false,
            aborted: false,
            flushed: false,
        }
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.committed
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub(crate) fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// True while neither terminal bit is set.
    pub(crate) fn is_active(&self) -> bool {
        !self.committed && !self.aborted
    }

    pub(crate) fn set_committed(&mut self) {
        debug_assert!(!self.aborted, "op {} already aborted", self.lsn);
        self.committed = true;
    }

    pub(crate) fn set_aborted(&mut self) {
        debug_assert!(!self.committed, "op {} already committed", self.lsn);
        self.aborted = true;
    }

    pub(crate) fn set_flushed(&mut self) {
        debug_assert!(self.committed, "op {} flushed before commit", self.lsn);
        self.flushed = true;
    }
}
