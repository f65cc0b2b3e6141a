//! Local transaction state.

use crate::error::{EngineError, EngineResult};
use crate::txn::op::OpId;
use crate::types::TxnId;
use std::io;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// Sticky failure recorded on a transaction.
///
/// I/O and allocation failures poison the transaction: every further
/// operation reports the same error until the transaction is aborted.
#[derive(Debug, Clone)]
pub(crate) enum Poison {
    Io(String),
    OutOfMemory,
}

impl Poison {
    pub(crate) fn to_error(&self) -> EngineError {
        match self {
            Self::Io(message) => {
                EngineError::Io(io::Error::new(io::ErrorKind::Other, message.clone()))
            }
            Self::OutOfMemory => EngineError::OutOfMemory,
        }
    }
}

/// A transaction local to this environment.
///
/// Transactions live in the environment's global list in begin order; the
/// transaction at the head of the list is the oldest and the only one whose
/// committed operations may be applied to the base trees.
#[derive(Debug)]
pub(crate) struct LocalTxn {
    /// Transaction ID; also the commit-application order.
    pub id: TxnId,
    /// The transaction will not perform writes.
    pub read_only: bool,
    /// Created internally to serve a call that carried no transaction.
    pub temporary: bool,
    /// Oldest owned operation.
    pub op_head: Option<OpId>,
    /// Newest owned operation.
    pub op_tail: Option<OpId>,
    /// Number of cursors bound to this transaction.
    pub cursor_refs: u32,

    state: TxnState,
    poison: Option<Poison>,
}

impl LocalTxn {
    pub(crate) fn new(id: TxnId, read_only: bool, temporary: bool) -> Self {
        Self {
            id,
            read_only,
            temporary,
            op_head: None,
            op_tail: None,
            cursor_refs: 0,
            state: TxnState::Active,
            poison: None,
        }
    }

    pub(crate) fn state(&self) -> TxnState {
        self.state
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    /// Fails unless the transaction is still active.
    pub(crate) fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(EngineError::invalid_operation(
                "transaction already committed",
            )),
            TxnState::Aborted => {
                Err(EngineError::invalid_operation("transaction already aborted"))
            }
        }
    }

    /// Fails unless the transaction may perform writes.
    pub(crate) fn ensure_writable(&self) -> EngineResult<()> {
        if self.read_only {
            return Err(EngineError::invalid_operation("transaction is read-only"));
        }
        Ok(())
    }

    /// Reports the sticky error, if the transaction is poisoned.
    pub(crate) fn check_poison(&self) -> EngineResult<()> {
        match &self.poison {
            Some(poison) => Err(poison.to_error()),
            None => Ok(()),
        }
    }

    pub(crate) fn poison(&mut self, poison: Poison) {
        if self.poison.is_none() {
            self.poison = Some(poison);
        }
    }

    pub(crate) fn mark_committed(&mut self) {
        debug_assert_eq!(self.state, TxnState::Active);
        self.state = TxnState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        debug_assert_eq!(self.state, TxnState::Active);
        self.state = TxnState::Aborted;
    }
}
