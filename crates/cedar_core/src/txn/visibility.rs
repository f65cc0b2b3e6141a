//! Visibility and conflict rules.
//!
//! Every read and write consults these rules. The op list of a key is walked
//! newest to oldest to find the first operation that decides the outcome:
//!
//! - an operation of the reader's own transaction is always visible;
//! - a committed operation is visible, regardless of who wrote it;
//! - an operation of another active transaction blocks with a conflict;
//! - aborted operations are skipped.
//!
//! The effective duplicate list of a key is then the base tree's list with
//! every visible operation folded over it in LSN order.

use crate::error::EngineResult;
use crate::txn::arena::Arena;
use crate::txn::node::TxnNode;
use crate::txn::op::{OpId, OpKind, TxnOperation};
use crate::types::TxnId;
use crate::EngineError;

/// Walks the op list newest to oldest and fails with `TxnConflict` if the
/// deciding operation belongs to a foreign active transaction.
pub(crate) fn check_conflict(
    ops: &Arena<OpId, TxnOperation>,
    node: Option<&TxnNode>,
    reader: Option<TxnId>,
) -> EngineResult<()> {
    let Some(node) = node else {
        return Ok(());
    };

    let mut cursor = node.tail;
    while let Some(id) = cursor {
        let op = ops.get(id);
        if op.kind == OpKind::Nop || op.is_aborted() {
            cursor = op.prev_in_node;
            continue;
        }
        if reader == Some(op.txn_id) || op.is_committed() {
            return Ok(());
        }
        return Err(EngineError::conflict(op.txn_id));
    }
    Ok(())
}

/// Folds the visible operations of a node over the base tree's duplicate
/// list, oldest to newest, and returns the effective list.
///
/// Operations of foreign active transactions are skipped; callers that must
/// observe linearizable truth run [`check_conflict`] first. An empty result
/// means the key is logically absent.
pub(crate) fn merge_visible(
    ops: &Arena<OpId, TxnOperation>,
    node: Option<&TxnNode>,
    base: Vec<Vec<u8>>,
    reader: Option<TxnId>,
) -> Vec<Vec<u8>> {
    let mut list = base;

    let Some(node) = node else {
        return list;
    };

    let mut cursor = node.head;
    while let Some(id) = cursor {
        let op = ops.get(id);
        let own = reader == Some(op.txn_id);
        if op.is_aborted() || (op.is_active() && !own) {
            cursor = op.next_in_node;
            continue;
        }

        match op.kind {
            OpKind::Insert => {
                list.clear();
                list.push(op.record.clone());
            }
            OpKind::InsertOverwrite => match op.duplicate_index {
                Some(pos) if (pos as usize) < list.len() => {
                    list[pos as usize] = op.record.clone();
                }
                Some(_) => list.push(op.record.clone()),
                None => {
                    list.clear();
                    list.push(op.record.clone());
                }
            },
            OpKind::InsertDuplicate => list.push(op.record.clone()),
            OpKind::Erase => list.clear(),
            OpKind::EraseDuplicate => {
                if let Some(pos) = op.duplicate_index {
                    if (pos as usize) < list.len() {
                        list.remove(pos as usize);
                    }
                }
            }
            OpKind::Nop => {}
        }

        cursor = op.next_in_node;
    }

    list
}
