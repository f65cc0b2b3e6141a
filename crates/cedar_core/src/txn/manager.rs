//! Transaction manager: begin/commit/abort dispatch and the flush pipeline.

use crate::config::{EnvConfig, InsertMode, TxnFlags};
use crate::db::DbState;
use crate::error::{EngineError, EngineResult};
use crate::tree::apply_op;
use crate::txn::arena::Arena;
use crate::txn::index::{LookupMatch, TxnIndex};
use crate::txn::local::{LocalTxn, Poison, TxnState};
use crate::txn::node::{NodeId, TxnNode};
use crate::txn::op::{OpId, OpKind, TxnOperation};
use crate::txn::visibility::{check_conflict, merge_visible};
use crate::types::{DbName, Lsn, TxnId};
use crate::wal::{WalManager, WalRecord};
use parking_lot::{Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

fn not_active() -> EngineError {
    EngineError::invalid_operation("transaction not active")
}

/// The shared transaction state of one environment.
///
/// Everything in here is guarded by the environment lock: the arenas, the
/// per-database transaction indexes, the global transaction queue and the
/// LSN and transaction-id counters.
pub(crate) struct TxnStore {
    pub(crate) ops: Arena<OpId, TxnOperation>,
    pub(crate) nodes: Arena<NodeId, TxnNode>,
    pub(crate) txns: HashMap<TxnId, LocalTxn>,
    /// Global transaction list in begin (= id) order. The front is the
    /// oldest transaction and the only flush candidate.
    pub(crate) queue: VecDeque<TxnId>,
    pub(crate) indexes: HashMap<DbName, TxnIndex>,
    pub(crate) next_lsn: u64,
    pub(crate) next_txn_id: u64,
    /// Highest LSN whose effects have been applied to the base trees.
    pub(crate) flushed_lsn: u64,
}

impl TxnStore {
    fn new() -> Self {
        Self {
            ops: Arena::new(),
            nodes: Arena::new(),
            txns: HashMap::new(),
            queue: VecDeque::new(),
            indexes: HashMap::new(),
            next_lsn: 1,
            next_txn_id: 1,
            flushed_lsn: 0,
        }
    }

    fn alloc_lsn(&mut self) -> Lsn {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        Lsn::new(lsn)
    }

    fn node_id(&self, db: DbName, key: &[u8]) -> Option<NodeId> {
        self.indexes
            .get(&db)
            .and_then(|index| index.get(key, LookupMatch::Exact))
    }

    fn active_count(&self) -> usize {
        self.txns.values().filter(|txn| txn.is_active()).count()
    }
}

/// Environment-level transaction machinery.
///
/// Owns the WAL, the LSN counter and the global transaction queue.
/// Committed transactions are applied to the base trees strictly in id
/// order: a committed transaction flushes only when every older transaction
/// has finished and been flushed or dropped.
pub(crate) struct TxnManager {
    wal: WalManager,
    store: Mutex<TxnStore>,
    sync_on_commit: bool,
    max_live_ops: usize,
    max_key_size: usize,
    max_record_size: usize,
}

impl TxnManager {
    pub(crate) fn new(wal: WalManager, config: &EnvConfig) -> Self {
        Self {
            wal,
            store: Mutex::new(TxnStore::new()),
            sync_on_commit: config.sync_on_commit,
            max_live_ops: config.max_live_ops,
            max_key_size: config.max_key_size,
            max_record_size: config.max_record_size,
        }
    }

    pub(crate) fn wal(&self) -> &WalManager {
        &self.wal
    }

    /// Locks and returns the store. Held by the environment across
    /// checkpoint snapshots so the flushed LSN cannot move underneath them.
    pub(crate) fn store(&self) -> MutexGuard<'_, TxnStore> {
        self.store.lock()
    }

    /// Restores the counters after recovery.
    pub(crate) fn restore_counters(&self, next_lsn: u64, next_txn_id: u64, flushed_lsn: u64) {
        let mut st = self.store.lock();
        st.next_lsn = next_lsn.max(1);
        st.next_txn_id = next_txn_id.max(1);
        st.flushed_lsn = flushed_lsn;
    }

    pub(crate) fn active_count(&self) -> usize {
        self.store.lock().active_count()
    }

    pub(crate) fn is_active(&self, id: TxnId) -> bool {
        self.store
            .lock()
            .txns
            .get(&id)
            .is_some_and(LocalTxn::is_active)
    }

    /// Drops all transaction state. Called when the environment closes.
    pub(crate) fn clear(&self) {
        let mut st = self.store.lock();
        st.ops.clear();
        st.nodes.clear();
        st.txns.clear();
        st.queue.clear();
        st.indexes.clear();
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Begins a new transaction and links it at the tail of the global list.
    pub(crate) fn begin(&self, flags: TxnFlags, temporary: bool) -> EngineResult<TxnId> {
        let mut st = self.store.lock();
        let id = TxnId::new(st.next_txn_id);
        let lsn = st.alloc_lsn();
        st.next_txn_id += 1;

        self.wal.append(&WalRecord::Begin { lsn, txn_id: id })?;

        st.txns.insert(id, LocalTxn::new(id, flags.read_only, temporary));
        st.queue.push_back(id);
        trace!(%id, temporary, "transaction begun");
        Ok(id)
    }

    /// Commits a transaction.
    ///
    /// Marks every owned op committed and hands the transaction to the
    /// flush pipeline; the base trees are only touched once the transaction
    /// reaches the head of the global list.
    ///
    /// A WAL failure while writing the commit record leaves the transaction
    /// active so the caller may retry or abort. Committing a poisoned
    /// transaction aborts it and reports the sticky error.
    pub(crate) fn commit(&self, id: TxnId, force_cursors: bool) -> EngineResult<()> {
        let mut guard = self.store.lock();
        let st = &mut *guard;

        let txn = st.txns.get(&id).ok_or_else(not_active)?;
        txn.ensure_active()?;
        if !force_cursors && txn.cursor_refs > 0 {
            return Err(EngineError::CursorStillOpen {
                count: txn.cursor_refs,
            });
        }

        if let Err(sticky) = txn.check_poison() {
            let lsn = st.alloc_lsn();
            let _ = self.wal.append(&WalRecord::Abort { lsn, txn_id: id });
            Self::abort_locked(st, id);
            self.flush_committed(st)?;
            return Err(sticky);
        }

        let lsn = st.alloc_lsn();
        self.wal.append(&WalRecord::Commit { lsn, txn_id: id })?;
        if self.sync_on_commit {
            self.wal.sync()?;
        }

        let txn = st.txns.get_mut(&id).ok_or_else(not_active)?;
        let mut cursor = txn.op_head;
        txn.mark_committed();
        while let Some(op_id) = cursor {
            let op = st.ops.get_mut(op_id);
            op.set_committed();
            cursor = op.next_in_txn;
        }

        trace!(%id, "transaction committed");
        self.flush_committed(st)
    }

    /// Aborts a transaction: every owned op is marked aborted and unlinked,
    /// and nodes emptied by this are reclaimed.
    pub(crate) fn abort(&self, id: TxnId, force_cursors: bool) -> EngineResult<()> {
        let mut guard = self.store.lock();
        let st = &mut *guard;

        let txn = st.txns.get(&id).ok_or_else(not_active)?;
        txn.ensure_active()?;
        if !force_cursors && txn.cursor_refs > 0 {
            return Err(EngineError::CursorStillOpen {
                count: txn.cursor_refs,
            });
        }

        let lsn = st.alloc_lsn();
        let wal_result = self.wal.append(&WalRecord::Abort { lsn, txn_id: id });

        Self::abort_locked(st, id);
        trace!(%id, "transaction aborted");
        self.flush_committed(st)?;

        wal_result.map(|_| ())
    }

    /// Finishes every active transaction, oldest first.
    pub(crate) fn cleanup(&self, auto_commit: bool) -> EngineResult<()> {
        loop {
            let next = {
                let st = self.store.lock();
                st.queue
                    .iter()
                    .copied()
                    .find(|id| st.txns.get(id).is_some_and(LocalTxn::is_active))
            };
            let Some(id) = next else {
                return Ok(());
            };
            if auto_commit {
                if let Err(e) = self.commit(id, true) {
                    // a poisoned commit has already aborted; anything else
                    // falls back to abort so close can make progress
                    if self.is_active(id) {
                        self.abort(id, true)?;
                    }
                    if !matches!(e, EngineError::OutOfMemory | EngineError::Io(_)) {
                        return Err(e);
                    }
                }
            } else {
                self.abort(id, true)?;
            }
        }
    }

    // ------------------------------------------------------------------
    // cursor bookkeeping
    // ------------------------------------------------------------------

    pub(crate) fn attach_cursor(&self, id: TxnId) -> EngineResult<()> {
        let mut st = self.store.lock();
        let txn = st.txns.get_mut(&id).ok_or_else(not_active)?;
        txn.ensure_active()?;
        txn.cursor_refs += 1;
        Ok(())
    }

    pub(crate) fn detach_cursor(&self, id: TxnId) {
        let mut st = self.store.lock();
        if let Some(txn) = st.txns.get_mut(&id) {
            txn.cursor_refs = txn.cursor_refs.saturating_sub(1);
        }
    }

    /// Pins the key's node so it survives flushes while a cursor is
    /// coupled to it.
    pub(crate) fn pin_key(&self, db: DbName, key: &[u8]) {
        let mut st = self.store.lock();
        if let Some(node_id) = st.node_id(db, key) {
            st.nodes.get_mut(node_id).pins += 1;
        }
    }

    pub(crate) fn unpin_key(&self, db: DbName, key: &[u8]) {
        let mut guard = self.store.lock();
        let st = &mut *guard;
        if let Some(node_id) = st.node_id(db, key) {
            let node = st.nodes.get_mut(node_id);
            node.pins = node.pins.saturating_sub(1);
            Self::reclaim_if_empty(st, node_id);
        }
    }

    // ------------------------------------------------------------------
    // database operations
    // ------------------------------------------------------------------

    /// Inserts a key/record pair under the given transaction, or under an
    /// immediately-committed temporary transaction when none is given.
    pub(crate) fn insert(
        &self,
        db: &Arc<DbState>,
        txn: Option<TxnId>,
        key: &[u8],
        record: &[u8],
        mode: InsertMode,
    ) -> EngineResult<()> {
        match txn {
            Some(id) => {
                let mut st = self.store.lock();
                self.insert_locked(&mut st, db, id, key, record, mode)
            }
            None => self.with_temp_txn(|id| {
                let mut st = self.store.lock();
                self.insert_locked(&mut st, db, id, key, record, mode)
            }),
        }
    }

    /// Erases a key (or one duplicate) under the given transaction, or
    /// under a temporary transaction when none is given.
    pub(crate) fn erase(
        &self,
        db: &Arc<DbState>,
        txn: Option<TxnId>,
        key: &[u8],
        duplicate_index: Option<u32>,
    ) -> EngineResult<()> {
        match txn {
            Some(id) => {
                let mut st = self.store.lock();
                self.erase_locked(&mut st, db, id, key, duplicate_index)
            }
            None => self.with_temp_txn(|id| {
                let mut st = self.store.lock();
                self.erase_locked(&mut st, db, id, key, duplicate_index)
            }),
        }
    }

    /// Overwrites the record at one duplicate position.
    pub(crate) fn overwrite_at(
        &self,
        db: &Arc<DbState>,
        txn: Option<TxnId>,
        key: &[u8],
        duplicate_index: u32,
        record: &[u8],
    ) -> EngineResult<()> {
        let run = |id: TxnId| {
            let mut guard = self.store.lock();
            let st = &mut *guard;
            self.ensure_writable(st, id)?;
            self.validate(key, record)?;

            let node_id = st.node_id(db.name, key);
            check_conflict(&st.ops, node_id.map(|n| st.nodes.get(n)), Some(id))?;

            let base = db.tree.read().duplicates(key).unwrap_or_default();
            let merged = merge_visible(&st.ops, node_id.map(|n| st.nodes.get(n)), base, Some(id));
            if duplicate_index as usize >= merged.len() {
                return Err(EngineError::KeyNotFound);
            }

            self.append_op(
                st,
                db,
                id,
                OpKind::InsertOverwrite,
                key,
                record,
                Some(duplicate_index),
            )
        };

        match txn {
            Some(id) => run(id),
            None => self.with_temp_txn(run),
        }
    }

    /// Looks up the first visible record of a key.
    ///
    /// With `txn == None` the reader observes the latest committed state;
    /// either way an operation of a foreign active transaction on the key
    /// reports a conflict.
    pub(crate) fn find(
        &self,
        db: &Arc<DbState>,
        txn: Option<TxnId>,
        key: &[u8],
    ) -> EngineResult<Vec<u8>> {
        let mut merged = self.view(db, txn, key, true)?;
        if merged.is_empty() {
            return Err(EngineError::KeyNotFound);
        }
        Ok(merged.swap_remove(0))
    }

    /// Returns the visible duplicate list of a key; empty means absent.
    pub(crate) fn view(
        &self,
        db: &Arc<DbState>,
        reader: Option<TxnId>,
        key: &[u8],
        strict: bool,
    ) -> EngineResult<Vec<Vec<u8>>> {
        let st = self.store.lock();
        if let Some(id) = reader {
            self.ensure_readable(&st, id)?;
        }

        let node_id = st.node_id(db.name, key);
        if strict {
            check_conflict(&st.ops, node_id.map(|n| st.nodes.get(n)), reader)?;
        }

        let base = db.tree.read().duplicates(key).unwrap_or_default();
        Ok(merge_visible(
            &st.ops,
            node_id.map(|n| st.nodes.get(n)),
            base,
            reader,
        ))
    }

    /// Counts visible keys (or records) of a database.
    ///
    /// Counting is permissive: operations of foreign active transactions are
    /// skipped and the latest visible state beneath them contributes.
    pub(crate) fn count(
        &self,
        db: &Arc<DbState>,
        txn: Option<TxnId>,
        skip_duplicates: bool,
    ) -> EngineResult<u64> {
        let st = self.store.lock();
        if let Some(id) = txn {
            self.ensure_readable(&st, id)?;
        }

        let tree = db.tree.read();
        let empty_index = TxnIndex::new();
        let index = st.indexes.get(&db.name).unwrap_or(&empty_index);

        let mut total = 0u64;
        tree.scan(&mut |key, dups| {
            let node = index
                .get(key, LookupMatch::Exact)
                .map(|node_id| st.nodes.get(node_id));
            let merged = merge_visible(&st.ops, node, dups.to_vec(), txn);
            if !merged.is_empty() {
                total += if skip_duplicates { 1 } else { merged.len() as u64 };
            }
        });

        // keys that only exist in the transaction layer
        for (key, node_id) in index.iter() {
            if tree.duplicates(key).is_some() {
                continue;
            }
            let merged = merge_visible(&st.ops, Some(st.nodes.get(node_id)), Vec::new(), txn);
            if !merged.is_empty() {
                total += if skip_duplicates { 1 } else { merged.len() as u64 };
            }
        }

        Ok(total)
    }

    /// Finds the nearest key with a visible record, merging the base tree
    /// and the transaction index.
    ///
    /// `from == None` starts at the first (or last) key; otherwise the scan
    /// continues strictly beyond `from` in the given direction.
    pub(crate) fn seek(
        &self,
        db: &Arc<DbState>,
        reader: Option<TxnId>,
        from: Option<&[u8]>,
        forward: bool,
    ) -> EngineResult<Option<(Vec<u8>, Vec<Vec<u8>>)>> {
        let st = self.store.lock();
        if let Some(id) = reader {
            self.ensure_readable(&st, id)?;
        }

        let tree = db.tree.read();
        let empty_index = TxnIndex::new();
        let index = st.indexes.get(&db.name).unwrap_or(&empty_index);

        let mut anchor: Option<Vec<u8>> = from.map(<[u8]>::to_vec);
        loop {
            let tree_next = match (&anchor, forward) {
                (None, true) => tree.first_key(),
                (None, false) => tree.last_key(),
                (Some(key), true) => tree.next_key(key),
                (Some(key), false) => tree.prev_key(key),
            };
            let index_next = match (&anchor, forward) {
                (None, true) => index.first(),
                (None, false) => index.last(),
                (Some(key), true) => index.get(key, LookupMatch::GreaterThan),
                (Some(key), false) => index.get(key, LookupMatch::LessThan),
            }
            .map(|node_id| st.nodes.get(node_id).key.clone());

            let candidate = match (tree_next, index_next) {
                (None, None) => return Ok(None),
                (Some(key), None) | (None, Some(key)) => key,
                (Some(a), Some(b)) => {
                    if forward {
                        a.min(b)
                    } else {
                        a.max(b)
                    }
                }
            };

            let node = index
                .get(&candidate, LookupMatch::Exact)
                .map(|node_id| st.nodes.get(node_id));
            check_conflict(&st.ops, node, reader)?;

            let base = tree.duplicates(&candidate).unwrap_or_default();
            let merged = merge_visible(&st.ops, node, base, reader);
            if merged.is_empty() {
                anchor = Some(candidate);
                continue;
            }
            return Ok(Some((candidate, merged)));
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn validate(&self, key: &[u8], record: &[u8]) -> EngineResult<()> {
        if key.len() > self.max_key_size {
            return Err(EngineError::limits_reached(format!(
                "key size {} exceeds maximum {}",
                key.len(),
                self.max_key_size
            )));
        }
        if record.len() > self.max_record_size {
            return Err(EngineError::limits_reached(format!(
                "record size {} exceeds maximum {}",
                record.len(),
                self.max_record_size
            )));
        }
        Ok(())
    }

    fn ensure_readable(&self, st: &TxnStore, id: TxnId) -> EngineResult<()> {
        let txn = st.txns.get(&id).ok_or_else(not_active)?;
        txn.ensure_active()?;
        txn.check_poison()
    }

    fn ensure_writable(&self, st: &TxnStore, id: TxnId) -> EngineResult<()> {
        let txn = st.txns.get(&id).ok_or_else(not_active)?;
        txn.ensure_active()?;
        txn.check_poison()?;
        txn.ensure_writable()
    }

    fn with_temp_txn<F>(&self, run: F) -> EngineResult<()>
    where
        F: FnOnce(TxnId) -> EngineResult<()>,
    {
        let id = self.begin(TxnFlags::new(), true)?;
        let result = run(id).and_then(|()| self.commit(id, false));
        if result.is_err() && self.is_active(id) {
            let _ = self.abort(id, false);
        }
        result
    }

    fn insert_locked(
        &self,
        guard: &mut TxnStore,
        db: &Arc<DbState>,
        id: TxnId,
        key: &[u8],
        record: &[u8],
        mode: InsertMode,
    ) -> EngineResult<()> {
        self.ensure_writable(guard, id)?;
        self.validate(key, record)?;

        if mode == InsertMode::Duplicate && !db.options.enable_duplicate_keys {
            return Err(EngineError::invalid_parameter(
                "duplicate keys are not enabled for this database",
            ));
        }

        let node_id = guard.node_id(db.name, key);
        check_conflict(&guard.ops, node_id.map(|n| guard.nodes.get(n)), Some(id))?;

        let base = db.tree.read().duplicates(key).unwrap_or_default();
        let merged = merge_visible(&guard.ops, node_id.map(|n| guard.nodes.get(n)), base, Some(id));

        let (kind, duplicate_index) = match (!merged.is_empty(), mode) {
            (true, InsertMode::Plain) => return Err(EngineError::DuplicateKey),
            (true, InsertMode::Overwrite) => (OpKind::InsertOverwrite, None),
            (true, InsertMode::Duplicate) => {
                (OpKind::InsertDuplicate, Some(merged.len() as u32))
            }
            (false, InsertMode::Overwrite) => (OpKind::InsertOverwrite, None),
            (false, _) => (OpKind::Insert, None),
        };

        self.append_op(guard, db, id, kind, key, record, duplicate_index)
    }

    fn erase_locked(
        &self,
        guard: &mut TxnStore,
        db: &Arc<DbState>,
        id: TxnId,
        key: &[u8],
        duplicate_index: Option<u32>,
    ) -> EngineResult<()> {
        self.ensure_writable(guard, id)?;
        self.validate(key, &[])?;

        let node_id = guard.node_id(db.name, key);
        check_conflict(&guard.ops, node_id.map(|n| guard.nodes.get(n)), Some(id))?;

        let base = db.tree.read().duplicates(key).unwrap_or_default();
        let merged = merge_visible(&guard.ops, node_id.map(|n| guard.nodes.get(n)), base, Some(id));
        if merged.is_empty() {
            return Err(EngineError::KeyNotFound);
        }

        let (kind, target) = match duplicate_index {
            Some(pos) => {
                if pos as usize >= merged.len() {
                    return Err(EngineError::KeyNotFound);
                }
                if merged.len() > 1 {
                    (OpKind::EraseDuplicate, Some(pos))
                } else {
                    (OpKind::Erase, None)
                }
            }
            None => (OpKind::Erase, None),
        };

        self.append_op(guard, db, id, kind, key, &[], target)
    }

    /// Creates the op, appends it to the WAL, and links it at the tail of
    /// both the node's and the transaction's operation list. Both links are
    /// in place before the environment lock is released.
    #[allow(clippy::too_many_arguments)]
    fn append_op(
        &self,
        st: &mut TxnStore,
        db: &Arc<DbState>,
        id: TxnId,
        kind: OpKind,
        key: &[u8],
        record: &[u8],
        duplicate_index: Option<u32>,
    ) -> EngineResult<()> {
        if st.ops.live() >= self.max_live_ops {
            if let Some(txn) = st.txns.get_mut(&id) {
                txn.poison(Poison::OutOfMemory);
            }
            return Err(EngineError::OutOfMemory);
        }

        let lsn = st.alloc_lsn();
        if let Err(e) = self.wal.append(&WalRecord::Op {
            lsn,
            txn_id: id,
            db_name: db.name,
            kind,
            key: key.to_vec(),
            record: record.to_vec(),
            duplicate_index,
        }) {
            if let Some(txn) = st.txns.get_mut(&id) {
                txn.poison(Poison::Io(e.to_string()));
            }
            return Err(e);
        }

        let node_id = match st.node_id(db.name, key) {
            Some(node_id) => node_id,
            None => {
                let node_id = st.nodes.alloc(TxnNode::new(db.clone(), key.to_vec()));
                st.indexes
                    .entry(db.name)
                    .or_default()
                    .store(key.to_vec(), node_id);
                node_id
            }
        };

        let mut op = TxnOperation::new(lsn, kind, id, record.to_vec(), duplicate_index, node_id);
        op.prev_in_node = st.nodes.get(node_id).tail;
        op.prev_in_txn = st.txns.get(&id).ok_or_else(not_active)?.op_tail;
        let op_id = st.ops.alloc(op);

        let node = st.nodes.get_mut(node_id);
        let old_tail = node.tail;
        node.tail = Some(op_id);
        if node.head.is_none() {
            node.head = Some(op_id);
        }
        if let Some(tail) = old_tail {
            st.ops.get_mut(tail).next_in_node = Some(op_id);
        }

        let txn = st.txns.get_mut(&id).ok_or_else(not_active)?;
        let old_txn_tail = txn.op_tail;
        txn.op_tail = Some(op_id);
        if txn.op_head.is_none() {
            txn.op_head = Some(op_id);
        }
        if let Some(tail) = old_txn_tail {
            st.ops.get_mut(tail).next_in_txn = Some(op_id);
        }

        trace!(%lsn, txn = %id, ?kind, "op appended");
        Ok(())
    }

    /// Unlinks an op from its node, frees it, and reclaims the node if this
    /// left it empty and unpinned.
    fn unlink_and_free_op(st: &mut TxnStore, op_id: OpId) {
        let op = st.ops.free(op_id);
        debug_assert!(op.is_flushed() || op.is_aborted(), "unlinking a live op");
        let node_id = op.node;

        match op.prev_in_node {
            Some(prev) => st.ops.get_mut(prev).next_in_node = op.next_in_node,
            None => st.nodes.get_mut(node_id).head = op.next_in_node,
        }
        match op.next_in_node {
            Some(next) => st.ops.get_mut(next).prev_in_node = op.prev_in_node,
            None => st.nodes.get_mut(node_id).tail = op.prev_in_node,
        }

        Self::reclaim_if_empty(st, node_id);
    }

    fn reclaim_if_empty(st: &mut TxnStore, node_id: NodeId) {
        let node = st.nodes.get(node_id);
        if !node.is_reclaimable() {
            return;
        }
        let key = node.key.clone();
        let db_name = node.db.name;
        if let Some(index) = st.indexes.get_mut(&db_name) {
            index.remove(&key);
        }
        st.nodes.free(node_id);
    }

    /// In-memory part of an abort: marks and unlinks every owned op.
    fn abort_locked(st: &mut TxnStore, id: TxnId) {
        let mut cursor = st.txns.get(&id).and_then(|txn| txn.op_head);
        while let Some(op_id) = cursor {
            let op = st.ops.get_mut(op_id);
            op.set_aborted();
            cursor = op.next_in_txn;
            Self::unlink_and_free_op(st, op_id);
        }
        if let Some(txn) = st.txns.get_mut(&id) {
            txn.op_head = None;
            txn.op_tail = None;
            txn.mark_aborted();
        }
    }

    /// Applies finished transactions from the head of the global list.
    ///
    /// A committed transaction flushes when it reaches the front: its ops
    /// are applied to the base trees in LSN order, marked flushed and
    /// unlinked. Aborted transactions are simply dropped from the list.
    fn flush_committed(&self, st: &mut TxnStore) -> EngineResult<()> {
        while let Some(&front) = st.queue.front() {
            let state = match st.txns.get(&front) {
                Some(txn) => txn.state(),
                None => {
                    st.queue.pop_front();
                    continue;
                }
            };

            match state {
                TxnState::Active => break,
                TxnState::Aborted => {
                    st.queue.pop_front();
                    st.txns.remove(&front);
                }
                TxnState::Committed => {
                    self.flush_txn(st, front)?;
                    st.queue.pop_front();
                    st.txns.remove(&front);
                }
            }
        }
        Ok(())
    }

    /// Applies one committed transaction to the base trees, op by op in
    /// LSN order. Each op translates into exactly one tree call.
    fn flush_txn(&self, st: &mut TxnStore, id: TxnId) -> EngineResult<()> {
        let mut cursor = st.txns.get(&id).and_then(|txn| txn.op_head);
        let mut applied = 0u32;

        while let Some(op_id) = cursor {
            let node_id = st.ops.get(op_id).node;
            let db = st.nodes.get(node_id).db.clone();

            {
                let mut tree = db.tree.write();
                let op = st.ops.get(op_id);
                let node = st.nodes.get(node_id);
                apply_op(
                    tree.as_mut(),
                    op.kind,
                    &node.key,
                    &op.record,
                    op.duplicate_index,
                )?;
            }

            let op = st.ops.get_mut(op_id);
            op.set_flushed();
            let lsn = op.lsn.as_u64();
            cursor = op.next_in_txn;

            st.flushed_lsn = st.flushed_lsn.max(lsn);
            Self::unlink_and_free_op(st, op_id);
            applied += 1;
        }

        if let Some(txn) = st.txns.get_mut(&id) {
            txn.op_head = None;
            txn.op_tail = None;
        }

        debug!(%id, ops = applied, flushed_lsn = st.flushed_lsn, "transaction flushed");
        Ok(())
    }
}

impl std::fmt::Debug for TxnManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.store.lock();
        f.debug_struct("TxnManager")
            .field("active", &st.active_count())
            .field("next_lsn", &st.next_lsn)
            .field("flushed_lsn", &st.flushed_lsn)
            .finish_non_exhaustive()
    }
}
