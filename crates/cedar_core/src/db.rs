//! Database handle and operation dispatch.

use crate::config::{CloseOptions, DbOptions, EnvConfig, InsertMode};
use crate::env::{EnvInner, Txn};
use crate::error::{EngineError, EngineResult};
use crate::tree::{default_tree, BaseTree, TreeInsert};
use crate::types::{DbName, TxnId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared state of one database inside an environment.
pub(crate) struct DbState {
    /// The database's 16-bit name.
    pub name: DbName,
    /// Options fixed at creation.
    pub options: DbOptions,
    /// The base tree, authoritative for flushed state.
    pub tree: RwLock<Box<dyn BaseTree>>,
    open: AtomicBool,
}

impl DbState {
    pub(crate) fn new(name: DbName, options: DbOptions) -> Self {
        Self {
            name,
            options,
            tree: RwLock::new(default_tree(&options)),
            open: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::Release);
    }
}

impl std::fmt::Debug for DbState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbState")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// A single ordered key/value namespace inside an environment.
///
/// All operations optionally take a transaction. Without one, and with
/// transactions enabled on the environment, the call runs under an internal
/// temporary transaction that is committed immediately (or aborted on
/// error) and is subject to the same conflict rules.
///
/// Returned key and record bytes are owned per-call allocations.
pub struct Database {
    env: Arc<EnvInner>,
    state: Arc<DbState>,
}

impl Database {
    pub(crate) fn new(env: Arc<EnvInner>, state: Arc<DbState>) -> Self {
        Self { env, state }
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> DbName {
        self.state.name
    }

    /// Whether this database carries multiple records per key.
    #[must_use]
    pub fn duplicates_enabled(&self) -> bool {
        self.state.options.enable_duplicate_keys
    }

    /// Whether the session has transactions enabled.
    #[must_use]
    pub fn transactions_enabled(&self) -> bool {
        self.env.transactions_enabled()
    }

    fn guard(&self) -> EngineResult<()> {
        self.env.ensure_open()?;
        if !self.state.is_open() {
            return Err(EngineError::DatabaseClosed {
                name: self.state.name,
            });
        }
        Ok(())
    }

    fn resolve_txn(&self, txn: Option<&Txn>) -> EngineResult<Option<TxnId>> {
        match txn {
            None => Ok(None),
            Some(txn) => {
                if !Arc::ptr_eq(txn.env_inner(), &self.env) {
                    return Err(EngineError::invalid_parameter(
                        "transaction belongs to a different environment",
                    ));
                }
                if !self.env.transactions_enabled() {
                    return Err(EngineError::invalid_operation(
                        "transactions are not enabled for this environment",
                    ));
                }
                Ok(Some(txn.id()))
            }
        }
    }

    /// Inserts a key/record pair.
    ///
    /// # Errors
    ///
    /// - `DuplicateKey` when the key exists and the mode is `Plain`
    /// - `TxnConflict` when a concurrent active transaction touched the key
    /// - `LimitsReached` when key or record exceed the configured sizes
    /// - `InvalidParameter` when `Duplicate` is used without duplicate keys
    pub fn insert(
        &self,
        txn: Option<&Txn>,
        key: &[u8],
        record: &[u8],
        mode: InsertMode,
    ) -> EngineResult<()> {
        self.guard()?;
        let txn_id = self.resolve_txn(txn)?;

        if self.env.transactions_enabled() {
            self.env.manager().insert(&self.state, txn_id, key, record, mode)
        } else {
            self.direct_insert(key, record, mode)
        }
    }

    /// Looks up the (first) record of a key.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` when the visible state has no such key
    /// - `TxnConflict` when a concurrent active transaction touched the key
    pub fn find(&self, txn: Option<&Txn>, key: &[u8]) -> EngineResult<Vec<u8>> {
        self.guard()?;
        let txn_id = self.resolve_txn(txn)?;

        if self.env.transactions_enabled() {
            self.env.manager().find(&self.state, txn_id, key)
        } else {
            self.state
                .tree
                .read()
                .find(key)
                .ok_or(EngineError::KeyNotFound)
        }
    }

    /// Erases a key with all its duplicates.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` when the visible state has no such key
    /// - `TxnConflict` when a concurrent active transaction touched the key
    pub fn erase(&self, txn: Option<&Txn>, key: &[u8]) -> EngineResult<()> {
        self.guard()?;
        let txn_id = self.resolve_txn(txn)?;

        if self.env.transactions_enabled() {
            self.env.manager().erase(&self.state, txn_id, key, None)
        } else {
            self.state.tree.write().erase(key, None)
        }
    }

    /// Counts keys, or records when `skip_duplicates` is false.
    ///
    /// Counting is permissive towards concurrent writers: operations of
    /// foreign active transactions are skipped and the latest visible state
    /// beneath them contributes.
    pub fn count(&self, txn: Option<&Txn>, skip_duplicates: bool) -> EngineResult<u64> {
        self.guard()?;
        let txn_id = self.resolve_txn(txn)?;

        if self.env.transactions_enabled() {
            self.env.manager().count(&self.state, txn_id, skip_duplicates)
        } else {
            Ok(self.state.tree.read().count(skip_duplicates))
        }
    }

    /// Creates a cursor over this database, optionally bound to a
    /// transaction.
    ///
    /// A transaction with open cursors refuses to commit or abort with
    /// `CursorStillOpen` until they are closed.
    pub fn cursor(&self, txn: Option<&Txn>) -> EngineResult<crate::cursor::Cursor> {
        self.guard()?;
        let txn_id = self.resolve_txn(txn)?;
        crate::cursor::Cursor::create(self.env.clone(), self.state.clone(), txn_id)
    }

    /// Closes the database.
    ///
    /// # Errors
    ///
    /// Returns `TxnStillOpen` when transactions are still active and
    /// `auto_cleanup` was not requested.
    pub fn close(&self, options: CloseOptions) -> EngineResult<()> {
        self.env.ensure_open()?;
        self.env.close_db(&self.state, options)
    }

    fn direct_insert(&self, key: &[u8], record: &[u8], mode: InsertMode) -> EngineResult<()> {
        direct_insert(&self.state, self.env.config(), key, record, mode)
    }
}

/// Insert path for sessions without transactions: straight to the tree.
pub(crate) fn direct_insert(
    state: &DbState,
    config: &EnvConfig,
    key: &[u8],
    record: &[u8],
    mode: InsertMode,
) -> EngineResult<()> {
    validate_kv(config, key, record)?;
    if mode == InsertMode::Duplicate && !state.options.enable_duplicate_keys {
        return Err(EngineError::invalid_parameter(
            "duplicate keys are not enabled for this database",
        ));
    }

    let tree_mode = match mode {
        InsertMode::Plain => TreeInsert::Plain,
        InsertMode::Overwrite => TreeInsert::Overwrite(None),
        InsertMode::Duplicate => TreeInsert::Duplicate,
    };
    state.tree.write().insert(key, record, tree_mode)
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.state.name)
            .field("duplicates", &self.state.options.enable_duplicate_keys)
            .finish_non_exhaustive()
    }
}

/// Validates key and record sizes against the environment limits.
pub(crate) fn validate_kv(config: &EnvConfig, key: &[u8], record: &[u8]) -> EngineResult<()> {
    if key.len() > config.max_key_size {
        return Err(EngineError::limits_reached(format!(
            "key size {} exceeds maximum {}",
            key.len(),
            config.max_key_size
        )));
    }
    if record.len() > config.max_record_size {
        return Err(EngineError::limits_reached(format!(
            "record size {} exceeds maximum {}",
            record.len(),
            config.max_record_size
        )));
    }
    Ok(())
}
