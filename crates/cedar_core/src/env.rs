//! The environment: top-level container for databases and transactions.

use crate::config::{CloseOptions, DbOptions, EnvConfig, TxnFlags};
use crate::db::{Database, DbState};
use crate::dir::EnvDir;
use crate::error::{EngineError, EngineResult};
use crate::snapshot::{Snapshot, SnapshotDb};
use crate::tree::{apply_op, TreeInsert};
use crate::txn::manager::{TxnManager, TxnStore};
use crate::types::{DbName, Lsn, TxnId};
use crate::wal::{RecoveryScan, WalManager, WalRecord};
use cedar_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared interior of an [`Environment`].
pub(crate) struct EnvInner {
    config: EnvConfig,
    /// Directory and advisory lock; drained at close so the lock is
    /// released even while handles are still alive. `None` for in-memory
    /// environments.
    dir: Mutex<Option<EnvDir>>,
    manager: TxnManager,
    dbs: RwLock<BTreeMap<DbName, Arc<DbState>>>,
    closed: AtomicBool,
}

impl EnvInner {
    pub(crate) fn manager(&self) -> &TxnManager {
        &self.manager
    }

    pub(crate) fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub(crate) fn transactions_enabled(&self) -> bool {
        self.config.enable_transactions
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> EngineResult<()> {
        if self.is_closed() {
            return Err(EngineError::EnvironmentClosed);
        }
        Ok(())
    }

    /// Writes the snapshot while holding the environment lock, so the
    /// flushed LSN cannot move underneath the image.
    fn write_snapshot_locked(&self, st: &TxnStore) -> EngineResult<()> {
        let dir_guard = self.dir.lock();
        let Some(dir) = dir_guard.as_ref() else {
            return Ok(());
        };

        let dbs = self.dbs.read();
        let mut snapshot = Snapshot {
            flushed_lsn: st.flushed_lsn,
            next_txn_id: st.next_txn_id,
            dbs: Vec::with_capacity(dbs.len()),
        };
        for (name, state) in dbs.iter() {
            let tree = state.tree.read();
            let mut entries = Vec::new();
            tree.scan(&mut |key, dups| entries.push((key.to_vec(), dups.to_vec())));
            snapshot.dbs.push(SnapshotDb {
                name: *name,
                options: state.options,
                entries,
            });
        }

        dir.save_snapshot(&snapshot.encode())
    }

    pub(crate) fn write_snapshot(&self) -> EngineResult<()> {
        let st = self.manager.store();
        self.write_snapshot_locked(&st)
    }

    /// Persists a checkpoint: snapshot first, then a checkpoint record; the
    /// WAL is truncated only when no transaction is in flight, so that no
    /// op record a later commit still needs can be lost.
    fn checkpoint_inner(&self) -> EngineResult<()> {
        if self.dir.lock().is_none() {
            return Ok(());
        }

        let st = self.manager.store();
        self.write_snapshot_locked(&st)?;

        let wal = self.manager.wal();
        wal.append(&WalRecord::Checkpoint {
            lsn: Lsn::new(st.flushed_lsn),
        })?;
        wal.sync()?;

        if st.queue.is_empty() {
            wal.clear()?;
            debug!(flushed_lsn = st.flushed_lsn, "checkpoint truncated the WAL");
        } else {
            debug!(
                flushed_lsn = st.flushed_lsn,
                in_flight = st.queue.len(),
                "checkpoint kept the WAL, transactions in flight"
            );
        }
        Ok(())
    }

    pub(crate) fn close_env(&self, options: CloseOptions) -> EngineResult<()> {
        if self.is_closed() {
            return Ok(());
        }

        let active = self.manager.active_count();
        if active > 0 {
            if !options.auto_cleanup {
                return Err(EngineError::TxnStillOpen { count: active });
            }
            warn!(
                active,
                auto_commit = options.txn_auto_commit,
                "finishing active transactions at close"
            );
            self.manager.cleanup(options.txn_auto_commit)?;
        }

        self.checkpoint_inner()?;

        for state in self.dbs.read().values() {
            state.set_open(false);
        }
        self.manager.clear();
        self.closed.store(true, Ordering::Release);
        // release the directory lock even while handles are still alive
        *self.dir.lock() = None;
        debug!("environment closed");
        Ok(())
    }

    pub(crate) fn close_db(&self, state: &Arc<DbState>, options: CloseOptions) -> EngineResult<()> {
        if !state.is_open() {
            return Ok(());
        }

        let active = self.manager.active_count();
        if active > 0 {
            if !options.auto_cleanup {
                return Err(EngineError::TxnStillOpen { count: active });
            }
            self.manager.cleanup(options.txn_auto_commit)?;
        }

        state.set_open(false);
        self.write_snapshot()
    }
}

impl std::fmt::Debug for EnvInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("transactions", &self.config.enable_transactions)
            .field("in_memory", &self.dir.lock().is_none())
            .field("databases", &self.dbs.read().len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Top-level container holding databases, the WAL and the transaction
/// machinery.
///
/// A file-backed environment owns a directory with an advisory lock, the
/// WAL and the checkpoint snapshot; an in-memory environment offers the
/// same surface without durability.
///
/// Dropping the environment closes it with automatic cleanup of pending
/// transactions.
pub struct Environment {
    inner: Arc<EnvInner>,
}

impl Environment {
    /// Opens or creates an environment at the given path.
    ///
    /// With `config.in_memory` the path is ignored and an in-memory
    /// environment is created.
    ///
    /// The transaction flag is not persisted: it must be passed on every
    /// open, and opening a previously-transactional environment without it
    /// yields a non-transactional session.
    ///
    /// # Errors
    ///
    /// - `EnvironmentLocked` when another process holds the environment
    /// - `InvalidFormat` / `ChecksumMismatch` on a corrupted snapshot
    /// - `WalCorruption` / `ChecksumMismatch` on a corrupted WAL
    pub fn open(path: impl AsRef<Path>, config: EnvConfig) -> EngineResult<Self> {
        if config.in_memory {
            return Self::build(None, config);
        }
        let dir = EnvDir::open(path.as_ref(), config.create_if_missing)?;
        Self::build(Some(dir), config)
    }

    /// Creates an in-memory environment.
    pub fn open_in_memory(config: EnvConfig) -> EngineResult<Self> {
        Self::build(None, config.in_memory(true))
    }

    fn build(dir: Option<EnvDir>, config: EnvConfig) -> EngineResult<Self> {
        // the environment directory exists by now, so the WAL file can be
        // opened directly inside it
        let wal_backend: Box<dyn StorageBackend> = match &dir {
            Some(dir) => Box::new(FileBackend::open(&dir.wal_path())?),
            None => Box::new(InMemoryBackend::new()),
        };
        let wal = WalManager::new(wal_backend);

        let mut dbs: BTreeMap<DbName, Arc<DbState>> = BTreeMap::new();
        let mut flushed_lsn = 0u64;
        let mut snapshot_next_txn_id = 1u64;

        // load the checkpoint snapshot
        if let Some(dir) = &dir {
            if let Some(bytes) = dir.load_snapshot()? {
                let snapshot = Snapshot::decode(&bytes)?;
                flushed_lsn = snapshot.flushed_lsn;
                snapshot_next_txn_id = snapshot.next_txn_id.max(1);

                for db in snapshot.dbs {
                    let state = Arc::new(DbState::new(db.name, db.options));
                    state.set_open(false);
                    {
                        let mut tree = state.tree.write();
                        for (key, dups) in db.entries {
                            for (i, record) in dups.iter().enumerate() {
                                let mode = if i == 0 {
                                    TreeInsert::Overwrite(None)
                                } else {
                                    TreeInsert::Duplicate
                                };
                                tree.insert(&key, record, mode)?;
                            }
                        }
                    }
                    dbs.insert(db.name, state);
                }
            }
        }

        // replay the WAL: first pass collects commit records, the second
        // applies committed ops beyond the snapshot in LSN order
        let mut scan = RecoveryScan::new();
        scan.scan(wal.iter()?)?;

        let mut replayed = 0u64;
        let mut max_applied = flushed_lsn;
        for result in wal.iter()? {
            let (_, record) = result?;
            let WalRecord::Op {
                lsn,
                txn_id,
                db_name,
                kind,
                key,
                record: payload,
                duplicate_index,
            } = record
            else {
                continue;
            };

            if lsn.as_u64() <= flushed_lsn || !scan.is_committed(txn_id) {
                continue;
            }

            let state = dbs.entry(db_name).or_insert_with(|| {
                warn!(%db_name, "database missing from snapshot, recreated during replay");
                let state = Arc::new(DbState::new(db_name, DbOptions::new()));
                state.set_open(false);
                state
            });
            apply_op(
                state.tree.write().as_mut(),
                kind,
                &key,
                &payload,
                duplicate_index,
            )?;
            replayed += 1;
            max_applied = max_applied.max(lsn.as_u64());
        }

        let manager = TxnManager::new(wal, &config);
        manager.restore_counters(
            scan.max_lsn().max(max_applied) + 1,
            (scan.max_txn_id() + 1).max(snapshot_next_txn_id),
            max_applied,
        );

        info!(
            databases = dbs.len(),
            replayed,
            flushed_lsn = max_applied,
            transactions = config.enable_transactions,
            in_memory = dir.is_none(),
            "environment opened"
        );

        Ok(Self {
            inner: Arc::new(EnvInner {
                config,
                dir: Mutex::new(dir),
                manager,
                dbs: RwLock::new(dbs),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Creates a new database in the environment.
    ///
    /// # Errors
    ///
    /// - `InvalidParameter` for the reserved name 0
    /// - `InvalidOperation` when the database already exists
    pub fn create_db(&self, name: DbName, options: DbOptions) -> EngineResult<Database> {
        self.inner.ensure_open()?;
        if name.as_u16() == 0 {
            return Err(EngineError::invalid_parameter("database name 0 is reserved"));
        }

        {
            let mut dbs = self.inner.dbs.write();
            if dbs.contains_key(&name) {
                return Err(EngineError::invalid_operation(format!(
                    "database {name} already exists"
                )));
            }
            dbs.insert(name, Arc::new(DbState::new(name, options)));
        }

        // persist the registry so replay after a crash knows this database
        self.inner.write_snapshot()?;

        let state = self.state_of(name)?;
        state.set_open(true);
        Ok(Database::new(self.inner.clone(), state))
    }

    /// Opens an existing database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseNotFound` when no database with this name exists.
    pub fn open_db(&self, name: DbName) -> EngineResult<Database> {
        self.inner.ensure_open()?;
        let state = self.state_of(name)?;
        state.set_open(true);
        Ok(Database::new(self.inner.clone(), state))
    }

    fn state_of(&self, name: DbName) -> EngineResult<Arc<DbState>> {
        self.inner
            .dbs
            .read()
            .get(&name)
            .cloned()
            .ok_or(EngineError::DatabaseNotFound { name })
    }

    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` when transactions are not enabled.
    pub fn begin(&self, flags: TxnFlags) -> EngineResult<Txn> {
        self.inner.ensure_open()?;
        if !self.inner.transactions_enabled() {
            return Err(EngineError::invalid_operation(
                "transactions are not enabled for this environment",
            ));
        }
        let id = self.inner.manager.begin(flags, false)?;
        Ok(Txn {
            env: self.inner.clone(),
            id,
        })
    }

    /// Persists a checkpoint: all base trees are written to the snapshot
    /// and the WAL is truncated when no transaction is in flight.
    pub fn checkpoint(&self) -> EngineResult<()> {
        self.inner.ensure_open()?;
        self.inner.checkpoint_inner()
    }

    /// Closes the environment.
    ///
    /// # Errors
    ///
    /// Returns `TxnStillOpen` when transactions are still active and
    /// `auto_cleanup` was not requested. With `auto_cleanup`, pending
    /// transactions are aborted, or committed with `txn_auto_commit`.
    pub fn close(&self, options: CloseOptions) -> EngineResult<()> {
        self.inner.close_env(options)
    }

    /// Whether this session has transactions enabled.
    #[must_use]
    pub fn transactions_enabled(&self) -> bool {
        self.inner.transactions_enabled()
    }

    /// Number of active transactions.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.inner.manager.active_count()
    }

    /// The configuration this environment was opened with.
    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        self.inner.config()
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        let _ = self
            .inner
            .close_env(CloseOptions::new().auto_cleanup(true));
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

/// A transaction handle.
///
/// Transactions are created by [`Environment::begin`] and finished with
/// [`Txn::commit`] or [`Txn::abort`]. Dropping an active handle without
/// open cursors aborts it.
pub struct Txn {
    env: Arc<EnvInner>,
    id: TxnId,
}

impl Txn {
    pub(crate) fn env_inner(&self) -> &Arc<EnvInner> {
        &self.env
    }

    /// Returns the transaction's ID.
    #[must_use]
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Whether the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.env.is_closed() && self.env.manager.is_active(self.id)
    }

    /// Commits the transaction.
    ///
    /// After this returns, the transaction's operations are durable and
    /// applied to the base trees as soon as every older transaction has
    /// finished.
    ///
    /// # Errors
    ///
    /// - `CursorStillOpen` while cursors are bound to the transaction
    /// - the sticky error of a poisoned transaction (which is aborted)
    /// - `Io` when the commit record cannot be written; the transaction
    ///   stays active so the caller may retry or abort
    pub fn commit(&self) -> EngineResult<()> {
        self.env.ensure_open()?;
        self.env.manager.commit(self.id, false)
    }

    /// Aborts the transaction, discarding all its operations.
    ///
    /// # Errors
    ///
    /// Returns `CursorStillOpen` while cursors are bound to the
    /// transaction.
    pub fn abort(&self) -> EngineResult<()> {
        self.env.ensure_open()?;
        self.env.manager.abort(self.id, false)
    }
}

impl Drop for Txn {
    fn drop(&mut self) {
        if !self.env.is_closed() && self.env.manager.is_active(self.id) {
            let _ = self.env.manager.abort(self.id, false);
        }
    }
}

impl std::fmt::Debug for Txn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Txn")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
