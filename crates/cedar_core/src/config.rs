//! Environment and operation configuration.

/// Configuration for creating or opening an environment.
///
/// The transaction flag is a property of the *session*, not of the
/// environment file: it must be passed on both create and open, and opening
/// a previously-transactional environment without it yields a
/// non-transactional session over the same data.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Whether transactions are enabled for this session.
    pub enable_transactions: bool,

    /// Whether the environment lives purely in memory.
    ///
    /// In-memory environments support the full transaction and cursor
    /// surface; only durability is absent.
    pub in_memory: bool,

    /// Whether to create the environment if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the WAL on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Maximum key size in bytes.
    pub max_key_size: usize,

    /// Maximum record size in bytes.
    pub max_record_size: usize,

    /// Maximum number of live (unflushed, unaborted) transaction operations
    /// across the environment. Exceeding it surfaces `OutOfMemory`.
    pub max_live_ops: usize,

    /// Format version to use for new environments.
    pub format_version: (u16, u16),
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            enable_transactions: false,
            in_memory: false,
            create_if_missing: true,
            sync_on_commit: true,
            max_key_size: u16::MAX as usize,
            max_record_size: 16 * 1024 * 1024, // 16 MB
            max_live_ops: 1 << 20,
            format_version: (1, 0),
        }
    }
}

impl EnvConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables transactions for this session.
    #[must_use]
    pub const fn enable_transactions(mut self, value: bool) -> Self {
        self.enable_transactions = value;
        self
    }

    /// Makes the environment in-memory.
    #[must_use]
    pub const fn in_memory(mut self, value: bool) -> Self {
        self.in_memory = value;
        self
    }

    /// Sets whether to create the environment if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the WAL on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the maximum key size.
    #[must_use]
    pub const fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    /// Sets the maximum record size.
    #[must_use]
    pub const fn max_record_size(mut self, size: usize) -> Self {
        self.max_record_size = size;
        self
    }

    /// Sets the live-operation cap of the transaction arena.
    #[must_use]
    pub const fn max_live_ops(mut self, count: usize) -> Self {
        self.max_live_ops = count;
        self
    }
}

/// Per-database options, fixed at database creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbOptions {
    /// Whether a key may carry multiple records.
    ///
    /// Duplicate positions are 0-based insertion order; sort-order duplicate
    /// comparators are not supported.
    pub enable_duplicate_keys: bool,
}

impl DbOptions {
    /// Creates default database options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables duplicate keys.
    #[must_use]
    pub const fn enable_duplicate_keys(mut self, value: bool) -> Self {
        self.enable_duplicate_keys = value;
        self
    }
}

/// Options for closing a database or an environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseOptions {
    /// Automatically finish transactions that are still active.
    ///
    /// Without this flag, closing with active transactions fails with
    /// `TxnStillOpen`.
    pub auto_cleanup: bool,

    /// When cleaning up, commit pending transactions instead of aborting
    /// them. Only meaningful together with `auto_cleanup`.
    pub txn_auto_commit: bool,
}

impl CloseOptions {
    /// Creates default close options (fail if transactions are active).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables automatic cleanup of active transactions.
    #[must_use]
    pub const fn auto_cleanup(mut self, value: bool) -> Self {
        self.auto_cleanup = value;
        self
    }

    /// Commits (rather than aborts) pending transactions during cleanup.
    #[must_use]
    pub const fn txn_auto_commit(mut self, value: bool) -> Self {
        self.txn_auto_commit = value;
        self
    }
}

/// Flags for beginning a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxnFlags {
    /// The transaction will not perform writes.
    pub read_only: bool,
}

impl TxnFlags {
    /// Creates default transaction flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the transaction read-only.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

/// How an insert treats an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Fail with `DuplicateKey` if the key already exists.
    #[default]
    Plain,
    /// Replace the existing record (and any duplicates) with the new one.
    Overwrite,
    /// Append the record to the key's duplicate list (requires a database
    /// with duplicate keys enabled). Duplicates keep insertion order.
    Duplicate,
}

/// Direction of a cursor move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMove {
    /// Move to the first key of the database.
    First,
    /// Move to the last key of the database.
    Last,
    /// Move to the key after the current position.
    Next,
    /// Move to the key before the current position.
    Prev,
}
