//! Environment directory management.
//!
//! File system layout of a cedardb environment:
//!
//! ```text
//! <env_path>/
//! ├─ LOCK          # Advisory lock, one process at a time
//! ├─ wal.log       # Write-ahead log
//! └─ SNAPSHOT      # Checkpoint image of all base trees
//! ```
//!
//! The LOCK file ensures only one process drives the environment at a time.
//! The SNAPSHOT is installed atomically via write-temp/rename/fsync-dir.

use crate::error::{EngineError, EngineResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const WAL_FILE: &str = "wal.log";
const SNAPSHOT_FILE: &str = "SNAPSHOT";
const SNAPSHOT_TEMP: &str = "SNAPSHOT.tmp";

/// Manages the environment directory structure and file locking.
///
/// The `EnvDir` holds an exclusive advisory lock on the environment
/// directory for its whole lifetime; a second open fails with
/// `EnvironmentLocked`.
#[derive(Debug)]
pub(crate) struct EnvDir {
    path: PathBuf,
    _lock_file: File,
}

impl EnvDir {
    /// Opens or creates an environment directory.
    pub(crate) fn open(path: &Path, create_if_missing: bool) -> EngineResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(EngineError::invalid_format(format!(
                    "environment directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(EngineError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(EngineError::EnvironmentLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the WAL file.
    pub(crate) fn wal_path(&self) -> PathBuf {
        self.path.join(WAL_FILE)
    }

    /// Returns the path to the snapshot file.
    pub(crate) fn snapshot_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_FILE)
    }

    /// Loads the raw snapshot bytes, or `None` for a fresh environment.
    pub(crate) fn load_snapshot(&self) -> EngineResult<Option<Vec<u8>>> {
        let snapshot_path = self.snapshot_path();

        if !snapshot_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&snapshot_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.is_empty() {
            return Ok(None);
        }

        Ok(Some(data))
    }

    /// Saves the snapshot atomically.
    ///
    /// Write-then-rename pattern for crash safety:
    /// 1. write to temporary file
    /// 2. sync temporary file to disk
    /// 3. rename temporary file to SNAPSHOT
    /// 4. fsync the directory so the rename is durable
    pub(crate) fn save_snapshot(&self, data: &[u8]) -> EngineResult<()> {
        let snapshot_path = self.snapshot_path();
        let temp_path = self.path.join(SNAPSHOT_TEMP);

        let mut file = File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &snapshot_path)?;
        self.sync_directory()?;

        Ok(())
    }

    /// Syncs the environment directory so metadata updates are durable.
    ///
    /// On Windows, NTFS journaling covers metadata durability and directory
    /// fsync is not supported; the call is skipped there.
    #[cfg(unix)]
    fn sync_directory(&self) -> EngineResult<()> {
        let dir = File::open(&self.path)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_directory(&self) -> EngineResult<()> {
        Ok(())
    }
}
