//! File-backed store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A store backed by a single file.
///
/// This is where a persistent environment keeps its write-ahead log. The
/// engine appends framed records, calls `sync` before acknowledging a
/// commit, and replays the file on open; `truncate` reclaims it after a
/// checkpoint.
///
/// The file handle and the tracked length live under one mutex, so the
/// length can never drift from what was actually written.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileInner>,
}

#[derive(Debug)]
struct FileInner {
    file: File,
    len: u64,
}

impl FileBackend {
    /// Opens the file, creating it when absent.
    ///
    /// An existing file's length becomes the next append offset, so a
    /// reopened log continues where the previous session stopped.
    ///
    /// # Errors
    ///
    /// Fails with `Io` when the file cannot be opened or its metadata read.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileInner { file, len }),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();

        let in_bounds = offset
            .checked_add(buf.len() as u64)
            .map_or(false, |end| end <= inner.len);
        if !in_bounds {
            return Err(StorageError::ShortRead {
                offset,
                requested: buf.len(),
                len: inner.len,
            });
        }
        if buf.is_empty() {
            return Ok(());
        }

        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.read_exact(buf)?;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();
        let offset = inner.len;

        if !data.is_empty() {
            // seek to the tracked end rather than SeekFrom::End, so a
            // concurrent reader's seek cannot move the append position
            inner.file.seek(SeekFrom::Start(offset))?;
            inner.file.write_all(data)?;
            inner.len += data.len() as u64;
        }

        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        if new_len > inner.len {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_len,
                len: inner.len,
            });
        }

        inner.file.set_len(new_len)?;
        inner.file.sync_all()?;
        inner.len = new_len;
        Ok(())
    }
}
