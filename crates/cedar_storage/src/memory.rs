//! Heap-backed store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;

/// A store that keeps its bytes on the heap.
///
/// Backs the write-ahead log of in-memory environments, where the log only
/// feeds the conflict and visibility machinery and no durability is
/// promised: `sync` is a no-op and nothing survives the process. Also the
/// store of choice for unit tests.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: Mutex<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let bytes = self.bytes.lock();
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let source = start
            .checked_add(buf.len())
            .and_then(|end| bytes.get(start..end));

        match source {
            Some(source) => {
                buf.copy_from_slice(source);
                Ok(())
            }
            None => Err(StorageError::ShortRead {
                offset,
                requested: buf.len(),
                len: bytes.len() as u64,
            }),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.lock();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.bytes.lock().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        // nothing here is promised to survive a crash
        Ok(())
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.lock();
        if new_len > bytes.len() as u64 {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_len,
                len: bytes.len() as u64,
            });
        }
        bytes.truncate(new_len as usize);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let store = InMemoryBackend::new();
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn append_returns_advancing_offsets() {
        let mut store = InMemoryBackend::new();
        assert_eq!(store.append(b"log record one").unwrap(), 0);
        assert_eq!(store.append(b"two").unwrap(), 14);
        assert_eq!(store.len().unwrap(), 17);
    }

    #[test]
    fn read_fills_the_callers_buffer() {
        let mut store = InMemoryBackend::new();
        let offset = store.append(b"header|body").unwrap();

        let mut header = [0u8; 7];
        store.read_exact_at(offset, &mut header).unwrap();
        assert_eq!(&header, b"header|");

        let mut body = [0u8; 4];
        store.read_exact_at(offset + 7, &mut body).unwrap();
        assert_eq!(&body, b"body");
    }

    #[test]
    fn short_reads_are_rejected() {
        let mut store = InMemoryBackend::new();
        store.append(b"abc").unwrap();

        let mut buf = [0u8; 3];
        // offset past the end
        let err = store.read_exact_at(10, &mut buf).unwrap_err();
        assert!(matches!(err, StorageError::ShortRead { len: 3, .. }));

        // read spilling over the end
        let err = store.read_exact_at(1, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            StorageError::ShortRead {
                offset: 1,
                requested: 3,
                ..
            }
        ));
    }

    #[test]
    fn truncate_discards_the_tail() {
        let mut store = InMemoryBackend::new();
        store.append(b"keep|drop").unwrap();

        store.truncate(5).unwrap();
        assert_eq!(store.len().unwrap(), 5);

        let mut buf = [0u8; 5];
        store.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(&buf, b"keep|");

        assert!(matches!(
            store.truncate(100),
            Err(StorageError::TruncateBeyondEnd { .. })
        ));
    }

    #[test]
    fn sync_is_a_noop() {
        let mut store = InMemoryBackend::new();
        store.append(b"x").unwrap();
        store.sync().unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }
}
