//! `ObjectStore` — the public façade tying `BlockFile`, `FreeSpace`,
//! `ObjectIndex`, `Allocator`, and `IndexCodec` together under one lock.

use std::path::Path;
use std::sync::{Mutex, RwLock};

use tracing::{debug, info};

use crate::allocator::Allocator;
use crate::block_file::{BlockFile, BLOCK_SIZE};
use crate::error::{Result, StoreError};
use crate::free_space::FreeSpace;
use crate::index::{ObjectBlock, ObjectIndex};
use crate::index_codec::IndexCodec;

type SaveChangesCallback = dyn FnMut(&ObjectStore) -> Result<()> + Send;

/// State shared by every operation; `ObjectStream` reaches into this
/// through `ObjectStore::with_inner`/`with_inner_mut` rather than holding
/// its own lock guard across calls.
pub(crate) struct Inner {
    pub(crate) file: BlockFile,
    pub(crate) index: ObjectIndex,
    pub(crate) free: FreeSpace,
    pub(crate) allocator: Allocator,
    pub(crate) read_only: bool,
}

impl Inner {
    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn delete_locked(&mut self, oid: i64) -> Option<ObjectBlock> {
        let block = self.index.remove(oid)?;
        self.free.insert_many(block.blocks.iter().copied());
        Some(block)
    }

    fn write_locked(&mut self, oid: i64, bytes: &[u8]) -> Result<()> {
        self.delete_locked(oid);
        let count = if bytes.is_empty() {
            0
        } else {
            ((bytes.len() as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE) as usize
        };
        let blocks = if count == 0 {
            Vec::new()
        } else {
            self.allocator.find_new_pos(count, &mut self.free, &mut self.file)?
        };
        for (i, &offset) in blocks.iter().enumerate() {
            let start = i * BLOCK_SIZE as usize;
            let end = ((i + 1) * BLOCK_SIZE as usize).min(bytes.len());
            self.file.write_at(offset as u64, &bytes[start..end])?;
        }
        self.index.put(ObjectBlock {
            oid,
            count_bytes: bytes.len() as i32,
            blocks,
        });
        self.allocator.observe_oid(oid);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub file_len: u64,
    pub object_count: usize,
    pub free_block_count: usize,
}

pub struct ObjectStore {
    pub(crate) inner: RwLock<Inner>,
    save_changes: Mutex<Option<Box<SaveChangesCallback>>>,
}

impl ObjectStore {
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let mut file = BlockFile::open(path, read_only)?;
        let mut index = ObjectIndex::new();
        let mut free = FreeSpace::new();
        let max_oid = IndexCodec::read_oids(&mut index, &mut free, &mut file)?;

        let mut allocator = Allocator::new();
        allocator.observe_oid(max_oid);

        debug!(max_oid, read_only, "object store opened");

        Ok(Self {
            inner: RwLock::new(Inner {
                file,
                index,
                free,
                allocator,
                read_only,
            }),
            save_changes: Mutex::new(None),
        })
    }

    /// Register a callback fired exactly once, at the start of `close`,
    /// before the OID-0 block is freed and rewritten. The handler may call
    /// `write`/`delete`/`reserve` on the store; it must not register or
    /// trigger another `save_changes` invocation.
    pub fn set_save_changes<F>(&self, callback: F)
    where
        F: FnMut(&ObjectStore) -> Result<()> + Send + 'static,
    {
        *self.save_changes.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn is_empty(&self) -> Result<bool> {
        let mut inner = self.inner.write().unwrap();
        Ok(inner.file.len()? == 0)
    }

    pub fn contains(&self, oid: i64) -> bool {
        self.inner.read().unwrap().index.contains(oid)
    }

    pub fn read(&self, oid: i64) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write().unwrap();
        let block = match inner.index.get(oid) {
            Some(block) => block.clone(),
            None => return Ok(None),
        };
        let mut buf = vec![0u8; block.count_bytes as usize];
        for (i, &offset) in block.blocks.iter().enumerate() {
            let start = i * BLOCK_SIZE as usize;
            let end = ((i + 1) * BLOCK_SIZE as usize).min(buf.len());
            inner.file.read_at(offset as u64, &mut buf[start..end])?;
        }
        Ok(Some(buf))
    }

    pub fn write(&self, oid: i64, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.check_writable()?;
        inner.write_locked(oid, bytes)
    }

    pub fn delete(&self, oid: i64) -> Result<Option<ObjectBlock>> {
        let mut inner = self.inner.write().unwrap();
        inner.check_writable()?;
        Ok(inner.delete_locked(oid))
    }

    pub fn delete_blocks(&self, offsets: &[i64]) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.check_writable()?;
        inner.free.insert_many(offsets.iter().copied());
        Ok(())
    }

    pub fn reserve(&self, oid: i64) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.check_writable()?;
        let Inner { allocator, index, .. } = &mut *inner;
        allocator.reserve(oid, index)
    }

    pub fn new_oid(&self) -> Result<i64> {
        let mut inner = self.inner.write().unwrap();
        inner.check_writable()?;
        let Inner { allocator, index, .. } = &mut *inner;
        let oid = allocator.new_oid(index)?;
        Ok(oid)
    }

    /// Reachable by `ObjectStream` to read/mutate shared state under the
    /// store's single lock without holding a guard across calls.
    pub(crate) fn with_inner_mut<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.write().unwrap();
        f(&mut inner)
    }

    /// The block offsets currently backing `oid`, empty if absent.
    pub fn object_blocks(&self, oid: i64) -> Vec<i64> {
        self.inner
            .read()
            .unwrap()
            .index
            .get(oid)
            .map(|b| b.blocks.clone())
            .unwrap_or_default()
    }

    /// `(oid, count_bytes, block_count)` for every non-index object,
    /// ascending by OID.
    pub fn objects(&self) -> Vec<(i64, i32, usize)> {
        self.inner
            .read()
            .unwrap()
            .index
            .iter_non_index()
            .map(|b| (b.oid, b.count_bytes, b.block_count()))
            .collect()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut inner = self.inner.write().unwrap();
        Ok(StoreStats {
            file_len: inner.file.len()?,
            object_count: inner.index.iter_non_index().count(),
            free_block_count: inner.free.len(),
        })
    }

    /// Flush the index chain and free-space table back to the file,
    /// rewritten and truncated at offset 0. Read-only stores are closed
    /// without writing.
    pub fn close(self) -> Result<()> {
        let callback = self.save_changes.lock().unwrap().take();
        if let Some(mut callback) = callback {
            callback(&self)?;
        }

        let mut inner = self.inner.write().unwrap();
        if inner.read_only {
            return Ok(());
        }
        let Inner { index, free, file, .. } = &mut *inner;
        IndexCodec::save_oids(index, free, file)?;
        inner.file.flush()?;
        info!("object store closed and index rewritten");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh_path() -> std::path::PathBuf {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::mem::forget(tmp);
        path
    }

    #[test]
    fn fresh_store_is_empty_and_round_trips() {
        let path = fresh_path();
        let store = ObjectStore::open(&path, false).unwrap();
        assert!(store.is_empty().unwrap());

        let payload = vec![0xAAu8; 300];
        store.write(5, &payload).unwrap();
        assert_eq!(store.read(5).unwrap(), Some(payload.clone()));
        assert_eq!(store.index_block_count(5), 2);
        store.close().unwrap();

        let store = ObjectStore::open(&path, false).unwrap();
        assert_eq!(store.read(5).unwrap(), Some(payload));
    }

    #[test]
    fn delete_reuses_freed_block() {
        let path = fresh_path();
        let store = ObjectStore::open(&path, false).unwrap();
        store.write(7, &[0x01u8; 256]).unwrap();
        let first_offset = store.first_block_offset(7);
        store.delete(7).unwrap();
        store.write(8, &[0x02u8; 256]).unwrap();
        assert_eq!(store.first_block_offset(8), first_offset);
    }

    #[test]
    fn read_only_store_rejects_writes() {
        let path = fresh_path();
        ObjectStore::open(&path, false).unwrap().close().unwrap();
        let store = ObjectStore::open(&path, true).unwrap();
        assert!(matches!(store.write(1, b"x"), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn save_changes_callback_fires_once_on_close() {
        let path = fresh_path();
        let store = ObjectStore::open(&path, false).unwrap();
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let fired_clone = fired.clone();
        store.set_save_changes(move |s| {
            fired_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            s.write(crate::block_file::ROOT_OID, b"root")?;
            Ok(())
        });
        store.close().unwrap();
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);

        let store = ObjectStore::open(&path, true).unwrap();
        assert_eq!(store.read(crate::block_file::ROOT_OID).unwrap(), Some(b"root".to_vec()));
    }

    impl ObjectStore {
        fn index_block_count(&self, oid: i64) -> usize {
            self.inner.read().unwrap().index.get(oid).map(|b| b.block_count()).unwrap_or(0)
        }

        fn first_block_offset(&self, oid: i64) -> i64 {
            self.inner.read().unwrap().index.get(oid).unwrap().blocks[0]
        }
    }
}
