//! `ObjectStream` — a seekable read/write view over a single OID's payload.
//!
//! Every operation re-acquires the store's lock rather than holding a guard
//! across calls, so distinct streams over distinct OIDs can be interleaved
//! freely as long as callers serialize through the store (see spec's
//! concurrency model).

use crate::block_file::BLOCK_SIZE;
use crate::error::{Result, StoreError};
use crate::index::ObjectBlock;
use crate::store::ObjectStore;

/// Seek origins. `End` *subtracts* `offset` from the current length rather
/// than adding it — this deviates from `std::io::SeekFrom::End` convention
/// but matches the stream's on-disk semantics.
#[derive(Debug, Clone, Copy)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

pub struct ObjectStream<'a> {
    store: &'a ObjectStore,
    oid: i64,
    position: i64,
}

impl<'a> ObjectStream<'a> {
    /// Bind a stream to `oid`. If the store is writable and `oid` is
    /// absent, an empty `ObjectBlock` is created for it; on a read-only
    /// store an absent OID is `NotFound`.
    pub fn open(store: &'a ObjectStore, oid: i64) -> Result<Self> {
        store.with_inner_mut(|inner| -> Result<()> {
            if !inner.index.contains(oid) {
                if inner.read_only {
                    return Err(StoreError::NotFound { oid });
                }
                inner.index.insert(ObjectBlock::empty(oid))?;
                inner.allocator.observe_oid(oid);
            }
            Ok(())
        })?;
        Ok(Self { store, oid, position: 0 })
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let oid = self.oid;
        let position = self.position;
        let written = self.store.with_inner_mut(|inner| -> Result<usize> {
            let block = inner.index.get(oid).ok_or(StoreError::NotFound { oid })?.clone();
            let count_bytes = block.count_bytes as i64;
            let available = count_bytes - position;
            if available <= 0 {
                return Ok(0);
            }
            let count = (buf.len() as i64).min(available) as usize;

            let mut pos = position;
            let mut written = 0usize;
            while written < count {
                let block_index = (pos / BLOCK_SIZE as i64) as usize;
                if block_index >= block.blocks.len() {
                    break;
                }
                let offset_in_block = (pos % BLOCK_SIZE as i64) as u64;
                let chunk = ((BLOCK_SIZE - offset_in_block) as usize).min(count - written);
                let physical = block.blocks[block_index] as u64 + offset_in_block;
                inner.file.read_at(physical, &mut buf[written..written + chunk])?;
                written += chunk;
                pos += chunk as i64;
            }
            Ok(written)
        })?;
        self.position += written as i64;
        Ok(written)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let oid = self.oid;
        let position = self.position;
        let count = buf.len() as i64;
        let end = position + count;

        let block_count = self.store.with_inner_mut(|inner| {
            inner.index.get(oid).map(ObjectBlock::block_count).unwrap_or(0)
        });
        let needed_blocks = ((end as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE) as usize;
        if needed_blocks > block_count {
            self.set_len(end)?;
        }

        self.store.with_inner_mut(|inner| -> Result<()> {
            let block = inner.index.get(oid).ok_or(StoreError::NotFound { oid })?.clone();
            let mut pos = position;
            let mut written: i64 = 0;
            while written < count {
                let block_index = (pos / BLOCK_SIZE as i64) as usize;
                let offset_in_block = (pos % BLOCK_SIZE as i64) as u64;
                let chunk = ((BLOCK_SIZE - offset_in_block) as i64).min(count - written);
                let physical = block.blocks[block_index] as u64 + offset_in_block;
                let start = written as usize;
                let end = (written + chunk) as usize;
                inner.file.write_at(physical, &buf[start..end])?;
                written += chunk;
                pos += chunk;
            }
            if pos > block.count_bytes as i64 {
                if let Some(b) = inner.index.get_mut(oid) {
                    b.count_bytes = pos as i32;
                }
            }
            Ok(())
        })?;

        self.position += count;
        Ok(count as usize)
    }

    pub fn seek(&mut self, origin: SeekOrigin, offset: i64) -> Result<i64> {
        let oid = self.oid;
        let count_bytes = self
            .store
            .with_inner_mut(|inner| inner.index.get(oid).map(|b| b.count_bytes as i64).unwrap_or(0));

        let raw = match origin {
            SeekOrigin::Start => offset,
            SeekOrigin::Current => self.position + offset,
            SeekOrigin::End => count_bytes - offset,
        };
        if raw < 0 {
            return Err(StoreError::UnexpectedEof);
        }
        let clamped = raw.min(count_bytes);
        self.position = clamped;
        Ok(clamped)
    }

    pub fn set_len(&mut self, n: i64) -> Result<()> {
        let oid = self.oid;
        self.store.with_inner_mut(|inner| -> Result<()> {
            let desired = ((n as u64 + BLOCK_SIZE - 1) / BLOCK_SIZE) as usize;
            let block = inner.index.get(oid).ok_or(StoreError::NotFound { oid })?.clone();
            let current = block.block_count();
            let mut blocks = block.blocks;

            if desired < current {
                let freed = blocks.split_off(desired);
                inner.free.insert_many(freed);
            } else if desired > current {
                let after = if current > 0 { blocks[current - 1] } else { -1 };
                let extra = inner
                    .allocator
                    .find_new_pos_after(desired - current, after, &mut inner.free, &mut inner.file)?;
                blocks.extend(extra);
            }

            inner.index.put(ObjectBlock {
                oid,
                count_bytes: n as i32,
                blocks,
            });
            Ok(())
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.store.with_inner_mut(|inner| inner.file.flush().map_err(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_file::BLOCK_SIZE;

    fn fresh_store() -> ObjectStore {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        std::mem::forget(tmp);
        ObjectStore::open(path, false).unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let store = fresh_store();
        let mut stream = ObjectStream::open(&store, 9).unwrap();
        stream.write(b"hello world").unwrap();
        stream.seek(SeekOrigin::Start, 0).unwrap();
        let mut buf = [0u8; 11];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn shrink_then_regrow_reuses_freed_blocks() {
        let store = fresh_store();
        let mut stream = ObjectStream::open(&store, 9).unwrap();
        stream.write(&[0xAB; 1024]).unwrap();

        let original_blocks = store.with_inner_mut(|inner| inner.index.get(9).unwrap().blocks.clone());
        assert_eq!(original_blocks.len(), 4);

        stream.set_len(300).unwrap();
        let freed: Vec<i64> = store.with_inner_mut(|inner| inner.free.iter_ascending().collect());
        assert_eq!(freed, vec![original_blocks[2], original_blocks[3]]);

        stream.set_len(800).unwrap();
        let regrown = store.with_inner_mut(|inner| inner.index.get(9).unwrap().blocks.clone());
        assert_eq!(regrown[2], original_blocks[2]);
        assert_eq!(regrown[3], original_blocks[3]);
    }

    #[test]
    fn end_seek_subtracts_offset() {
        let store = fresh_store();
        let mut stream = ObjectStream::open(&store, 9).unwrap();
        stream.write(&[0u8; BLOCK_SIZE as usize]).unwrap();
        let pos = stream.seek(SeekOrigin::End, 10).unwrap();
        assert_eq!(pos, BLOCK_SIZE as i64 - 10);
    }

    #[test]
    fn seek_before_start_is_unexpected_eof() {
        let store = fresh_store();
        let mut stream = ObjectStream::open(&store, 9).unwrap();
        stream.write(b"abc").unwrap();
        let err = stream.seek(SeekOrigin::Current, -100).unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedEof));
    }
}
