//! `IndexCodec` — serializes `ObjectIndex` and `FreeSpace` into the OID-0
//! chain and decodes them back on open.
//!
//! The chain is a sequence of [`BLOCK_SIZE`]-byte blocks rooted at offset 0.
//! Usable payload per block is `BLOCK_SIZE - 8` bytes; the last 8 bytes of a
//! block are a continuation pointer, written only when the field about to
//! be encoded would not fit in the block's remaining space.

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use crate::block_file::{round_up_to_block, BlockFile, BLOCK_SIZE, INDEX_OID};
use crate::error::Result;
use crate::free_space::FreeSpace;
use crate::index::{ObjectBlock, ObjectIndex};

fn read_i32_at(file: &mut BlockFile, offset: u64) -> Result<i32> {
    let mut buf = [0u8; 4];
    file.read_at(offset, &mut buf)?;
    Ok(LittleEndian::read_i32(&buf))
}

fn read_i64_at(file: &mut BlockFile, offset: u64) -> Result<i64> {
    let mut buf = [0u8; 8];
    file.read_at(offset, &mut buf)?;
    Ok(LittleEndian::read_i64(&buf))
}

fn write_i32_at(file: &mut BlockFile, offset: u64, value: i32) -> Result<()> {
    let mut buf = [0u8; 4];
    LittleEndian::write_i32(&mut buf, value);
    file.write_at(offset, &buf)?;
    Ok(())
}

fn write_i64_at(file: &mut BlockFile, offset: u64, value: i64) -> Result<()> {
    let mut buf = [0u8; 8];
    LittleEndian::write_i64(&mut buf, value);
    file.write_at(offset, &buf)?;
    Ok(())
}

/// Tracks the write cursor through the chain as entries are encoded.
struct ChainWriter {
    position: u64,
    file_len: u64,
    chain_blocks: Vec<i64>,
}

impl ChainWriter {
    fn new(file_len: u64) -> Self {
        Self {
            position: 0,
            file_len,
            chain_blocks: vec![0],
        }
    }

    /// Ensure `field_size` bytes fit before the block's continuation
    /// reservation; if not, jump to a new chain block first.
    fn ensure_fits(&mut self, file: &mut BlockFile, free: &mut FreeSpace, field_size: u64) -> Result<()> {
        let bytes_left = BLOCK_SIZE - (self.position % BLOCK_SIZE);
        if bytes_left >= field_size + 8 {
            return Ok(());
        }

        let pointer = if let Some(offset) = free.pop_first() {
            offset
        } else if self.position == self.file_len {
            let new_block = self.file_len as i64;
            self.file_len += BLOCK_SIZE;
            file.set_len(self.file_len)?;
            new_block + 8
        } else {
            let new_block = self.file_len as i64;
            self.file_len += BLOCK_SIZE;
            file.set_len(self.file_len)?;
            new_block
        };

        write_i64_at(file, self.position, pointer)?;
        // Record the actual continuation offset, matching what a fresh
        // `ChainReader` reconstructs from the bytes on disk (it has no way
        // to know the block-aligned start that produced `pointer`).
        self.chain_blocks.push(pointer);
        self.position = pointer as u64;
        Ok(())
    }

    fn write_i32(&mut self, file: &mut BlockFile, free: &mut FreeSpace, value: i32) -> Result<()> {
        self.ensure_fits(file, free, 4)?;
        write_i32_at(file, self.position, value)?;
        self.position += 4;
        Ok(())
    }

    fn write_i64(&mut self, file: &mut BlockFile, free: &mut FreeSpace, value: i64) -> Result<()> {
        self.ensure_fits(file, free, 8)?;
        write_i64_at(file, self.position, value)?;
        self.position += 8;
        Ok(())
    }
}

/// Tracks the read cursor through the chain as entries are decoded.
struct ChainReader {
    position: u64,
    file_len: u64,
    chain_blocks: Vec<i64>,
}

impl ChainReader {
    fn new(file_len: u64) -> Self {
        Self {
            position: 0,
            file_len,
            chain_blocks: vec![0],
        }
    }

    fn ensure_fits(&mut self, file: &mut BlockFile, field_size: u64) -> Result<()> {
        let bytes_left = BLOCK_SIZE - (self.position % BLOCK_SIZE);
        if bytes_left >= field_size + 8 {
            return Ok(());
        }

        let mut pointer = read_i64_at(file, self.position)?;
        let previous = *self.chain_blocks.last().expect("chain always has a head");
        if pointer < 0 || pointer as u64 > self.file_len || pointer < previous {
            warn!(bad_pointer = pointer, previous, "index codec: repairing out-of-range chain pointer");
            pointer = previous + BLOCK_SIZE as i64;
        }
        self.chain_blocks.push(pointer);
        self.position = pointer as u64;
        Ok(())
    }

    fn read_i32(&mut self, file: &mut BlockFile) -> Result<i32> {
        self.ensure_fits(file, 4)?;
        let v = read_i32_at(file, self.position)?;
        self.position += 4;
        Ok(v)
    }

    fn read_i64(&mut self, file: &mut BlockFile) -> Result<i64> {
        self.ensure_fits(file, 8)?;
        let v = read_i64_at(file, self.position)?;
        self.position += 8;
        Ok(v)
    }
}

pub struct IndexCodec;

impl IndexCodec {
    /// Rebuild the OID-0 chain from `index` and `free`, rewriting it at the
    /// head of the file and truncating everything past the last live data
    /// block. Callers are responsible for firing the `save_changes`
    /// callback before invoking this (see spec's callback contract).
    pub fn save_oids(index: &mut ObjectIndex, free: &mut FreeSpace, file: &mut BlockFile) -> Result<()> {
        if let Some(old_head) = index.remove(INDEX_OID) {
            free.insert_many(old_head.blocks);
        }

        if free.contains(0) {
            free.remove(0);
        } else {
            warn!("index codec: offset 0 missing from free space before rebuild");
        }

        let last_data = index.last_block_offset().max(0);
        free.drop_at_or_after(last_data + 1);

        let truncated_len = round_up_to_block((last_data + BLOCK_SIZE as i64) as u64);
        file.set_len(truncated_len)?;

        for block in index.iter_ascending_by_oid() {
            for &offset in &block.blocks {
                free.remove(offset);
            }
        }

        let mut writer = ChainWriter::new(truncated_len);

        let object_count = index.iter_non_index().count() as i32;
        writer.write_i32(file, free, object_count)?;

        let objects: Vec<ObjectBlock> = index.iter_non_index().cloned().collect();
        for obj in &objects {
            writer.write_i64(file, free, obj.oid)?;
            writer.write_i32(file, free, obj.count_bytes)?;
            writer.write_i32(file, free, obj.block_count() as i32)?;
            for &offset in &obj.blocks {
                writer.write_i64(file, free, offset)?;
            }
        }

        let free_offsets: Vec<i64> = free.iter_ascending().collect();
        writer.write_i32(file, free, free_offsets.len() as i32)?;
        for offset in free_offsets {
            writer.write_i64(file, free, offset)?;
        }

        file.flush()?;

        let chain_blocks = writer.chain_blocks;
        index.put(ObjectBlock {
            oid: INDEX_OID,
            count_bytes: (chain_blocks.len() * BLOCK_SIZE as usize) as i32,
            blocks: chain_blocks,
        });
        Ok(())
    }

    /// Populate `index` and `free` from the file. Returns the largest OID
    /// observed (the caller raises the allocator's `last_oid` watermark
    /// with it). A zero-length file yields an in-memory-only OID-0 block
    /// without growing the file, so `is_empty()` stays true on a fresh
    /// store until the first write.
    pub fn read_oids(index: &mut ObjectIndex, free: &mut FreeSpace, file: &mut BlockFile) -> Result<i64> {
        let len = file.len()?;
        if len == 0 {
            index.put(ObjectBlock {
                oid: INDEX_OID,
                count_bytes: BLOCK_SIZE as i32,
                blocks: vec![0],
            });
            return Ok(0);
        }

        let rounded = round_up_to_block(len);
        file.set_len(rounded)?;

        let mut reader = ChainReader::new(rounded);
        let object_count = reader.read_i32(file)?;
        let mut max_oid = 0i64;

        for _ in 0..object_count {
            let oid = reader.read_i64(file)?;
            let count_bytes = reader.read_i32(file)?;
            let block_count = reader.read_i32(file)?;
            let mut blocks = Vec::with_capacity(block_count.max(0) as usize);
            for _ in 0..block_count {
                let offset = reader.read_i64(file)?;
                free.remove(offset);
                blocks.push(offset);
            }
            index.put(ObjectBlock { oid, count_bytes, blocks });
            max_oid = max_oid.max(oid);
        }

        let free_count = reader.read_i32(file)?;
        for _ in 0..free_count {
            let offset = reader.read_i64(file)?;
            free.insert(offset);
        }

        let chain_blocks = reader.chain_blocks;
        index.put(ObjectBlock {
            oid: INDEX_OID,
            count_bytes: (chain_blocks.len() * BLOCK_SIZE as usize) as i32,
            blocks: chain_blocks,
        });
        Ok(max_oid)
    }
}
