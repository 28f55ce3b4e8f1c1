//! `Allocator` — OID generation and block placement.
//!
//! Chooses offsets for new allocations by consulting [`FreeSpace`] first and
//! falling back to appending past the current end of blocks. Also tracks
//! the monotonically-advancing `last_oid` watermark.

use tracing::trace;

use crate::block_file::{round_up_to_block, BlockFile, BLOCK_SIZE, INDEX_OID};
use crate::error::{Result, StoreError};
use crate::free_space::FreeSpace;
use crate::index::ObjectIndex;

#[derive(Debug, Default)]
pub struct Allocator {
    last_oid: i64,
}

impl Allocator {
    pub fn new() -> Self {
        Self { last_oid: 0 }
    }

    pub fn last_oid(&self) -> i64 {
        self.last_oid
    }

    /// Raise `last_oid` to at least `oid`, never lowering it.
    pub fn observe_oid(&mut self, oid: i64) {
        if oid > self.last_oid {
            self.last_oid = oid;
        }
    }

    /// Claim `oid` by inserting an empty [`crate::index::ObjectBlock`] for it
    /// and raising `last_oid` to `max(last_oid, oid)`.
    pub fn reserve(&mut self, oid: i64, index: &mut ObjectIndex) -> Result<()> {
        index.insert(crate::index::ObjectBlock::empty(oid))?;
        self.observe_oid(oid);
        Ok(())
    }

    /// Generate the next OID, advancing `last_oid` and wrapping at
    /// `i64::MAX`. If the generated candidate collides with the reserved
    /// index OID (0), scan the OID space for the first unused value.
    pub fn new_oid(&mut self, index: &ObjectIndex) -> Result<i64> {
        let mut candidate = self.last_oid.wrapping_add(1);
        if candidate == i64::MAX {
            candidate = i64::MIN;
        }
        self.last_oid = candidate;

        if candidate != INDEX_OID {
            return Ok(candidate);
        }

        // Candidate collided with the reserved index OID — scan for the
        // first unused value. Per spec.md §4.4 the scan ranges are
        // [0, i64::MAX) then [i64::MIN, -1); note this leaves i64::MAX and
        // -1 themselves unscanned (see DESIGN.md).
        for oid in 0..i64::MAX {
            if !index.contains(oid) {
                self.last_oid = oid;
                return Ok(oid);
            }
        }
        for oid in i64::MIN..-1 {
            if !index.contains(oid) {
                self.last_oid = oid;
                return Ok(oid);
            }
        }
        Err(StoreError::CapacityExhausted)
    }

    /// General-case block allocation: choose `count` block offsets.
    pub fn find_new_pos(
        &mut self,
        count: usize,
        free: &mut FreeSpace,
        file: &mut BlockFile,
    ) -> Result<Vec<i64>> {
        if count == 1 && !free.is_empty() {
            let offset = free.pop_first().expect("checked non-empty above");
            trace!(offset, "allocator: reused single free block");
            return Ok(vec![offset]);
        }

        if count > free.len() {
            let len_before = file.len()? as i64;
            let result = self.append_at_end(count, file)?;
            free.drop_at_or_after(len_before);
            trace!(count, "allocator: appended at end of file");
            return Ok(result);
        }

        if let Some(run) = free.take_contiguous_run(count, BLOCK_SIZE as i64) {
            trace!(count, "allocator: found contiguous free run");
            return Ok(run);
        }

        trace!(count, "allocator: fallback to non-contiguous free offsets");
        Ok(free.take_first(count))
    }

    /// Block allocation bounded by a predecessor offset, used by
    /// `ObjectStream` when extending an object in place. Collects free
    /// offsets strictly greater than `after` first, then appends at the end
    /// of the file for any remainder.
    pub fn find_new_pos_after(
        &mut self,
        count: usize,
        after: i64,
        free: &mut FreeSpace,
        file: &mut BlockFile,
    ) -> Result<Vec<i64>> {
        let candidates: Vec<i64> = free.after(after).take(count).collect();
        for &offset in &candidates {
            free.remove(offset);
        }

        let mut result = candidates;
        if result.len() < count {
            let remaining = count - result.len();
            let len_before = file.len()? as i64;
            let mut tail = self.append_at_end(remaining, file)?;
            free.drop_at_or_after(len_before);
            result.append(&mut tail);
        }
        Ok(result)
    }

    fn append_at_end(&self, count: usize, file: &mut BlockFile) -> Result<Vec<i64>> {
        let len = file.len()?;
        let end = round_up_to_block(len).max(BLOCK_SIZE);
        let result: Vec<i64> = (0..count as u64)
            .map(|i| (end + i * BLOCK_SIZE) as i64)
            .collect();
        let new_len = end + count as u64 * BLOCK_SIZE;
        file.set_len(new_len)?;
        Ok(result)
    }
}
