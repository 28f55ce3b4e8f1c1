//! `FreeSpace` — the ordered set of known-free block offsets.
//!
//! A `BTreeSet` gives us ascending iteration and bounded range queries for
//! free, matching spec.md §4.2 exactly: every element is a non-negative
//! multiple of [`crate::block_file::BLOCK_SIZE`].

use std::collections::BTreeSet;

#[derive(Debug, Default, Clone)]
pub struct FreeSpace {
    offsets: BTreeSet<i64>,
}

impl FreeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: inserting an already-free offset is a no-op.
    pub fn insert(&mut self, offset: i64) {
        self.offsets.insert(offset);
    }

    pub fn insert_many<I: IntoIterator<Item = i64>>(&mut self, offsets: I) {
        self.offsets.extend(offsets);
    }

    pub fn remove(&mut self, offset: i64) -> bool {
        self.offsets.remove(&offset)
    }

    pub fn contains(&self, offset: i64) -> bool {
        self.offsets.contains(&offset)
    }

    pub fn pop_first(&mut self) -> Option<i64> {
        let first = *self.offsets.iter().next()?;
        self.offsets.remove(&first);
        Some(first)
    }

    pub fn first(&self) -> Option<i64> {
        self.offsets.iter().next().copied()
    }

    /// The offset at ordered position `index`, if any.
    pub fn at(&self, index: usize) -> Option<i64> {
        self.offsets.iter().nth(index).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn iter_ascending(&self) -> impl Iterator<Item = i64> + '_ {
        self.offsets.iter().copied()
    }

    /// Free offsets strictly greater than `after`, in ascending order.
    pub fn after(&self, after: i64) -> impl Iterator<Item = i64> + '_ {
        self.offsets.range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)).copied()
    }

    /// Remove every element `>= threshold`. Used when truncating the file.
    pub fn drop_at_or_after(&mut self, threshold: i64) {
        // `split_off` leaves `< threshold` in `self.offsets` and returns
        // `>= threshold`, which we simply discard.
        let _dropped = self.offsets.split_off(&threshold);
    }

    /// Remove `count` offsets forming a contiguous run (each successive
    /// offset exactly `block_size` larger than the previous), if one
    /// exists. Returns the run in ascending order.
    pub fn take_contiguous_run(&mut self, count: usize, block_size: i64) -> Option<Vec<i64>> {
        if count == 0 {
            return Some(Vec::new());
        }
        let all: Vec<i64> = self.offsets.iter().copied().collect();
        for start in 0..all.len() {
            if start + count > all.len() {
                break;
            }
            let mut ok = true;
            for i in 1..count {
                if all[start + i] != all[start + i - 1] + block_size {
                    ok = false;
                    break;
                }
            }
            if ok {
                let run: Vec<i64> = all[start..start + count].to_vec();
                for &o in &run {
                    self.offsets.remove(&o);
                }
                return Some(run);
            }
        }
        None
    }

    /// Remove and return the first `count` offsets in ascending order
    /// (used as the fallback when no contiguous run exists).
    pub fn take_first(&mut self, count: usize) -> Vec<i64> {
        let taken: Vec<i64> = self.offsets.iter().take(count).copied().collect();
        for &o in &taken {
            self.offsets.remove(&o);
        }
        taken
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_first_returns_smallest() {
        let mut fs = FreeSpace::new();
        fs.insert_many([512, 0, 256]);
        assert_eq!(fs.pop_first(), Some(0));
        assert_eq!(fs.pop_first(), Some(256));
        assert_eq!(fs.pop_first(), Some(512));
        assert_eq!(fs.pop_first(), None);
    }

    #[test]
    fn insert_is_idempotent() {
        let mut fs = FreeSpace::new();
        fs.insert(256);
        fs.insert(256);
        assert_eq!(fs.len(), 1);
    }

    #[test]
    fn drop_at_or_after_removes_tail() {
        let mut fs = FreeSpace::new();
        fs.insert_many([0, 256, 512, 768]);
        fs.drop_at_or_after(512);
        assert_eq!(fs.iter_ascending().collect::<Vec<_>>(), vec![0, 256]);
    }

    #[test]
    fn contiguous_run_preferred_over_fallback() {
        let mut fs = FreeSpace::new();
        fs.insert_many([256, 512, 1024]);
        let run = fs.take_contiguous_run(2, 256).unwrap();
        assert_eq!(run, vec![256, 512]);
        assert_eq!(fs.iter_ascending().collect::<Vec<_>>(), vec![1024]);
    }

    #[test]
    fn no_contiguous_run_returns_none() {
        let mut fs = FreeSpace::new();
        fs.insert_many([256, 1024, 2048]);
        assert!(fs.take_contiguous_run(2, 256).is_none());
        // set is untouched
        assert_eq!(fs.len(), 3);
    }

    #[test]
    fn after_bound_is_strict() {
        let mut fs = FreeSpace::new();
        fs.insert_many([0, 256, 512]);
        assert_eq!(fs.after(256).collect::<Vec<_>>(), vec![512]);
    }

    #[test]
    fn at_returns_offset_by_ordered_position() {
        let mut fs = FreeSpace::new();
        fs.insert_many([512, 0, 256]);
        assert_eq!(fs.at(0), Some(0));
        assert_eq!(fs.at(1), Some(256));
        assert_eq!(fs.at(2), Some(512));
        assert_eq!(fs.at(3), None);
    }
}
