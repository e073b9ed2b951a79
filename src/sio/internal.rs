//! In-memory sort of the permutation table.
//!
//! Sorting proceeds one key byte at a time. Large groups are split by a
//! counting pass over the current byte (256 buckets, scattered in place by a
//! cycle walk); groups at or below [`INSERTION_SORT_MAX`] records are
//! finished by insertion sort, which compares all remaining key bytes at
//! once. A group whose records all share the current byte stays open and is
//! revisited at the next byte, then the next key.

use std::cmp::Ordering;

use super::compare::{Comparator, NumClass, classify_numeric};
use super::slot::Slot;

/// Largest group finished by insertion sort.
pub const INSERTION_SORT_MAX: usize = 48;

/// Algorithm used for one group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortStrategy {
    Insertion,
    Distribution,
}

/// Choose the algorithm for a group of `len` records.
#[inline]
pub fn sort_strategy(len: usize) -> SortStrategy {
    if len <= INSERTION_SORT_MAX {
        SortStrategy::Insertion
    } else {
        SortStrategy::Distribution
    }
}

pub(crate) struct InternalSort<'a> {
    records: &'a [u8],
    reclen: usize,
    order: &'a mut [Slot],
    /// Numeric classification per record index, filled when a numeric key
    /// is first partitioned. Empty when no key is numeric.
    numclass: &'a mut [u8],
    cmp: &'a Comparator,
    key: usize,
    pos: usize,
    count: [usize; 256],
}

impl<'a> InternalSort<'a> {
    pub(crate) fn new(
        records: &'a [u8],
        reclen: usize,
        order: &'a mut [Slot],
        numclass: &'a mut [u8],
        cmp: &'a Comparator,
    ) -> Self {
        InternalSort {
            records,
            reclen,
            order,
            numclass,
            cmp,
            key: 0,
            pos: 0,
            count: [0; 256],
        }
    }

    /// Sort the whole table across every key. On return the table is a
    /// permutation of `0..len` with all boundary tags cleared.
    pub(crate) fn run(mut self) {
        let n = self.order.len();
        let keys = self.cmp.keys();
        if n < 2 || keys.is_empty() {
            return;
        }

        self.key = 0;
        self.pos = keys[0].start;
        self.order[n - 1] = self.order[n - 1].with_boundary();
        self.sort_range(0, n - 1);
        self.pos += 1;

        'keys: loop {
            while self.pos < keys[self.key].end {
                let mut open = false;
                let mut i = 0;
                while i < n {
                    if self.order[i].is_boundary() {
                        i += 1;
                        continue;
                    }
                    let lo = i;
                    while !self.order[i].is_boundary() {
                        i += 1;
                    }
                    self.sort_range(lo, i);
                    open = true;
                    i += 1;
                }
                if !open {
                    break 'keys;
                }
                self.pos += 1;
            }
            self.key += 1;
            if self.key == keys.len() {
                break;
            }
            self.pos = keys[self.key].start;
        }

        for slot in self.order.iter_mut() {
            *slot = slot.without_boundary();
        }
    }

    /// Sort positions `lo..=hi` at the current key byte.
    pub(crate) fn sort_range(&mut self, lo: usize, hi: usize) {
        match sort_strategy(hi - lo + 1) {
            SortStrategy::Insertion => self.insertion_sort(lo, hi),
            SortStrategy::Distribution => self.distribution_sort(lo, hi),
        }
    }

    #[inline]
    fn record(&self, index: usize) -> &'a [u8] {
        let start = index * self.reclen;
        &self.records[start..start + self.reclen]
    }

    #[inline]
    fn bucket_of(&self, index: usize) -> usize {
        let class = if self.numclass.is_empty() {
            NumClass::Normal
        } else {
            NumClass::from_u8(self.numclass[index])
        };
        let byte = self.records[index * self.reclen + self.pos];
        self.cmp.bucket(self.key, byte, class)
    }

    /// Stable insertion sort on all remaining key bytes. Every position of
    /// the range is settled afterwards.
    fn insertion_sort(&mut self, lo: usize, hi: usize) {
        self.order[hi] = self.order[hi].without_boundary();
        for i2 in (lo..hi).rev() {
            let cur = self.order[i2];
            let cur_rec = self.record(cur.index());
            let mut i1 = i2;
            while i1 < hi {
                let next = self.order[i1 + 1];
                let ord = self
                    .cmp
                    .compare_from(cur_rec, self.record(next.index()), self.key, self.pos);
                if ord != Ordering::Greater {
                    break;
                }
                self.order[i1] = next;
                i1 += 1;
            }
            self.order[i1] = cur;
        }
        for slot in &mut self.order[lo..=hi] {
            *slot = slot.with_boundary();
        }
    }

    /// Counting partition on the current key byte. Each resulting bucket
    /// ends with a boundary tag.
    fn distribution_sort(&mut self, lo: usize, hi: usize) {
        debug_assert!(lo < hi);
        self.order[hi] = self.order[hi].without_boundary();

        let key = &self.cmp.keys()[self.key];
        if key.flags.is_numeric() && self.pos == key.start {
            for i in lo..=hi {
                let r = self.order[i].index();
                let field = &self.record(r)[key.start..key.end];
                self.numclass[r] = classify_numeric(field) as u8;
            }
        }

        let mut last = 0;
        for i in lo..=hi {
            last = self.bucket_of(self.order[i].index());
            self.count[last] += 1;
        }
        if self.count[last] == hi - lo + 1 {
            // One bucket only: the group stays open for the next byte.
            self.count[last] = 0;
            self.order[hi] = self.order[hi].with_boundary();
            return;
        }

        let mut address = lo;
        let mut used = [0u8; 256];
        let mut nonzero = 0;
        for b in 0..256 {
            let n = self.count[b];
            if n != 0 {
                self.count[b] = address;
                address += n;
                used[nonzero] = b as u8;
                nonzero += 1;
            }
        }

        // Scatter by following permutation cycles. Placed entries carry the
        // boundary tag so the walk stops when it returns to the vacated slot.
        for i in lo..=hi {
            if self.order[i].is_boundary() {
                continue;
            }
            let mut pointer = self.order[i];
            self.order[i] = Slot::HOLE;
            while !pointer.is_boundary() {
                let b = self.bucket_of(pointer.index());
                let address = self.count[b];
                self.count[b] += 1;
                let displaced = self.order[address];
                self.order[address] = pointer.with_boundary();
                pointer = displaced;
            }
        }

        for slot in &mut self.order[lo..=hi] {
            *slot = slot.without_boundary();
        }
        for &b in &used[..nonzero] {
            let b = b as usize;
            let end = self.count[b] - 1;
            self.count[b] = 0;
            self.order[end] = self.order[end].with_boundary();
        }
    }
}
