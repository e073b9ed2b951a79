//! Record input: slot hand-out, commit, and in-order detection.

use std::cmp::Ordering;

use log::info;

use super::error::Result;
use super::internal::InternalSort;
use super::session::Session;
use super::slot::Slot;

impl Session {
    /// Writable window for the next record. Fill it, then call
    /// [`put_commit`](Self::put_commit); an uncommitted slot is overwritten
    /// by the next call.
    ///
    /// # Panics
    ///
    /// Panics if the session has been torn down.
    pub fn put_slot(&mut self) -> &mut [u8] {
        let start = self.reccnt * self.reclen;
        &mut self.records[start..start + self.reclen]
    }

    /// Accept the record written through [`put_slot`](Self::put_slot).
    /// Flushes a run to the scratch file when the buffer is full.
    pub fn put_commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.commit_record();
        self.check(result)
    }

    fn commit_record(&mut self) -> Result<()> {
        self.check_interrupt()?;
        debug_assert!(self.frontier.is_none(), "put_commit after retrieval began");

        if self.sorted && self.reccnt > 0 {
            let cur = self.record_at(self.reccnt);
            let prev = self.record_at(self.reccnt - 1);
            if self.cmp.compare(cur, prev) == Ordering::Less {
                self.sorted = false;
            }
        }
        self.order.push(Slot::new(self.reccnt));
        self.reccnt += 1;
        self.stats.records_in += 1;

        if self.reccnt == self.geometry.max_records {
            if !self.sorted {
                self.sort_buffer();
            }
            self.flush_run()?;
            self.reset_buffer();
            self.display.input_phase(self.runs + 1);
        }
        Ok(())
    }

    /// Sort the permutation table of the current buffer.
    pub(super) fn sort_buffer(&mut self) {
        self.display.sorting(self.reccnt);
        info!("sorting {} records", self.reccnt);
        self.stats.internal_sorts += 1;
        InternalSort::new(
            &self.records,
            self.reclen,
            &mut self.order,
            &mut self.numclass,
            &self.cmp,
        )
        .run();
    }

    pub(super) fn reset_buffer(&mut self) {
        self.order.clear();
        self.reccnt = 0;
        self.sorted = true;
    }
}
