//! Sorted output.

use log::info;

use super::error::Result;
use super::session::{Frontier, Session};
use super::slot::Slot;

impl Session {
    /// Next record in sorted order, or `None` once every record has been
    /// returned. The first call ends the input phase.
    ///
    /// The returned slice is valid until the next call.
    pub fn next(&mut self) -> Result<Option<&[u8]>> {
        self.ensure_open()?;
        if self.frontier.is_none() {
            let started = self.start_output();
            self.check(started)?;
        }
        let found = self.next_offset();
        match self.check(found)? {
            Some(start) => {
                self.stats.records_out += 1;
                Ok(Some(&self.records[start..start + self.reclen]))
            }
            None => Ok(None),
        }
    }

    fn start_output(&mut self) -> Result<()> {
        self.check_interrupt()?;
        if self.reccnt > 0 {
            if !self.sorted {
                self.sort_buffer();
            }
            if self.runs > 0 {
                self.flush_run()?;
            }
        }

        if self.runs > 1 {
            self.merge()?;
        } else {
            if self.runs == 1 {
                // Exactly one full buffer: it was written sorted and is still
                // in memory, except slot 0, which was saved past the end.
                let max_records = self.geometry.max_records;
                self.order.clear();
                self.order.push(Slot::new(max_records));
                self.order.extend((1..max_records).map(Slot::new));
                self.reccnt = max_records;
            }
            self.frontier = Some(Frontier::Memory { next: 0 });
        }

        self.display.output_phase();
        info!("output phase");
        Ok(())
    }

    /// Arena offset of the next record.
    fn next_offset(&mut self) -> Result<Option<usize>> {
        self.check_interrupt()?;
        match self.frontier {
            Some(Frontier::Memory { next }) => {
                if next >= self.reccnt {
                    return Ok(None);
                }
                self.frontier = Some(Frontier::Memory { next: next + 1 });
                Ok(Some(self.order[next].index() * self.reclen))
            }
            Some(Frontier::Merge) => self.next_merged(),
            None => Ok(None),
        }
    }
}
