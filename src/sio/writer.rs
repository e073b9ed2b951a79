//! Run writer: applies the sorted order to the buffer and appends it to the
//! scratch file as one run.

use log::{debug, info};

use super::error::{Result, SioError};
use super::scratch::{RUN_HEADER_SIZE, RunHeader, ScratchFile, align_block, opened};
use super::session::Session;
use super::slot::Slot;

impl Session {
    /// Write the current buffer as the next run of the chain.
    pub(super) fn flush_run(&mut self) -> Result<()> {
        if self.scratch.is_none() {
            self.create_scratch()?;
        }
        if !self.sorted {
            self.apply_order();
        }
        self.display.writing();
        info!("writing run {} ({} records)", self.runs + 1, self.reccnt);

        let size = self.reccnt * self.reclen;
        let header = RunHeader {
            next: align_block(self.write_pos + (RUN_HEADER_SIZE + size) as u64),
            size: size as u64,
        };
        debug!(
            "run header at {}: next={} size={}",
            self.write_pos, header.next, header.size
        );
        let scratch = opened(&mut self.scratch)?;
        scratch.write_header(self.write_pos, header)?;
        scratch
            .write_at(self.write_pos + RUN_HEADER_SIZE as u64, &self.records[..size])
            .map_err(SioError::ScratchFileWriteFailed)?;
        self.write_pos = header.next;
        self.runs += 1;
        self.stats.runs_written += 1;

        if self.runs == 1 {
            // Keep the first record: slot 0 is handed out again before
            // retrieval may need this run from memory.
            let spare = self.geometry.max_records * self.reclen;
            self.records.copy_within(0..self.reclen, spare);
        }
        Ok(())
    }

    fn create_scratch(&mut self) -> Result<()> {
        let scratch = ScratchFile::create(&self.working_dir, self.work_filename.as_deref())?;
        let name = scratch.path().display().to_string();
        self.display.created_work_file(&name);
        info!("created work file {}", name);
        self.scratch = Some(scratch);
        Ok(())
    }

    /// Rearrange buffered records into permutation-table order, one cycle
    /// at a time, using the spare slot past the buffer as the only extra
    /// storage. Leaves the table as the identity.
    pub(super) fn apply_order(&mut self) {
        let reclen = self.reclen;
        let spare = self.reccnt * reclen;
        for start in 0..self.reccnt {
            if self.order[start].index() == start {
                continue;
            }
            self.records
                .copy_within(start * reclen..(start + 1) * reclen, spare);
            let mut dst = start;
            loop {
                let src = self.order[dst].index();
                self.order[dst] = Slot::new(dst);
                if src == start {
                    self.records.copy_within(spare..spare + reclen, dst * reclen);
                    break;
                }
                self.records
                    .copy_within(src * reclen..(src + 1) * reclen, dst * reclen);
                dst = src;
            }
        }
    }
}
