//! Multi-way merge of the run chain.
//!
//! Each pass merges runs in batches of `fan_in`. While more runs remain than
//! one batch can take, every batch is written back to the scratch file as a
//! new run. The first batch of a pass goes past the current end of data and
//! later batches reuse the space from offset 0; when another pass follows,
//! the first batch is then copied down behind the last one so the file does
//! not keep growing. The final pass is not written: retrieval reads from its
//! merge frontier directly.

use std::cmp::Ordering;
use std::mem::size_of;

use log::{debug, info};

use super::error::{Result, SioError};
use super::scratch::{BLOCK_ALIGN, RUN_HEADER_SIZE, RunHeader, ScratchFile, align_block, opened};
use super::session::{Frontier, Session};

/// Preferred size of the output buffer of a write-back pass.
pub const MERGE_OUTPUT_SIZE: usize = 64 << 10;

/// Read state of one run in the current batch. Offsets are into the arena.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct MergeRun {
    buf: usize,
    cap: usize,
    pos: usize,
    end: usize,
    file_pos: u64,
    remaining: u64,
}

/// Bookkeeping bytes per run in a batch.
pub const MERGE_DESCRIPTOR_SIZE: usize = size_of::<MergeRun>();

/// Shape of one merge pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassPlan {
    /// Runs merged per batch.
    pub fan_in: usize,
    /// All runs fit one batch, served directly to retrieval.
    pub final_pass: bool,
    /// Bytes of each run's read buffer, a multiple of the record length.
    pub read_buffer: usize,
    /// Bytes of the output buffer; 0 on the final pass.
    pub output_buffer: usize,
}

/// Descriptors a session needs: the largest fan-in [`plan_pass`] can choose
/// for this arena.
pub(crate) fn descriptor_capacity(arena: usize, record_length: usize, max_merge: usize) -> usize {
    let per_run = record_length + MERGE_DESCRIPTOR_SIZE + size_of::<usize>();
    (arena.saturating_sub(RUN_HEADER_SIZE) / per_run)
        .min(max_merge.max(2))
        .max(2)
}

/// Plan a pass over `runs` runs with `arena` bytes of buffer space.
///
/// The fan-in is what fits in memory, capped at `max_merge` (at least 2).
/// When more than one batch is needed it is lowered while
/// `(fan_in - 1)^2 >= runs`, which evens out batch sizes.
pub fn plan_pass(arena: usize, record_length: usize, runs: usize, max_merge: usize) -> PassPlan {
    debug_assert!(runs >= 2);
    let per_run = record_length + MERGE_DESCRIPTOR_SIZE + size_of::<usize>();
    let max_merge = max_merge.max(2);
    // Output buffer of a write-back pass: at most half the arena, and never
    // so much that two read buffers no longer fit.
    let reserve = MERGE_OUTPUT_SIZE
        .min(arena / 2)
        .min(arena.saturating_sub(2 * record_length));

    let fits_all = arena.saturating_sub(RUN_HEADER_SIZE) / per_run;
    let fit = if fits_all >= runs && runs <= max_merge {
        fits_all
    } else {
        arena.saturating_sub(reserve + RUN_HEADER_SIZE) / per_run
    };
    let mut fan_in = fit.min(max_merge).max(2).min(runs);
    let final_pass = fan_in == runs;
    if !final_pass {
        while fan_in > 2 && (fan_in - 1) * (fan_in - 1) >= runs {
            fan_in -= 1;
        }
    }

    let reserved = if final_pass { 0 } else { reserve };
    let space = arena - reserved;
    let mut read_buffer = space / fan_in;
    read_buffer -= read_buffer % record_length;
    debug_assert!(read_buffer >= record_length);
    let output_buffer = if final_pass {
        0
    } else {
        // Spare bytes, in whole blocks, go to the output buffer.
        reserved + ((space - fan_in * read_buffer) & !(BLOCK_ALIGN as usize - 1))
    };
    PassPlan {
        fan_in,
        final_pass,
        read_buffer,
        output_buffer,
    }
}

/// Output buffer of a write-back batch: arena bytes `[0, cap)`.
struct Output {
    cap: usize,
    len: usize,
    file_pos: u64,
}

fn read_failed(e: std::io::Error) -> SioError {
    SioError::ScratchFileReadFailed(e)
}

fn write_failed(e: std::io::Error) -> SioError {
    SioError::ScratchFileWriteFailed(e)
}

impl Session {
    /// Merge the run chain until one batch remains, then leave that batch
    /// open as the retrieval frontier.
    pub(super) fn merge(&mut self) -> Result<()> {
        self.display.merge_started();
        info!("merge phase: {} runs", self.runs);

        let mut first_pos: u64 = 0;
        let mut file_size = self.write_pos;
        let mut pass = 0;
        loop {
            self.check_interrupt()?;
            let plan = plan_pass(self.records.len(), self.reclen, self.runs, self.max_merge);
            debug!("merge plan for {} runs: {:?}", self.runs, plan);
            self.layout_read_buffers(&plan);

            if !plan.final_pass {
                pass += 1;
                self.stats.merge_passes += 1;
                self.display.merge_pass(pass);
                info!("merge pass {}: {} runs, fan-in {}", pass, self.runs, plan.fan_in);
            }

            let batch_cap = plan.fan_in;
            let mut next_pos = first_pos;
            let mut write_pos = file_size;
            let mut last_pos = 0u64;
            let mut first_size = 0u64;
            let mut remaining = self.runs;
            let mut first_batch = true;
            let keep = usize::from(!plan.final_pass);

            while remaining > keep {
                self.check_interrupt()?;
                let fan_in = batch_cap.min(remaining);
                let mut batch_size = 0u64;
                self.merge_order.clear();
                for run in 0..fan_in {
                    let header = opened(&mut self.scratch)?.read_header(next_pos)?;
                    let desc = &mut self.merge_runs[run];
                    desc.file_pos = next_pos + RUN_HEADER_SIZE as u64;
                    desc.remaining = header.size;
                    batch_size += header.size;
                    next_pos = header.next;
                    self.refill(run)?;

                    let head = self.merge_head(run);
                    let at = self
                        .merge_order
                        .iter()
                        .position(|&o| self.cmp.compare(head, self.merge_head(o)) == Ordering::Less)
                        .unwrap_or(self.merge_order.len());
                    self.merge_order.insert(at, run);
                }
                if plan.final_pass {
                    self.frontier = Some(Frontier::Merge);
                    return Ok(());
                }

                let next = if fan_in + 1 < remaining {
                    if first_batch {
                        first_pos = 0;
                        first_size = (RUN_HEADER_SIZE as u64) + batch_size;
                    }
                    align_block(write_pos + RUN_HEADER_SIZE as u64 + batch_size)
                } else if first_batch {
                    // Only batch of the pass: it stays at the end of data.
                    first_pos = write_pos;
                    next_pos
                } else {
                    last_pos = write_pos;
                    file_size
                };
                let header = RunHeader {
                    next,
                    size: batch_size,
                };
                debug!("merged run at {}: next={} size={}", write_pos, next, batch_size);

                let mut out = Output {
                    cap: plan.output_buffer,
                    len: 0,
                    file_pos: write_pos,
                };
                self.emit_header(&mut out, header)?;
                while !self.merge_order.is_empty() {
                    let run = self.merge_order[0];
                    let src = {
                        let desc = &self.merge_runs[run];
                        desc.buf + desc.pos
                    };
                    self.emit_record(&mut out, src)?;

                    let desc = &mut self.merge_runs[run];
                    desc.pos += self.reclen;
                    if desc.pos == desc.end {
                        if desc.remaining == 0 {
                            self.merge_order.remove(0);
                            continue;
                        }
                        self.refill(run)?;
                    }
                    if self.merge_order.len() > 1 {
                        self.insert_merge();
                    }
                }
                self.flush_output(&mut out)?;

                write_pos = if first_batch {
                    0
                } else {
                    align_block(out.file_pos)
                };
                self.runs -= fan_in - 1;
                remaining -= fan_in;
                first_batch = false;
            }

            let scratch = opened(&mut self.scratch)?;
            if remaining == 1 {
                // The first batch ends the chain at `file_size`; link it to
                // the run this pass left alone.
                scratch
                    .write_at(file_size, &next_pos.to_le_bytes())
                    .map_err(write_failed)?;
            }

            if batch_cap < self.runs {
                // Another pass follows: move the first batch down behind the
                // last one written.
                scratch
                    .write_at(last_pos, &write_pos.to_le_bytes())
                    .map_err(write_failed)?;
                let chunk_cap = self.records.len();
                let mut moved = 0u64;
                while moved < first_size {
                    let n = chunk_cap.min((first_size - moved) as usize);
                    let chunk = &mut self.records[..n];
                    scratch.read_at(file_size + moved, chunk).map_err(read_failed)?;
                    scratch.write_at(write_pos, chunk).map_err(write_failed)?;
                    write_pos += n as u64;
                    moved += n as u64;
                }
                if remaining == 0 {
                    file_size = align_block(write_pos);
                }
            }
        }
    }

    /// Assign each batch slot its read buffer, taken from the top of the
    /// arena; the output buffer sits at the bottom.
    fn layout_read_buffers(&mut self, plan: &PassPlan) {
        let arena = self.records.len();
        debug_assert!(plan.fan_in <= self.merge_runs.len());
        for (i, desc) in self.merge_runs[..plan.fan_in].iter_mut().enumerate() {
            *desc = MergeRun {
                buf: arena - (i + 1) * plan.read_buffer,
                cap: plan.read_buffer,
                ..MergeRun::default()
            };
        }
    }

    /// Current record of batch slot `run`.
    #[inline]
    pub(super) fn merge_head(&self, run: usize) -> &[u8] {
        let desc = &self.merge_runs[run];
        let start = desc.buf + desc.pos;
        &self.records[start..start + self.reclen]
    }

    /// Load the next block of `run` into its read buffer.
    pub(super) fn refill(&mut self, run: usize) -> Result<()> {
        let desc = self.merge_runs[run];
        let n = (desc.cap as u64).min(desc.remaining) as usize;
        let scratch: &mut ScratchFile = opened(&mut self.scratch)?;
        scratch
            .read_at(desc.file_pos, &mut self.records[desc.buf..desc.buf + n])
            .map_err(read_failed)?;
        let desc = &mut self.merge_runs[run];
        desc.pos = 0;
        desc.end = n;
        desc.file_pos += n as u64;
        desc.remaining -= n as u64;
        Ok(())
    }

    /// Move the head of the merge order to its sorted position among the
    /// rest by binary search. Equal records order by batch slot.
    pub(super) fn insert_merge(&mut self) {
        let head = self.merge_order[0];
        let rec = self.merge_head(head);
        let at = self.merge_order[1..].partition_point(|&o| {
            match self.cmp.compare(self.merge_head(o), rec) {
                Ordering::Less => true,
                Ordering::Equal => o < head,
                Ordering::Greater => false,
            }
        });
        self.merge_order[..=at].rotate_left(1);
    }

    /// Next merged record: its arena offset, or `None` when every run of
    /// the final batch is exhausted.
    pub(super) fn next_merged(&mut self) -> Result<Option<usize>> {
        loop {
            let Some(&run) = self.merge_order.first() else {
                return Ok(None);
            };
            let desc = self.merge_runs[run];
            if desc.pos != desc.end {
                break;
            }
            if desc.remaining == 0 {
                self.merge_order.remove(0);
                continue;
            }
            self.refill(run)?;
            if self.merge_order.len() > 1 {
                self.insert_merge();
            }
        }
        let run = self.merge_order[0];
        let desc = &mut self.merge_runs[run];
        let start = desc.buf + desc.pos;
        desc.pos += self.reclen;
        // An emptied buffer is refilled on the next call, so the returned
        // record stays valid until then.
        if desc.pos != desc.end && self.merge_order.len() > 1 {
            self.insert_merge();
        }
        Ok(Some(start))
    }

    fn emit_header(&mut self, out: &mut Output, header: RunHeader) -> Result<()> {
        let bytes = header.to_bytes();
        let mut done = 0;
        while done < bytes.len() {
            let n = (bytes.len() - done).min(out.cap - out.len);
            self.records[out.len..out.len + n].copy_from_slice(&bytes[done..done + n]);
            out.len += n;
            done += n;
            if out.len == out.cap {
                self.flush_output(out)?;
            }
        }
        Ok(())
    }

    /// Append the record at arena offset `src`, flushing whenever the
    /// buffer fills. A record may straddle two flushes.
    fn emit_record(&mut self, out: &mut Output, src: usize) -> Result<()> {
        let mut src = src;
        let mut left = self.reclen;
        while left > 0 {
            let n = left.min(out.cap - out.len);
            self.records.copy_within(src..src + n, out.len);
            out.len += n;
            src += n;
            left -= n;
            if out.len == out.cap {
                self.flush_output(out)?;
            }
        }
        Ok(())
    }

    fn flush_output(&mut self, out: &mut Output) -> Result<()> {
        if out.len == 0 {
            return Ok(());
        }
        opened(&mut self.scratch)?
            .write_at(out.file_pos, &self.records[..out.len])
            .map_err(write_failed)?;
        out.file_pos += out.len as u64;
        out.len = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pass_when_everything_fits() {
        let plan = plan_pass(1 << 20, 100, 10, 34);
        assert!(plan.final_pass);
        assert_eq!(plan.fan_in, 10);
        assert_eq!(plan.output_buffer, 0);
        assert_eq!(plan.read_buffer % 100, 0);
        assert!(plan.read_buffer * 10 <= 1 << 20);
    }

    #[test]
    fn test_fan_in_capped() {
        let plan = plan_pass(64 << 20, 100, 100, 34);
        assert!(!plan.final_pass);
        // 33^2 >= 100 down to 10: 10^2 = 100 >= 100, 9^2 = 81 < 100.
        assert_eq!(plan.fan_in, 10);
        assert!(plan.output_buffer >= MERGE_OUTPUT_SIZE);
        assert!(plan.output_buffer + plan.fan_in * plan.read_buffer <= 64 << 20);
    }

    #[test]
    fn test_custom_cap_and_floor() {
        let plan = plan_pass(1 << 20, 10, 5, 3);
        assert!(!plan.final_pass);
        assert_eq!(plan.fan_in, 3);

        let plan = plan_pass(1 << 20, 10, 5, 0);
        assert_eq!(plan.fan_in, 2);
    }

    #[test]
    fn test_memory_bound_fan_in() {
        // Beside a full output buffer there is room for four 16000-byte runs.
        let arena = 2 * MERGE_OUTPUT_SIZE;
        let plan = plan_pass(arena, 16000, 100, 34);
        assert!(!plan.final_pass);
        assert_eq!(plan.fan_in, 4);
        assert_eq!(plan.read_buffer, 16000);
        assert_eq!(plan.output_buffer, MERGE_OUTPUT_SIZE);

        // Eight runs fit at once when no output buffer is needed.
        let plan = plan_pass(arena, 16000, 8, 34);
        assert!(plan.final_pass);
        assert_eq!(plan.fan_in, 8);
    }

    #[test]
    fn test_small_arena_halves_output_buffer() {
        let plan = plan_pass(52_820, 16, 40, 34);
        assert!(!plan.final_pass);
        assert_eq!(plan.fan_in, 7);
        assert!(plan.output_buffer >= 52_820 / 2);
        assert!(plan.read_buffer >= 16 * 100);
    }

    #[test]
    fn test_huge_records_split_output() {
        let plan = plan_pass(205_620, 70_000, 5, 2);
        assert_eq!(plan.fan_in, 2);
        assert_eq!(plan.read_buffer, 70_000);
        assert!(plan.output_buffer < 70_000);
    }

    #[test]
    fn test_descriptor_capacity_covers_every_plan() {
        let cases = [
            (1 << 20, 100, 34),
            (64 << 20, 100, 34),
            (2 * MERGE_OUTPUT_SIZE, 16000, 34),
            (52_820, 16, 40),
            (205_620, 70_000, 2),
            (3000, 1000, 0),
            (1 << 20, 10, usize::MAX),
        ];
        for (arena, reclen, max_merge) in cases {
            let capacity = descriptor_capacity(arena, reclen, max_merge);
            for runs in 2..300 {
                let plan = plan_pass(arena, reclen, runs, max_merge);
                assert!(
                    plan.fan_in <= capacity,
                    "arena {} reclen {} runs {}: fan-in {} > {}",
                    arena,
                    reclen,
                    runs,
                    plan.fan_in,
                    capacity
                );
            }
        }
    }

    #[test]
    fn test_descriptor_capacity_bounded_by_arena() {
        assert_eq!(descriptor_capacity(64 << 20, 100, 34), 34);
        let per_run = 10 + MERGE_DESCRIPTOR_SIZE + size_of::<usize>();
        assert_eq!(
            descriptor_capacity(1 << 20, 10, usize::MAX),
            ((1 << 20) - RUN_HEADER_SIZE) / per_run
        );
        assert_eq!(descriptor_capacity(3000, 1000, 0), 2);
    }

    #[test]
    fn test_two_runs_always_final() {
        let plan = plan_pass(3000, 1000, 2, 34);
        assert!(plan.final_pass);
        assert_eq!(plan.fan_in, 2);
        assert_eq!(plan.read_buffer, 1000);
    }
}
