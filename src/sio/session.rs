//! Session lifecycle: sizing, allocation, failure handling and teardown.
//!
//! A [`Session`] owns every resource of one sort: the record arena, the
//! permutation table, the merge descriptors and the scratch file. It is not
//! `Send` (the display sink is a plain boxed closure), so a sort runs on the
//! thread that created it; use an [`InterruptHandle`] to stop it from
//! elsewhere.

use std::mem::size_of;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};

use super::compare::Comparator;
use super::config::{DEFAULT_MEMORY_BUDGET, SessionConfig};
use super::display::{Display, DisplaySink};
use super::error::{Result, SioError};
use super::key::validate_keys;
use super::merge::{MERGE_DESCRIPTOR_SIZE, MERGE_OUTPUT_SIZE, MergeRun, descriptor_capacity};
use super::scratch::{RUN_HEADER_SIZE, ScratchFile};
use super::slot::{MAX_BUFFER_RECORDS, Slot};
use crate::common::io_error_msg;

/// Budget reduction per failed allocation attempt.
const SHRINK_STEP: usize = 8 << 10;

/// Per-record bookkeeping: one permutation slot, plus one classification
/// byte when any key is numeric.
#[inline]
pub fn record_overhead(numeric: bool) -> usize {
    size_of::<Slot>() + usize::from(numeric)
}

/// Smallest budget a session accepts: two records with their bookkeeping
/// and merge descriptors, plus one merge output buffer.
#[inline]
pub fn minimum_budget(record_length: usize, numeric: bool) -> usize {
    2 * (record_length + MERGE_DESCRIPTOR_SIZE + record_overhead(numeric)) + MERGE_OUTPUT_SIZE
}

/// How a memory budget is split between records and bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferGeometry {
    pub budget: usize,
    pub record_length: usize,
    /// Bookkeeping bytes per buffered record.
    pub overhead: usize,
    /// Records per in-memory run.
    pub max_records: usize,
    /// Bytes of the record arena. Holds `max_records + 1` records during
    /// input and every merge buffer afterwards.
    pub arena_len: usize,
}

impl BufferGeometry {
    /// Split `budget` (raised to the minimum if needed).
    pub fn for_budget(record_length: usize, numeric: bool, budget: usize) -> Self {
        let overhead = record_overhead(numeric);
        let budget = budget.max(minimum_budget(record_length, numeric));
        let usable = budget - RUN_HEADER_SIZE;
        let max_records = (usable / (record_length + overhead) - 1).min(MAX_BUFFER_RECORDS - 1);
        BufferGeometry {
            budget,
            record_length,
            overhead,
            max_records,
            arena_len: usable - max_records * overhead,
        }
    }
}

/// Buffers allocated for a session.
struct Buffers {
    geometry: BufferGeometry,
    records: Vec<u8>,
    order: Vec<Slot>,
    numclass: Vec<u8>,
    merge_runs: Vec<MergeRun>,
    merge_order: Vec<usize>,
}

impl Buffers {
    fn try_allocate(geometry: BufferGeometry, numeric: bool, max_merge: usize) -> Option<Buffers> {
        let mut records = Vec::new();
        records.try_reserve_exact(geometry.arena_len).ok()?;
        records.resize(geometry.arena_len, 0);

        let mut order = Vec::new();
        order.try_reserve_exact(geometry.max_records).ok()?;

        let mut numclass = Vec::new();
        if numeric {
            numclass.try_reserve_exact(geometry.max_records).ok()?;
            numclass.resize(geometry.max_records, 0);
        }
        let descriptors = descriptor_capacity(geometry.arena_len, geometry.record_length, max_merge);
        let mut merge_runs = Vec::new();
        merge_runs.try_reserve_exact(descriptors).ok()?;
        merge_runs.resize(descriptors, MergeRun::default());
        let mut merge_order = Vec::new();
        merge_order.try_reserve_exact(descriptors).ok()?;

        Some(Buffers {
            geometry,
            records,
            order,
            numclass,
            merge_runs,
            merge_order,
        })
    }

    /// Allocate for `budget`, shrinking on failure until the minimum.
    fn allocate(
        record_length: usize,
        numeric: bool,
        budget: usize,
        max_merge: usize,
    ) -> Result<Buffers> {
        let minimum = minimum_budget(record_length, numeric);
        let mut budget = if budget == 0 {
            DEFAULT_MEMORY_BUDGET
        } else {
            budget
        }
        .max(minimum);
        loop {
            let geometry = BufferGeometry::for_budget(record_length, numeric, budget);
            if let Some(buffers) = Self::try_allocate(geometry, numeric, max_merge) {
                return Ok(buffers);
            }
            debug!("allocation of {} bytes failed, shrinking", budget);
            match budget.checked_sub(SHRINK_STEP) {
                Some(b) if b >= minimum => budget = b,
                _ => return Err(SioError::OutOfMemory),
            }
        }
    }
}

/// Stops a running session from any thread or signal context.
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_interrupted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counters describing the work a session has done.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Records committed.
    pub records_in: u64,
    /// Records handed out by `next`.
    pub records_out: u64,
    /// Runs written to the scratch file during input.
    pub runs_written: usize,
    /// Internal sorts performed. Stays 0 for input already in order.
    pub internal_sorts: usize,
    /// Merge passes that wrote back to the scratch file.
    pub merge_passes: usize,
}

/// Where retrieval reads the next record from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Frontier {
    /// Position in the permutation table of the in-memory buffer.
    Memory { next: usize },
    /// Head of the final merge.
    Merge,
}

/// One external sort.
pub struct Session {
    pub(super) reclen: usize,
    pub(super) cmp: Comparator,
    pub(super) display: Display,
    pub(super) geometry: BufferGeometry,
    pub(super) records: Vec<u8>,
    pub(super) order: Vec<Slot>,
    pub(super) numclass: Vec<u8>,
    /// Records in the current buffer.
    pub(super) reccnt: usize,
    /// The current buffer was committed in key order.
    pub(super) sorted: bool,
    /// Runs in the scratch file chain.
    pub(super) runs: usize,
    pub(super) scratch: Option<ScratchFile>,
    pub(super) write_pos: u64,
    pub(super) working_dir: PathBuf,
    pub(super) work_filename: Option<PathBuf>,
    pub(super) max_merge: usize,
    pub(super) merge_runs: Vec<MergeRun>,
    pub(super) merge_order: Vec<usize>,
    pub(super) frontier: Option<Frontier>,
    interrupt: InterruptHandle,
    pub(super) stats: SortStats,
    last_error: String,
    closed: bool,
}

impl Session {
    /// Validate `config`, size and allocate buffers, and enter the input
    /// phase.
    pub fn init(config: SessionConfig, sink: Option<DisplaySink>) -> Result<Session> {
        let mut display = Display::new(config.display, sink);
        let numeric = config.keys.iter().any(|k| k.flags.is_numeric());
        let max_merge = config.max_merge.max(2);

        let buffers = validate_keys(&config.keys, config.record_length)
            .and_then(|()| {
                Buffers::allocate(
                    config.record_length,
                    numeric,
                    config.memory_budget,
                    max_merge,
                )
            });
        let buffers = match buffers {
            Ok(b) => b,
            Err(e) => {
                let msg = e.to_string();
                error!("{}", msg);
                display.error(&msg);
                return Err(e);
            }
        };

        let geometry = buffers.geometry;
        debug!(
            "buffer geometry: budget={} record_length={} max_records={} arena={}",
            geometry.budget, geometry.record_length, geometry.max_records, geometry.arena_len
        );
        display.started(geometry.budget);
        info!("input phase");

        Ok(Session {
            reclen: config.record_length,
            cmp: Comparator::new(config.keys, config.collation),
            display,
            geometry,
            records: buffers.records,
            order: buffers.order,
            numclass: buffers.numclass,
            reccnt: 0,
            sorted: true,
            runs: 0,
            scratch: None,
            write_pos: 0,
            working_dir: config.working_dir.unwrap_or_else(|| PathBuf::from(".")),
            work_filename: config.work_filename,
            max_merge,
            merge_runs: buffers.merge_runs,
            merge_order: buffers.merge_order,
            frontier: None,
            interrupt: InterruptHandle::default(),
            stats: SortStats::default(),
            last_error: String::new(),
            closed: false,
        })
    }

    /// Release buffers and delete the scratch file. Idempotent; also run on
    /// drop.
    pub fn exit(&mut self) {
        if self.closed {
            return;
        }
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                warn!(
                    "unable to delete work file {}: {}",
                    path.display(),
                    io_error_msg(&e)
                );
                self.display.delete_failed(e.raw_os_error().unwrap_or(0));
            }
        }
        self.display.close();
        self.records = Vec::new();
        self.order = Vec::new();
        self.numclass = Vec::new();
        self.merge_runs = Vec::new();
        self.merge_order = Vec::new();
        self.frontier = None;
        self.closed = true;
    }

    /// Alias of [`exit`](Self::exit) for interrupt paths.
    pub fn kill(&mut self) {
        self.exit();
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Message of the most recent failure; empty if none.
    pub fn last_error_string(&self) -> &str {
        &self.last_error
    }

    pub fn stats(&self) -> SortStats {
        self.stats
    }

    pub fn geometry(&self) -> BufferGeometry {
        self.geometry
    }

    pub fn record_length(&self) -> usize {
        self.reclen
    }

    /// Records held by one in-memory run.
    pub fn max_records(&self) -> usize {
        self.geometry.max_records
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Path of the scratch file once it exists.
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|s| s.path())
    }

    pub(super) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(SioError::Interrupted)
        } else {
            Ok(())
        }
    }

    pub(super) fn check_interrupt(&self) -> Result<()> {
        if self.interrupt.is_interrupted() {
            Err(SioError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Record and report a failure, then tear the session down.
    pub(super) fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let msg = e.to_string();
            error!("{}", msg);
            self.display.error(&msg);
            self.last_error = msg;
            self.exit();
        }
        result
    }

    #[inline]
    pub(super) fn record_at(&self, index: usize) -> &[u8] {
        let start = index * self.reclen;
        &self.records[start..start + self.reclen]
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overhead() {
        assert_eq!(record_overhead(false), 4);
        assert_eq!(record_overhead(true), 5);
    }

    #[test]
    fn test_geometry_default_budget() {
        let g = BufferGeometry::for_budget(100, false, DEFAULT_MEMORY_BUDGET);
        assert_eq!(g.budget, 2 << 20);
        assert_eq!(g.max_records, ((2 << 20) - 16) / 104 - 1);
        assert_eq!(g.arena_len, (2 << 20) - 16 - g.max_records * 4);
        assert!(g.arena_len >= (g.max_records + 1) * 100);
    }

    #[test]
    fn test_geometry_raises_to_minimum() {
        let min = minimum_budget(10, true);
        let g = BufferGeometry::for_budget(10, true, 1);
        assert_eq!(g.budget, min);
        assert!(g.max_records >= 1);
        assert!(g.arena_len >= (g.max_records + 1) * 10);
    }

    #[test]
    fn test_geometry_large_records() {
        let g = BufferGeometry::for_budget(1 << 20, false, 0);
        assert!(g.max_records >= 1);
        assert!(g.arena_len >= 2 * (1 << 20));
    }

    #[test]
    fn test_merge_descriptors_allocated_up_front() {
        let b = Buffers::allocate(100, false, 0, 34).unwrap();
        assert_eq!(b.merge_runs.len(), 34);
        assert!(b.merge_order.capacity() >= 34);

        // An unbounded cap is limited by what the arena can feed.
        let b = Buffers::allocate(100, false, 0, usize::MAX).unwrap();
        let limit = descriptor_capacity(b.geometry.arena_len, 100, usize::MAX);
        assert_eq!(b.merge_runs.len(), limit);
        assert!(limit < b.geometry.arena_len / 100);
    }

    #[test]
    fn test_interrupt_handle_shared() {
        let h = InterruptHandle::default();
        let h2 = h.clone();
        assert!(!h.is_interrupted());
        std::thread::spawn(move || h2.interrupt()).join().unwrap();
        assert!(h.is_interrupted());
    }
}
