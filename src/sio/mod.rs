//! Memory-budgeted external sort of fixed-length records.
//!
//! Records are pushed into a [`Session`] one at a time through
//! [`Session::put_slot`] and [`Session::put_commit`]. Full buffers are sorted
//! and spilled to a scratch file as runs; [`Session::next`] then returns the
//! records in key order, merging runs as needed.

pub mod collate;
pub mod compare;
pub mod config;
pub mod display;
pub mod error;
mod ingest;
pub mod internal;
pub mod key;
mod legacy;
pub mod merge;
mod retrieve;
pub mod scratch;
pub mod session;
pub mod slot;
mod writer;


pub use self::collate::{COLLATION_SIZE, CollationTable};
pub use self::compare::{Comparator, NumClass, classify_numeric, numeric_ordinal};
pub use self::config::*;
pub use self::display::{DisplayFlags, DisplaySink};
pub use self::error::{Result, SioError};
pub use self::internal::{INSERTION_SORT_MAX, SortStrategy, sort_strategy};
pub use self::key::{KeyFlags, MAX_KEYS, SortKey};
pub use self::legacy::sort_records;
pub use self::merge::{MERGE_OUTPUT_SIZE, PassPlan, plan_pass};
pub use self::session::*;
pub use self::slot::{MAX_BUFFER_RECORDS, Slot};
