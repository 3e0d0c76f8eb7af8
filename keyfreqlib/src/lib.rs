//! # keyfreqlib
//!
//! Per-context command frequency counters, persisted to a store file that
//! several processes share.
//!
//! ## Overview
//!
//! A host (an editor, a shell, any program with named commands) counts how
//! often each action runs in each context. Counts accumulate in memory and are
//! periodically folded into a store file on disk. Several host processes may
//! save to the same store at once; a cooperative pid-file lock serializes the
//! writes and each writer reconciles with what the others wrote, so no counts
//! are lost.
//!
//! - **data**: `CounterTable` and `ExclusionFilter`
//! - **store**: lock, text codec, `MergeEngine` (load / save / merge / reset)
//! - **query**: group by action, filter by context, ranked lists
//! - **output**: table rows and a compact JSON matrix
//! - **Recorder**: owns the live table for a host process
//!
//! ## Guarantees
//!
//! - Merging is pointwise addition: commutative and associative.
//! - A lock left behind by a dead process is removed by the next writer.
//! - Stores are replaced atomically; a crash mid-write never leaves a torn file.
//! - Loading the same store twice into one table is refused instead of
//!   double counting.
//!
//! ## Example
//!
//! ```rust
//! use keyfreqlib::{group_by_action, Order, Recorder, StoreOptions, Threshold};
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let mut recorder = Recorder::new(StoreOptions::new().store(dir.path().join("keyfreq")));
//!
//! recorder.increment("text-mode", "forward-word");
//! recorder.increment("prog-mode", "forward-word");
//! recorder.increment("prog-mode", "compile");
//! recorder.save_now().unwrap();
//!
//! let snapshot = recorder.snapshot().unwrap();
//! let ranked = group_by_action(&snapshot).ranked(Order::Descending, Threshold::All);
//! assert_eq!(ranked.total, 3);
//! assert_eq!(ranked.items[0].label, "forward-word");
//! ```

pub mod data;
pub mod error;
pub mod output;
pub mod query;
pub mod recorder;
pub mod store;

pub use data::{CounterKey, CounterTable, ExclusionFilter};
pub use error::KeyfreqError;
pub use output::{FreqRow, FreqTable, MatrixExport};
pub use query::{
    filter_by_context, group_by_action, rank_table, to_ranked_list, ActionCounts, Order,
    RankedItem, RankedList, Threshold,
};
pub use recorder::Recorder;
pub use store::{LockCoordinator, MergeEngine, SaveMode, SaveOutcome, StoreOptions};

/// Result type for keyfreqlib operations
pub type Result<T> = std::result::Result<T, KeyfreqError>;
