//! Persistence: lock, codec and merge engine.
//!
//! This module moves counts between the in-memory table and the shared store
//! file. It provides:
//!
//! - **LockCoordinator**: pid-file lock with stale-owner cleanup
//! - **Codec**: line-oriented text encoding of (key, count) records
//! - **MergeEngine**: load / reconcile / write cycles, store merging, reset
//! - **StoreOptions**: paths, retry interval, exclusions
//!
//! ## Example
//!
//! ```rust
//! use keyfreqlib::data::CounterTable;
//! use keyfreqlib::store::{MergeEngine, SaveMode, StoreOptions};
//! use keyfreqlib::ExclusionFilter;
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let engine = MergeEngine::new(StoreOptions::new().store(dir.path().join("keyfreq")));
//!
//! let mut table = CounterTable::new();
//! table.increment("text-mode", "undo", &ExclusionFilter::new());
//! engine.save(&mut table, SaveMode::MustSucceed).unwrap();
//! assert!(table.is_empty());
//!
//! let mut fresh = CounterTable::new();
//! engine.load(&mut fresh, engine.store_path()).unwrap();
//! assert_eq!(fresh.get("text-mode", "undo"), 1);
//! ```

pub mod codec;
pub mod engine;
pub mod lock;
pub mod options;

pub use codec::{decode, encode, DecodeError, Record};
pub use engine::{MergeEngine, SaveMode, SaveOutcome};
pub use lock::{LockCoordinator, LockGuard, LockState, DEFAULT_STALE_GRACE};
pub use options::{
    default_store_path, lock_path_for, StoreOptions, DEFAULT_RETRY_INTERVAL, DEFAULT_STORE_NAME,
};
