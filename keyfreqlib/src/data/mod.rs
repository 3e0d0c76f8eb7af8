//! In-memory counters and the exclusion filter applied to them.
//!
//! This is the part of the library the host touches on every action:
//!
//! - **CounterTable**: additive (context, action) → count map
//! - **ExclusionFilter**: actions that are never counted
//!
//! ## Example
//!
//! ```rust
//! use keyfreqlib::data::{CounterTable, ExclusionFilter};
//!
//! let exclusions = ExclusionFilter::new().action("self-insert-command");
//! let mut table = CounterTable::new();
//! table.increment("text-mode", "forward-word", &exclusions);
//! table.increment("text-mode", "self-insert-command", &exclusions);
//! assert_eq!(table.total(), 1);
//! ```

pub mod exclusion;
pub mod table;

pub use exclusion::ExclusionFilter;
pub use table::{CounterKey, CounterTable};
