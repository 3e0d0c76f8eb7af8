//! Reporting views: group, filter, rank.
//!
//! This module turns counter tables into projections ready for
//! presentation. It provides:
//!
//! - **Options**: sort order and count threshold (`Order`, `Threshold`)
//! - **Views**: `group_by_action`, `filter_by_context`, ranked lists
//!
//! ## Example
//!
//! ```rust
//! use keyfreqlib::data::{CounterKey, CounterTable};
//! use keyfreqlib::query::{group_by_action, Order, Threshold};
//!
//! let table: CounterTable = [
//!     (CounterKey::new("mode-a", "cmd-x"), 3),
//!     (CounterKey::new("mode-b", "cmd-x"), 2),
//!     (CounterKey::new("mode-a", "cmd-y"), 1),
//! ]
//! .into_iter()
//! .collect();
//!
//! let ranked = group_by_action(&table).ranked(Order::Descending, Threshold::All);
//! assert_eq!(ranked.total, 6);
//! assert_eq!(ranked.items[0].label, "cmd-x");
//! assert_eq!(ranked.items[0].count, 5);
//! ```

pub mod options;
pub mod view;

pub use options::{Order, Threshold};
pub use view::{
    filter_by_context, group_by_action, rank_table, to_ranked_list, ActionCounts, RankedItem,
    RankedList,
};
