//! Reporting projections over a counter table.
//!
//! Views never mutate their input: reporting runs over a snapshot while the
//! live table keeps counting. The pipeline is:
//! 1. CounterTable (live counts, usually unioned with the store)
//! 2. ActionCounts (context collapsed or selected)
//! 3. RankedList (filtered, sorted, with the unfiltered total)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::table::{CounterKey, CounterTable};

use super::options::{Order, Threshold};

/// Counts keyed by action alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    counts: BTreeMap<String, u64>,
}

impl ActionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to `action`.
    pub fn add(&mut self, action: &str, count: u64) {
        let slot = self.counts.entry(action.to_string()).or_default();
        *slot = slot.saturating_add(count);
    }

    /// Pointwise sum with `other`.
    pub fn merge(&mut self, other: &ActionCounts) {
        for (action, count) in &other.counts {
            self.add(action, *count);
        }
    }

    pub fn get(&self, action: &str) -> u64 {
        self.counts.get(action).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |total, count| total.saturating_add(*count))
    }

    /// Iterate in action order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.counts.iter().map(|(a, c)| (a.as_str(), *c))
    }

    /// Rank actions by count.
    pub fn ranked(&self, order: Order, threshold: Threshold) -> RankedList<String> {
        to_ranked_list(
            self.counts.iter().map(|(a, c)| (a.clone(), *c)),
            order,
            threshold,
        )
    }
}

impl FromIterator<(String, u64)> for ActionCounts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut counts = ActionCounts::new();
        for (action, count) in iter {
            counts.add(&action, count);
        }
        counts
    }
}

/// Sum counts per action across all contexts.
pub fn group_by_action(table: &CounterTable) -> ActionCounts {
    let mut grouped = ActionCounts::new();
    for (key, count) in table.iter() {
        grouped.add(&key.action, count);
    }
    grouped
}

/// Counts per action for one context only.
pub fn filter_by_context(table: &CounterTable, context: &str) -> ActionCounts {
    let mut filtered = ActionCounts::new();
    for (key, count) in table.iter().filter(|(k, _)| k.context == context) {
        filtered.add(&key.action, count);
    }
    filtered
}

/// Rank every (context, action) pair of a table.
pub fn rank_table(
    table: &CounterTable,
    order: Order,
    threshold: Threshold,
) -> RankedList<CounterKey> {
    to_ranked_list(
        table.iter().map(|(k, c)| (k.clone(), c)),
        order,
        threshold,
    )
}

/// One ranked entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem<K> {
    pub label: K,
    pub count: u64,
}

/// Entries that passed the threshold, in the requested order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedList<K> {
    /// Sum of every entry's count, including entries filtered out
    pub total: u64,
    pub items: Vec<RankedItem<K>>,
    pub order: Order,
    pub threshold: Threshold,
}

/// Build a ranked list from (label, count) entries.
///
/// Ties keep their input order.
pub fn to_ranked_list<K, I>(entries: I, order: Order, threshold: Threshold) -> RankedList<K>
where
    I: IntoIterator<Item = (K, u64)>,
{
    let mut total: u64 = 0;
    let mut items: Vec<RankedItem<K>> = entries
        .into_iter()
        .inspect(|(_, count)| total = total.saturating_add(*count))
        .filter(|(_, count)| threshold.accepts(*count))
        .map(|(label, count)| RankedItem { label, count })
        .collect();

    match order {
        Order::Descending => items.sort_by(|a, b| b.count.cmp(&a.count)),
        Order::Ascending => items.sort_by(|a, b| a.count.cmp(&b.count)),
        Order::Unsorted => {}
    }

    RankedList {
        total,
        items,
        order,
        threshold,
    }
}
