//! Core counter data structures.
//!
//! A [`CounterTable`] maps a (context, action) pair to the number of times the
//! action ran while the host was in that context. Tables only ever grow:
//! merging is pointwise addition, which makes it commutative and associative,
//! so tables loaded from different stores can be combined in any order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KeyfreqError;
use crate::Result;

use super::exclusion::ExclusionFilter;

/// Key of a counter: the context an action ran in, and the action itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    /// Operating context (e.g. an editing mode)
    pub context: String,
    /// Action identifier (e.g. a command name)
    pub action: String,
}

impl CounterKey {
    pub fn new(context: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.context, self.action)
    }
}

/// Additive map from [`CounterKey`] to a count.
///
/// Besides the counts, a table remembers which stores have been loaded into
/// it since it was last cleared. Loading is additive, so loading the same
/// store twice would double count; [`CounterTable::mark_loaded`] refuses that.
/// The guard is not part of equality.
#[derive(Debug, Clone, Default)]
pub struct CounterTable {
    counts: BTreeMap<CounterKey, u64>,
    loaded: BTreeSet<PathBuf>,
}

impl CounterTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `action` in `context`.
    ///
    /// Returns `false` without touching the table when the action is excluded.
    pub fn increment(
        &mut self,
        context: &str,
        action: &str,
        exclusions: &ExclusionFilter,
    ) -> bool {
        self.record(context, action, 1, exclusions)
    }

    /// Count `count` occurrences of `action` in `context` at once.
    pub fn record(
        &mut self,
        context: &str,
        action: &str,
        count: u64,
        exclusions: &ExclusionFilter,
    ) -> bool {
        if exclusions.is_excluded(action) {
            return false;
        }
        self.add(CounterKey::new(context, action), count);
        true
    }

    /// Add `count` to the counter for `key`. Counters saturate at `u64::MAX`.
    pub fn add(&mut self, key: CounterKey, count: u64) {
        let slot = self.counts.entry(key).or_default();
        *slot = slot.saturating_add(count);
    }

    /// Add every counter of `other` into this table. `other` is left as is.
    pub fn merge(&mut self, other: &CounterTable) {
        for (key, count) in &other.counts {
            let slot = self.counts.entry(key.clone()).or_default();
            *slot = slot.saturating_add(*count);
        }
    }

    /// Copy of the counts, detached from the live table.
    ///
    /// The copy starts with no loaded sources, so a store may be merged into
    /// it for reporting even if the live table already reconciled with it.
    pub fn snapshot(&self) -> CounterTable {
        CounterTable {
            counts: self.counts.clone(),
            loaded: BTreeSet::new(),
        }
    }

    /// Drop all counts and forget loaded sources.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.loaded.clear();
    }

    /// Count for one (context, action) pair, 0 if never seen.
    pub fn get(&self, context: &str, action: &str) -> u64 {
        self.counts
            .get(&CounterKey::new(context, action))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts, saturating.
    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |total, count| total.saturating_add(*count))
    }

    /// Iterate over (key, count) pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&CounterKey, u64)> + '_ {
        self.counts.iter().map(|(k, c)| (k, *c))
    }

    /// Record that `source` has been merged into this table.
    ///
    /// Fails with [`KeyfreqError::DuplicateLoad`] if it already was since the
    /// last [`clear`](Self::clear). Existing files are compared by their
    /// canonical path, so `a` and `./a` are the same source.
    pub fn mark_loaded(&mut self, source: &Path) -> Result<()> {
        if !self.loaded.insert(canonical(source)) {
            return Err(KeyfreqError::DuplicateLoad {
                path: source.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Whether `source` has been merged into this table since the last clear.
    pub fn has_loaded(&self, source: &Path) -> bool {
        self.loaded.contains(&canonical(source))
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl PartialEq for CounterTable {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
    }
}

impl Eq for CounterTable {}

impl AddAssign<&CounterTable> for CounterTable {
    fn add_assign(&mut self, other: &CounterTable) {
        self.merge(other);
    }
}

impl Add for CounterTable {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self.merge(&other);
        self
    }
}

impl Extend<(CounterKey, u64)> for CounterTable {
    fn extend<I: IntoIterator<Item = (CounterKey, u64)>>(&mut self, iter: I) {
        for (key, count) in iter {
            self.add(key, count);
        }
    }
}

/// Duplicate keys are summed.
impl FromIterator<(CounterKey, u64)> for CounterTable {
    fn from_iter<I: IntoIterator<Item = (CounterKey, u64)>>(iter: I) -> Self {
        let mut table = CounterTable::new();
        table.extend(iter);
        table
    }
}
