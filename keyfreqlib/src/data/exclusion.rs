//! Action exclusion with exact names and glob patterns.
//!
//! Excluded actions are dropped both when the live table is incremented and
//! when persisted records are loaded, so adding an action here also purges
//! its history from the store on the next save.

use std::collections::BTreeSet;

use glob::Pattern;

use crate::error::KeyfreqError;
use crate::Result;

/// Set of action identifiers (and patterns) to ignore.
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    /// Exact action identifiers to ignore
    pub actions: BTreeSet<String>,
    /// Glob patterns matched against the whole action identifier
    pub patterns: Vec<Pattern>,
}

impl ExclusionFilter {
    /// Create an empty filter (nothing excluded).
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude a single action by exact identifier.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Exclude several actions by exact identifier.
    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    /// Exclude every action matching a glob pattern.
    pub fn pattern(mut self, pattern: &str) -> Result<Self> {
        let pat = Pattern::new(pattern).map_err(|e| KeyfreqError::InvalidGlob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.patterns.push(pat);
        Ok(self)
    }

    /// Add multiple glob patterns.
    pub fn patterns_many(mut self, patterns: &[&str]) -> Result<Self> {
        for pattern in patterns {
            self = self.pattern(pattern)?;
        }
        Ok(self)
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.patterns.is_empty()
    }

    /// Check whether an action should be ignored.
    pub fn is_excluded(&self, action: &str) -> bool {
        if self.actions.contains(action) {
            return true;
        }
        self.patterns.iter().any(|p| p.matches(action))
    }
}
