//! Table-ready frequency data.
//!
//! `FreqTable` can be handed to a template or serialized to JSON as is.
//! Every value is already a display string.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::query::view::RankedList;

/// A single row in the table (data row or footer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqRow {
    /// Times the action ran
    pub count: String,
    /// Share of the total, e.g. "12.50%"
    pub percent: String,
    /// Action (or "context action") label
    pub label: String,
}

/// Table-ready frequency data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Column headers: count, percentage, label
    pub headers: Vec<String>,
    pub rows: Vec<FreqRow>,
    /// Total row; always covers every entry, even ones below the threshold
    pub footer: FreqRow,
}

impl FreqTable {
    /// Format a ranked list.
    pub fn from_ranked<K: Display>(list: &RankedList<K>) -> Self {
        let rows = list
            .items
            .iter()
            .map(|item| FreqRow {
                count: item.count.to_string(),
                percent: format_percent(item.count, list.total),
                label: item.label.to_string(),
            })
            .collect();

        let footer = FreqRow {
            count: list.total.to_string(),
            percent: format_percent(list.total, list.total),
            label: "Total".to_string(),
        };

        FreqTable {
            title: None,
            headers: vec![
                "Times".to_string(),
                "Percentage".to_string(),
                "Command".to_string(),
            ],
            rows,
            footer,
        }
    }

    /// Set a title shown above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

fn format_percent(count: u64, total: u64) -> String {
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", count as f64 * 100.0 / total as f64)
}
