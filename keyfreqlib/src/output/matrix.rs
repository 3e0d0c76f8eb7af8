//! Compact matrix shape for JSON export.
//!
//! Contexts and actions are listed once each and counts refer to them by
//! index. Indices follow sorted order, so exporting the same table twice
//! yields the same document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::table::CounterTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixExport {
    /// Sum of all counts
    pub total: u64,
    pub contexts: Vec<String>,
    pub actions: Vec<String>,
    /// `(context index, action index, count)` in key order
    pub counts: Vec<(usize, usize, u64)>,
}

impl MatrixExport {
    pub fn from_table(table: &CounterTable) -> Self {
        let contexts = index(table.iter().map(|(k, _)| k.context.as_str()));
        let actions = index(table.iter().map(|(k, _)| k.action.as_str()));

        let counts = table
            .iter()
            .map(|(key, count)| {
                (
                    contexts[key.context.as_str()],
                    actions[key.action.as_str()],
                    count,
                )
            })
            .collect();

        MatrixExport {
            total: table.total(),
            contexts: contexts.keys().map(|s| s.to_string()).collect(),
            actions: actions.keys().map(|s| s.to_string()).collect(),
            counts,
        }
    }
}

/// Assign each distinct name its position in sorted order.
fn index<'a>(names: impl Iterator<Item = &'a str>) -> BTreeMap<&'a str, usize> {
    let mut indices: BTreeMap<&str, usize> = names.map(|n| (n, 0)).collect();
    for (i, slot) in indices.values_mut().enumerate() {
        *slot = i;
    }
    indices
}
