//! Host-facing owner of the live counter table.
//!
//! A host creates one [`Recorder`] at startup and hands it to its action
//! hook, its autosave timer and its shutdown path. Increments only touch
//! memory; the store is reached through the save methods.

use crate::data::table::CounterTable;
use crate::store::engine::{MergeEngine, SaveMode, SaveOutcome};
use crate::store::options::StoreOptions;
use crate::Result;

#[derive(Debug)]
pub struct Recorder {
    table: CounterTable,
    engine: MergeEngine,
}

impl Recorder {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            table: CounterTable::new(),
            engine: MergeEngine::new(options),
        }
    }

    /// Count one action. Returns `false` if the action is excluded.
    pub fn increment(&mut self, context: &str, action: &str) -> bool {
        self.table
            .increment(context, action, self.engine.exclusions())
    }

    /// Count `count` occurrences at once. Returns `false` if the action is excluded.
    pub fn record(&mut self, context: &str, action: &str, count: u64) -> bool {
        self.table
            .record(context, action, count, self.engine.exclusions())
    }

    /// Counts not yet written to the store.
    pub fn pending(&self) -> &CounterTable {
        &self.table
    }

    pub fn engine(&self) -> &MergeEngine {
        &self.engine
    }

    /// Save if the lock is free right now; otherwise keep counting.
    pub fn autosave(&mut self) -> Result<SaveOutcome> {
        self.engine.save(&mut self.table, SaveMode::BestEffort)
    }

    /// Save, waiting for the lock as long as it takes.
    pub fn save_now(&mut self) -> Result<SaveOutcome> {
        self.engine.save(&mut self.table, SaveMode::MustSucceed)
    }

    /// Drop pending counts and delete the store.
    pub fn reset(&mut self) -> Result<()> {
        self.engine.reset(&mut self.table)
    }

    /// Pending counts plus everything persisted, for reporting.
    pub fn snapshot(&self) -> Result<CounterTable> {
        self.engine.report_snapshot(&self.table)
    }

    /// Final blocking save at shutdown.
    pub fn finish(mut self) -> Result<SaveOutcome> {
        self.save_now()
    }
}
