//! Load, reconcile and write stores under the store lock.
//!
//! A save cycle is: take the lock, load the current default store into the
//! table being saved (picking up whatever other processes wrote since), write
//! the sum back, clear the table, release the lock. Loading is additive, so a
//! store must be loaded at most once into a table per cycle; the table's load
//! guard enforces that.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::data::exclusion::ExclusionFilter;
use crate::data::table::CounterTable;
use crate::error::KeyfreqError;
use crate::Result;

use super::codec;
use super::lock::LockCoordinator;
use super::options::StoreOptions;

/// What to do when the lock is held by someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Poll until the lock is ours
    #[default]
    MustSucceed,
    /// Give up immediately and keep the table for a later attempt
    BestEffort,
}

/// Result of a save that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Nothing to save; the store and lock were not touched
    Skipped,
    /// Lock was busy in best-effort mode; the table is unchanged
    Deferred,
    /// Store replaced with this many distinct records
    Written { records: usize },
}

impl SaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SaveOutcome::Written { .. })
    }
}

/// Orchestrates load/merge/write cycles against a default store.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    store_path: PathBuf,
    lock: LockCoordinator,
    retry_interval: Duration,
    exclusions: ExclusionFilter,
}

impl MergeEngine {
    pub fn new(options: StoreOptions) -> Self {
        let lock = LockCoordinator::new(options.resolved_lock_path())
            .stale_grace(options.stale_grace);
        Self {
            store_path: options.store_path,
            lock,
            retry_interval: options.retry_interval,
            exclusions: options.exclusions,
        }
    }

    /// Path of the default store.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    pub fn exclusions(&self) -> &ExclusionFilter {
        &self.exclusions
    }

    /// Add the counts persisted at `source` into `table`.
    ///
    /// Excluded actions are dropped. A missing file is an empty store. A
    /// corrupt store fails as a whole and leaves `table` untouched. Returns
    /// the number of records merged.
    pub fn load(&self, table: &mut CounterTable, source: &Path) -> Result<usize> {
        if table.has_loaded(source) {
            return Err(KeyfreqError::DuplicateLoad {
                path: source.to_path_buf(),
            });
        }

        let bytes = match fs::read(source) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %source.display(), "no store yet, nothing to load");
                return Ok(0);
            }
            Err(source_err) => {
                return Err(KeyfreqError::FileRead {
                    path: source.to_path_buf(),
                    source: source_err,
                })
            }
        };

        let content = String::from_utf8(bytes).map_err(|e| {
            let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
            KeyfreqError::CorruptStore {
                path: source.to_path_buf(),
                line: valid.iter().filter(|b| **b == b'\n').count() + 1,
                message: "invalid UTF-8".to_string(),
            }
        })?;
        let records = codec::decode(&content).map_err(|e| e.into_store_error(source))?;
        table.mark_loaded(source)?;

        let mut merged = 0;
        let mut dropped = 0;
        for (key, count) in records {
            if self.exclusions.is_excluded(&key.action) {
                dropped += 1;
                continue;
            }
            table.add(key, count);
            merged += 1;
        }

        debug!(path = %source.display(), merged, dropped, "loaded store");
        Ok(merged)
    }

    /// Save `table` into the default store, reconciling with its content.
    pub fn save(&self, table: &mut CounterTable, mode: SaveMode) -> Result<SaveOutcome> {
        let destination = self.store_path.clone();
        self.save_to(table, mode, &destination)
    }

    /// Save `table` to `destination`.
    ///
    /// When `destination` is the default store, its current content is
    /// loaded into `table` first. Any other destination is overwritten with
    /// exactly the content of `table`.
    ///
    /// Once the lock is held, the table is cleared and the lock released
    /// whether or not the write succeeds. A failed write therefore loses the
    /// table's counts; the error is returned so the caller knows.
    pub fn save_to(
        &self,
        table: &mut CounterTable,
        mode: SaveMode,
        destination: &Path,
    ) -> Result<SaveOutcome> {
        if table.is_empty() {
            return Ok(SaveOutcome::Skipped);
        }

        let guard = match mode {
            SaveMode::MustSucceed => self.lock.acquire(self.retry_interval)?,
            SaveMode::BestEffort => match self.lock.try_acquire() {
                Ok(guard) => guard,
                Err(KeyfreqError::LockBusy { .. }) => {
                    debug!(path = %self.lock.path().display(), "lock busy, deferring save");
                    return Ok(SaveOutcome::Deferred);
                }
                Err(e) => return Err(e),
            },
        };

        if destination == self.store_path {
            // Nothing has been written yet, so the table stays as it was.
            self.load(table, destination)?;
        }

        let records = table.len();
        let written = write_store(destination, table);
        table.clear();
        let released = guard.release();

        if let Err(e) = written {
            warn!(path = %destination.display(), error = %e, "store write failed, counts dropped");
            return Err(e);
        }
        released?;

        debug!(path = %destination.display(), records, "wrote store");
        Ok(SaveOutcome::Written { records })
    }

    /// Write the sum of the stores at `first` and `second` to `destination`.
    ///
    /// Missing sources count as empty. If both are empty nothing is written.
    pub fn merge_stores(
        &self,
        first: &Path,
        second: &Path,
        destination: &Path,
    ) -> Result<SaveOutcome> {
        let mut table = CounterTable::new();
        self.load(&mut table, first)?;
        self.load(&mut table, second)?;
        self.save_to(&mut table, SaveMode::MustSucceed, destination)
    }

    /// Clear `table` and delete the default store under the lock.
    pub fn reset(&self, table: &mut CounterTable) -> Result<()> {
        table.clear();
        let guard = self.lock.acquire(self.retry_interval)?;

        let removed = match fs::remove_file(&self.store_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeyfreqError::Io(e)),
        };
        let released = guard.release();

        removed?;
        released?;
        debug!(path = %self.store_path.display(), "reset store");
        Ok(())
    }

    /// Live counts plus the persisted default store, for reporting.
    ///
    /// Stores are replaced by rename, so reading needs no lock.
    pub fn report_snapshot(&self, table: &CounterTable) -> Result<CounterTable> {
        let mut snapshot = table.snapshot();
        self.load(&mut snapshot, &self.store_path)?;
        Ok(snapshot)
    }
}

/// Replace `destination` atomically with the encoded table.
fn write_store(destination: &Path, table: &CounterTable) -> Result<()> {
    let failure = |source: io::Error| KeyfreqError::WriteFailure {
        path: destination.to_path_buf(),
        source,
    };

    let dir = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(failure)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(failure)?;
    tmp.write_all(codec::encode(table.iter()).as_bytes())
        .map_err(failure)?;
    tmp.as_file().sync_all().map_err(failure)?;
    tmp.persist(destination).map_err(|e| failure(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::CounterKey;
    use tempfile::{tempdir, TempDir};

    fn engine_in(dir: &TempDir) -> MergeEngine {
        MergeEngine::new(
            StoreOptions::new()
                .store(dir.path().join("keyfreq"))
                .retry_interval(Duration::from_millis(5)),
        )
    }

    fn table(entries: &[(&str, &str, u64)]) -> CounterTable {
        entries
            .iter()
            .map(|(m, c, n)| (CounterKey::new(*m, *c), *n))
            .collect()
    }

    fn read_store(path: &Path) -> CounterTable {
        codec::decode(&fs::read_to_string(path).unwrap())
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_load_missing_store() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let mut live = table(&[("m", "c", 1)]);

        assert_eq!(engine.load(&mut live, engine.store_path()).unwrap(), 0);
        assert_eq!(live, table(&[("m", "c", 1)]));
        // A missing store is not remembered as loaded
        assert!(!live.has_loaded(engine.store_path()));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let original = table(&[("mode-a", "cmd-x", 3), ("mode-b", "cmd-x", 2)]);
        let mut live = original.clone();

        let outcome = engine.save(&mut live, SaveMode::MustSucceed).unwrap();
        assert_eq!(outcome, SaveOutcome::Written { records: 2 });
        assert!(live.is_empty());
        assert!(!engine.lock().path().exists());

        let mut fresh = CounterTable::new();
        engine.load(&mut fresh, engine.store_path()).unwrap();
        assert_eq!(fresh, original);
    }

    #[test]
    fn test_save_empty_is_skipped() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let mut live = CounterTable::new();

        let outcome = engine.save(&mut live, SaveMode::MustSucceed).unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped);
        assert!(!engine.store_path().exists());
        assert!(!engine.lock().path().exists());
    }

    #[test]
    fn test_save_reconciles_with_store() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.store_path(), "(\n((m . c) . 2)\n)\n").unwrap();

        let mut live = table(&[("m", "c", 3), ("m", "d", 1)]);
        engine.save(&mut live, SaveMode::BestEffort).unwrap();

        assert_eq!(
            read_store(engine.store_path()),
            table(&[("m", "c", 5), ("m", "d", 1)])
        );
        assert_eq!(
            fs::read_to_string(engine.store_path()).unwrap(),
            "(\n((m . c) . 5)\n((m . d) . 1)\n)\n"
        );
    }

    #[test]
    fn test_load_twice_is_refused() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.store_path(), "(((m . c) . 2))").unwrap();

        let mut live = CounterTable::new();
        engine.load(&mut live, engine.store_path()).unwrap();
        let err = engine.load(&mut live, engine.store_path()).unwrap_err();

        assert!(matches!(err, KeyfreqError::DuplicateLoad { .. }));
        assert_eq!(live.get("m", "c"), 2);
    }

    #[test]
    fn test_save_after_manual_load_is_refused() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.store_path(), "(((m . c) . 2))").unwrap();

        let mut live = CounterTable::new();
        engine.load(&mut live, engine.store_path()).unwrap();
        let err = engine.save(&mut live, SaveMode::MustSucceed).unwrap_err();

        assert!(matches!(err, KeyfreqError::DuplicateLoad { .. }));
        assert_eq!(live.get("m", "c"), 2);
        assert!(!engine.lock().path().exists());
    }

    #[test]
    fn test_load_drops_excluded_actions() {
        let dir = tempdir().unwrap();
        let engine = MergeEngine::new(
            StoreOptions::new()
                .store(dir.path().join("keyfreq"))
                .exclusions(ExclusionFilter::new().action("self-insert-command")),
        );
        fs::write(
            engine.store_path(),
            "(\n((text-mode . self-insert-command) . 900)\n((text-mode . undo) . 4)\n)\n",
        )
        .unwrap();

        let mut live = CounterTable::new();
        assert_eq!(engine.load(&mut live, engine.store_path()).unwrap(), 1);
        assert_eq!(live, table(&[("text-mode", "undo", 4)]));

        // The next save purges the excluded history from the store
        let mut live = table(&[("text-mode", "undo", 1)]);
        engine.save(&mut live, SaveMode::MustSucceed).unwrap();
        assert_eq!(
            read_store(engine.store_path()),
            table(&[("text-mode", "undo", 5)])
        );
    }

    #[test]
    fn test_corrupt_store() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let corrupt = "(\n((m . c) . 2)\n((m . d";
        fs::write(engine.store_path(), corrupt).unwrap();

        let mut live = table(&[("m", "c", 1)]);
        let err = engine.load(&mut live, engine.store_path()).unwrap_err();
        assert!(matches!(err, KeyfreqError::CorruptStore { line: 3, .. }));
        assert_eq!(live, table(&[("m", "c", 1)]));

        // Saving keeps the table and the corrupt store as they are
        let err = engine.save(&mut live, SaveMode::MustSucceed).unwrap_err();
        assert!(matches!(err, KeyfreqError::CorruptStore { .. }));
        assert_eq!(live, table(&[("m", "c", 1)]));
        assert_eq!(fs::read_to_string(engine.store_path()).unwrap(), corrupt);
        assert!(!engine.lock().path().exists());
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.store_path(), b"(\n((m . \xff\xfe) . 1)\n)\n").unwrap();

        let mut live = table(&[("m", "c", 1)]);
        let err = engine.load(&mut live, engine.store_path()).unwrap_err();
        assert!(matches!(err, KeyfreqError::CorruptStore { line: 2, .. }));
        assert_eq!(live, table(&[("m", "c", 1)]));
    }

    #[test]
    fn test_load_huge_duplicates_saturates() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(
            engine.store_path(),
            "(((m . c) . 18446744073709551615) ((m . c) . 1))",
        )
        .unwrap();

        let mut live = CounterTable::new();
        engine.load(&mut live, engine.store_path()).unwrap();
        assert_eq!(live.get("m", "c"), u64::MAX);
        assert_eq!(live.total(), u64::MAX);
    }

    #[test]
    fn test_merge_stores() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&a, "(((m . c) . 2))").unwrap();
        fs::write(&b, "(((m . c) . 3) ((n . c) . 1))").unwrap();

        let outcome = engine.merge_stores(&a, &b, &c).unwrap();
        assert_eq!(outcome, SaveOutcome::Written { records: 2 });
        assert_eq!(read_store(&c), table(&[("m", "c", 5), ("n", "c", 1)]));
        // Sources are left alone
        assert_eq!(read_store(&a), table(&[("m", "c", 2)]));
    }

    #[test]
    fn test_merge_stores_missing_sources() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let a = dir.path().join("a");
        let c = dir.path().join("c");
        fs::write(&a, "(((m . c) . 2))").unwrap();

        engine
            .merge_stores(&a, &dir.path().join("missing"), &c)
            .unwrap();
        assert_eq!(read_store(&c), table(&[("m", "c", 2)]));

        let outcome = engine
            .merge_stores(&dir.path().join("x"), &dir.path().join("y"), &c)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Skipped);
    }

    #[test]
    fn test_merge_stores_same_source_spelled_differently() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let a = dir.path().join("a");
        let c = dir.path().join("c");
        fs::write(&a, "(((m . c) . 2))").unwrap();

        let err = engine
            .merge_stores(&a, &dir.path().join(".").join("a"), &c)
            .unwrap_err();
        assert!(matches!(err, KeyfreqError::DuplicateLoad { .. }));
        assert!(!c.exists());
    }

    #[test]
    fn test_save_to_alternate_overwrites() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let other = dir.path().join("other");
        fs::write(&other, "(((old . stuff) . 10))").unwrap();

        let mut live = table(&[("m", "c", 1)]);
        engine
            .save_to(&mut live, SaveMode::MustSucceed, &other)
            .unwrap();
        assert_eq!(read_store(&other), table(&[("m", "c", 1)]));
    }

    #[test]
    fn test_write_failure_clears_and_releases() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let mut live = table(&[("m", "c", 1)]);
        let err = engine
            .save_to(&mut live, SaveMode::MustSucceed, &blocker.join("store"))
            .unwrap_err();

        assert!(matches!(err, KeyfreqError::WriteFailure { .. }));
        assert!(live.is_empty());
        assert!(!engine.lock().path().exists());
    }

    #[test]
    fn test_save_through_stale_lock() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.lock().path(), "4194305").unwrap();

        let mut live = table(&[("m", "c", 1)]);
        let outcome = engine.save(&mut live, SaveMode::BestEffort).unwrap();
        assert!(outcome.is_written());
        assert!(!engine.lock().path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_best_effort_defers_on_busy_lock() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        let parent = std::os::unix::process::parent_id();
        fs::write(engine.lock().path(), parent.to_string()).unwrap();

        let mut live = table(&[("m", "c", 1)]);
        let outcome = engine.save(&mut live, SaveMode::BestEffort).unwrap();

        assert_eq!(outcome, SaveOutcome::Deferred);
        assert_eq!(live, table(&[("m", "c", 1)]));
        assert!(!engine.store_path().exists());
        assert_eq!(engine.lock().owner(), Some(parent));
    }

    #[test]
    fn test_reset() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.store_path(), "(((m . c) . 2))").unwrap();

        let mut live = table(&[("m", "c", 1)]);
        engine.reset(&mut live).unwrap();
        assert!(live.is_empty());
        assert!(!engine.store_path().exists());
        assert!(!engine.lock().path().exists());

        // Resetting without a store is fine too
        engine.reset(&mut live).unwrap();
    }

    #[test]
    fn test_report_snapshot() {
        let dir = tempdir().unwrap();
        let engine = engine_in(&dir);
        fs::write(engine.store_path(), "(((m . c) . 2))").unwrap();

        let live = table(&[("m", "c", 1), ("m", "d", 1)]);
        let snapshot = engine.report_snapshot(&live).unwrap();

        assert_eq!(snapshot, table(&[("m", "c", 3), ("m", "d", 1)]));
        assert_eq!(live, table(&[("m", "c", 1), ("m", "d", 1)]));
        // Repeated reports never double count
        assert_eq!(engine.report_snapshot(&live).unwrap(), snapshot);
    }
}
