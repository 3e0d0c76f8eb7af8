//! Store location and locking configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::data::exclusion::ExclusionFilter;

use super::lock::DEFAULT_STALE_GRACE;

/// File name of the default store, placed in the home directory.
pub const DEFAULT_STORE_NAME: &str = ".keyfreq";

/// Pause between lock attempts of a blocking save.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Options for a [`MergeEngine`](super::engine::MergeEngine).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Default store; saves to it reconcile with its current content first
    pub store_path: PathBuf,
    /// Lock file (defaults to the store path with `.lock` appended)
    pub lock_path: Option<PathBuf>,
    /// Sleep between attempts when a save must succeed
    pub retry_interval: Duration,
    /// How long a lock file without a pid is trusted
    pub stale_grace: Duration,
    /// Actions dropped when loading stores
    pub exclusions: ExclusionFilter,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            lock_path: None,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            stale_grace: DEFAULT_STALE_GRACE,
            exclusions: ExclusionFilter::new(),
        }
    }
}

impl StoreOptions {
    /// Create new default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default store path.
    pub fn store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Set an explicit lock file path.
    pub fn lock(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    /// Set the retry interval of blocking saves.
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the grace period for pid-less lock files.
    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    /// Set the exclusion filter.
    pub fn exclusions(mut self, exclusions: ExclusionFilter) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Effective lock file path.
    pub fn resolved_lock_path(&self) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| lock_path_for(&self.store_path))
    }
}

/// `$HOME/.keyfreq`, or `./.keyfreq` when there is no home directory.
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_STORE_NAME)
}

/// Lock file used for a store: the store path with `.lock` appended.
pub fn lock_path_for(store: &Path) -> PathBuf {
    let mut path = OsString::from(store.as_os_str());
    path.push(".lock");
    PathBuf::from(path)
}
