//! Cooperative cross-process lock backed by a pid file.
//!
//! The lock is a sentinel file holding the decimal pid of its owner. Nothing
//! at the OS level enforces it: every writer follows the same protocol of
//! checking, claiming with an exclusive create, then reading the owner back to
//! find out whether it won the race.
//!
//! A lock whose owner is no longer running is stale and gets removed by the
//! next [`LockCoordinator::is_unlocked`] call, so a crash while holding the
//! lock does not block other writers forever.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, trace, warn};

use crate::error::KeyfreqError;
use crate::Result;

/// How long a lock file without a readable pid counts as "being claimed".
pub const DEFAULT_STALE_GRACE: Duration = Duration::from_secs(10);

/// Observed state of the lock file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No lock file
    Free,
    /// Lock file names a running process
    Held(u32),
    /// Lock file exists but has no pid yet, and is younger than the grace period
    Claiming,
    /// Owner is gone (or never wrote its pid); safe to remove
    Stale(Option<u32>),
}

/// Cross-process mutual exclusion over a single lock file.
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    path: PathBuf,
    pid: u32,
    stale_grace: Duration,
}

impl LockCoordinator {
    /// Coordinate through the lock file at `path`, as the current process.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pid: std::process::id(),
            stale_grace: DEFAULT_STALE_GRACE,
        }
    }

    /// Set how long a pid-less lock file is trusted before it counts as stale.
    pub fn stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pid written into the lock file when claiming.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Inspect the lock file without modifying it.
    pub fn state(&self) -> Result<LockState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LockState::Free),
            Err(source) => {
                return Err(KeyfreqError::FileRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match parse_pid(&content) {
            Some(pid) if process_alive(pid) => Ok(LockState::Held(pid)),
            Some(pid) => Ok(LockState::Stale(Some(pid))),
            None if self.is_young()? => Ok(LockState::Claiming),
            None => Ok(LockState::Stale(None)),
        }
    }

    /// Report whether the lock can be claimed, removing a stale lock file.
    pub fn is_unlocked(&self) -> Result<bool> {
        match self.state()? {
            LockState::Free => Ok(true),
            LockState::Held(_) | LockState::Claiming => Ok(false),
            LockState::Stale(owner) => self.remove_stale(owner),
        }
    }

    /// Try to create the lock file with our pid.
    ///
    /// Returns `false` when the file already exists. A `true` result does not
    /// mean the lock is ours yet: a concurrent stale-lock cleanup may have
    /// raced us, so callers confirm with [`owner`](Self::owner).
    pub fn claim(&self) -> Result<bool> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = write!(file, "{}", self.pid).and_then(|_| file.sync_all()) {
            // Don't leave a pid-less lock behind for others to wait out.
            let _ = fs::remove_file(&self.path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), pid = self.pid, "claimed lock");
        Ok(true)
    }

    /// Current owner pid, or `None` when the lock file is absent or unreadable.
    pub fn owner(&self) -> Option<u32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| parse_pid(&content))
    }

    /// Delete the lock file. Releasing a free lock is not an error.
    pub fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "released lock");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// One claim attempt.
    ///
    /// Fails with [`KeyfreqError::LockBusy`] if another process holds the lock
    /// or won the race for it.
    pub fn try_acquire(&self) -> Result<LockGuard<'_>> {
        if self.is_unlocked()? {
            self.claim()?;
        }

        if self.owner() == Some(self.pid) {
            Ok(LockGuard {
                lock: self,
                released: false,
            })
        } else {
            Err(KeyfreqError::LockBusy {
                path: self.path.clone(),
            })
        }
    }

    /// Poll until the lock is ours, sleeping `retry_interval` between attempts.
    ///
    /// There is no back-off and no fairness between waiters.
    pub fn acquire(&self, retry_interval: Duration) -> Result<LockGuard<'_>> {
        loop {
            match self.try_acquire() {
                Err(KeyfreqError::LockBusy { .. }) => {
                    trace!(path = %self.path.display(), "lock busy, retrying");
                    thread::sleep(retry_interval);
                }
                other => return other,
            }
        }
    }

    fn is_young(&self) -> Result<bool> {
        younger_than(&self.path, self.stale_grace)
    }

    /// Remove the lock file if it still names `expected`.
    ///
    /// The file is first renamed to a name private to this process, so two
    /// cleaners racing on the same stale lock cannot both delete: the loser
    /// either finds nothing to rename or parks the winner's fresh lock, sees a
    /// different owner, and links it back.
    fn remove_stale(&self, expected: Option<u32>) -> Result<bool> {
        let parked = self.parked_path();
        match fs::rename(&self.path, &parked) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        }

        let current = match fs::read_to_string(&parked) {
            Ok(content) => parse_pid(&content),
            Err(source) => {
                self.restore_parked(&parked)?;
                return Err(KeyfreqError::FileRead {
                    path: parked,
                    source,
                });
            }
        };
        let still_stale = match current {
            Some(_) => current == expected,
            None => expected.is_none() && !younger_than(&parked, self.stale_grace)?,
        };

        if !still_stale {
            self.restore_parked(&parked)?;
            return Ok(false);
        }

        warn!(
            path = %self.path.display(),
            owner = ?expected,
            "removing stale lock left by a process that is no longer running"
        );
        fs::remove_file(&parked)?;
        Ok(true)
    }

    /// Put a lock we parked by mistake back, unless someone claimed meanwhile.
    fn restore_parked(&self, parked: &Path) -> Result<()> {
        let restored = fs::hard_link(parked, &self.path);
        fs::remove_file(parked)?;
        match restored {
            Ok(()) => {
                debug!(
                    path = %self.path.display(),
                    "lock changed owner during cleanup, restored it"
                );
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                warn!(
                    path = %self.path.display(),
                    "lock was claimed again during cleanup, dropping the parked copy"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn parked_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}.stale", self.pid));
        PathBuf::from(name)
    }

    /// Delete the lock file only if we still own it.
    fn release_owned(&self) -> Result<()> {
        match self.owner() {
            Some(owner) if owner != self.pid => {
                warn!(
                    path = %self.path.display(),
                    owner,
                    "lock was taken over by another process, leaving it in place"
                );
                Ok(())
            }
            _ => self.release(),
        }
    }
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a LockCoordinator,
    released: bool,
}

impl LockGuard<'_> {
    /// Release now, reporting failures instead of logging them.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.lock.release_owned()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.release_owned() {
            warn!(path = %self.lock.path.display(), error = %e, "failed to release lock");
        }
    }
}

fn younger_than(path: &Path, grace: Duration) -> Result<bool> {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified,
        // Vanished between the read and the stat: whoever held it is done.
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    Ok(age < grace)
}

fn parse_pid(content: &str) -> Option<u32> {
    content.trim().parse().ok()
}

fn process_alive(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Above the kernel's PID_MAX_LIMIT, so never a running process.
    const DEAD_PID: u32 = 4_194_305;

    #[test]
    fn test_missing_lock_is_free() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));

        assert_eq!(lock.state().unwrap(), LockState::Free);
        assert!(lock.is_unlocked().unwrap());
        assert_eq!(lock.owner(), None);
    }

    #[test]
    fn test_claim_writes_pid() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));

        assert!(lock.claim().unwrap());
        assert_eq!(lock.owner(), Some(std::process::id()));
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
        assert_eq!(lock.state().unwrap(), LockState::Held(std::process::id()));

        // Exclusive create: a second claim does not overwrite
        assert!(!lock.claim().unwrap());
    }

    #[test]
    fn test_claim_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("nested/dir/store.lock"));

        assert!(lock.claim().unwrap());
        assert!(lock.path().exists());
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));

        lock.claim().unwrap();
        lock.release().unwrap();
        assert!(!lock.path().exists());
        lock.release().unwrap();
    }

    #[test]
    fn test_stale_lock_is_removed() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));
        fs::write(lock.path(), DEAD_PID.to_string()).unwrap();

        assert_eq!(lock.state().unwrap(), LockState::Stale(Some(DEAD_PID)));
        assert!(lock.is_unlocked().unwrap());
        assert!(!lock.path().exists());
    }

    fn dir_entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[cfg(unix)]
    #[test]
    fn test_late_cleaner_keeps_fresh_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lock");
        fs::write(&path, DEAD_PID.to_string()).unwrap();

        // `first` runs as a live process, `second` is another cleaner
        let first = LockCoordinator {
            path: path.clone(),
            pid: std::os::unix::process::parent_id(),
            stale_grace: DEFAULT_STALE_GRACE,
        };
        let second = LockCoordinator {
            path: path.clone(),
            pid: DEAD_PID + 1,
            stale_grace: DEFAULT_STALE_GRACE,
        };

        // Both see the same stale owner
        assert_eq!(first.state().unwrap(), LockState::Stale(Some(DEAD_PID)));
        assert_eq!(second.state().unwrap(), LockState::Stale(Some(DEAD_PID)));

        // First cleans up and takes the lock
        assert!(first.is_unlocked().unwrap());
        assert!(first.claim().unwrap());
        assert_eq!(first.owner(), Some(first.pid));

        // Second acts on what it saw earlier
        assert!(!second.remove_stale(Some(DEAD_PID)).unwrap());
        assert_eq!(first.owner(), Some(first.pid));
        assert!(matches!(
            second.try_acquire(),
            Err(KeyfreqError::LockBusy { .. })
        ));
        assert_eq!(dir_entries(dir.path()), 1);
    }

    #[test]
    fn test_cleanup_keeps_lock_being_claimed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lock");
        fs::write(&path, "").unwrap();

        let lock = LockCoordinator::new(&path).stale_grace(Duration::from_secs(3600));
        assert!(!lock.remove_stale(None).unwrap());
        assert!(path.exists());
        assert_eq!(dir_entries(dir.path()), 1);
    }

    #[test]
    fn test_stale_cleanup_leaves_no_parked_file() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));
        fs::write(lock.path(), DEAD_PID.to_string()).unwrap();

        assert!(lock.is_unlocked().unwrap());
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn test_pidless_lock_waits_for_grace_period() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.lock");
        fs::write(&path, "").unwrap();

        let patient = LockCoordinator::new(&path).stale_grace(Duration::from_secs(3600));
        assert_eq!(patient.state().unwrap(), LockState::Claiming);
        assert!(!patient.is_unlocked().unwrap());
        assert!(path.exists());

        let impatient = LockCoordinator::new(&path).stale_grace(Duration::ZERO);
        assert_eq!(impatient.state().unwrap(), LockState::Stale(None));
        assert!(impatient.is_unlocked().unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));

        {
            let _guard = lock.try_acquire().unwrap();
            assert!(lock.path().exists());
        }
        assert!(!lock.path().exists());
    }

    #[test]
    fn test_guard_explicit_release() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));

        let guard = lock.acquire(Duration::from_millis(1)).unwrap();
        guard.release().unwrap();
        assert_eq!(lock.state().unwrap(), LockState::Free);
    }

    #[test]
    fn test_acquire_through_stale_lock() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));
        fs::write(lock.path(), DEAD_PID.to_string()).unwrap();

        let guard = lock.acquire(Duration::from_millis(1)).unwrap();
        assert_eq!(lock.owner(), Some(std::process::id()));
        drop(guard);
    }

    #[cfg(unix)]
    #[test]
    fn test_live_owner_blocks() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));
        let parent = std::os::unix::process::parent_id();
        fs::write(lock.path(), parent.to_string()).unwrap();

        assert_eq!(lock.state().unwrap(), LockState::Held(parent));
        assert!(!lock.is_unlocked().unwrap());
        assert!(matches!(
            lock.try_acquire(),
            Err(KeyfreqError::LockBusy { .. })
        ));
        assert_eq!(lock.owner(), Some(parent));
    }

    #[cfg(unix)]
    #[test]
    fn test_guard_leaves_foreign_lock() {
        let dir = tempdir().unwrap();
        let lock = LockCoordinator::new(dir.path().join("store.lock"));
        let parent = std::os::unix::process::parent_id();

        let guard = lock.try_acquire().unwrap();
        fs::write(lock.path(), parent.to_string()).unwrap();
        drop(guard);

        assert_eq!(lock.owner(), Some(parent));
    }
}
