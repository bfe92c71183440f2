//! Per-session read tracking and per-path write serialization.
//!
//! Every tool that overwrites an existing file runs its
//! assert/read/replace/write sequence inside [`AccessGuard::with_exclusive`]
//! so concurrent mutations of the same path cannot interleave. The read
//! ledger enforces the other half of the discipline: a file must have been
//! read in the current session, and must not have changed on disk since, or
//! the edit is refused.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum AccessError {
    #[error("{path} has not been read in this session; read the file before overwriting it")]
    NotRead { path: PathBuf },

    #[error(
        "{path} was modified at {modified:?}, after it was last read at {last_read:?}; read the file again before editing it"
    )]
    Stale {
        path: PathBuf,
        modified: SystemTime,
        last_read: SystemTime,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tracks per-session read times and serializes mutations per path.
///
/// One guard instance belongs to one project context; nothing here is global,
/// so unrelated projects in the same process never share edit state.
#[derive(Default)]
pub struct AccessGuard {
    reads: Mutex<HashMap<(String, PathBuf), SystemTime>>,
    locks: Mutex<HashMap<PathBuf, LockEntry>>,
}

struct LockEntry {
    lock: Arc<PathLock>,
    users: usize,
}

/// FIFO ticket lock: tickets are issued in arrival order and served in the
/// same order, so queued operations on one path never overtake each other.
#[derive(Default)]
struct PathLock {
    tickets: Mutex<TicketState>,
    turn: Condvar,
}

#[derive(Default)]
struct TicketState {
    next: u64,
    serving: u64,
}

impl AccessGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `session` has just observed the current content of `path`.
    /// Called on every successful read and after every successful write.
    pub fn record_read(&self, session: &str, path: &Path) {
        trace!(session, path = %path.display(), "recording read");
        lock(&self.reads).insert((session.to_owned(), path.to_path_buf()), SystemTime::now());
    }

    /// Timestamp of the session's last recorded read of `path`, if any.
    pub fn last_read(&self, session: &str, path: &Path) -> Option<SystemTime> {
        lock(&self.reads)
            .get(&(session.to_owned(), path.to_path_buf()))
            .copied()
    }

    /// Refuse to proceed if the session has never read `path`, or if the file
    /// changed on disk after the last recorded read.
    pub fn assert_fresh(&self, session: &str, path: &Path) -> Result<(), AccessError> {
        let Some(last_read) = self.last_read(session, path) else {
            return Err(AccessError::NotRead {
                path: path.to_path_buf(),
            });
        };
        let modified = std::fs::metadata(path)?.modified()?;
        if modified > last_read {
            debug!(path = %path.display(), "file changed on disk since last read");
            return Err(AccessError::Stale {
                path: path.to_path_buf(),
                modified,
                last_read,
            });
        }
        Ok(())
    }

    /// Run `op` while holding the exclusive slot for `path`.
    ///
    /// Operations on one path run strictly in arrival order, one at a time;
    /// operations on distinct paths proceed independently. The slot is
    /// released even if `op` panics.
    pub fn with_exclusive<T>(&self, path: &Path, op: impl FnOnce() -> T) -> T {
        let _slot = self.acquire(path);
        op()
    }

    /// Number of paths with a live lock entry. Entries are reclaimed as soon
    /// as the last queued operation finishes, so an idle guard reports zero.
    pub fn active_locks(&self) -> usize {
        lock(&self.locks).len()
    }

    fn acquire(&self, path: &Path) -> ExclusiveSlot<'_> {
        let path_lock = {
            let mut locks = lock(&self.locks);
            let entry = locks.entry(path.to_path_buf()).or_insert_with(|| LockEntry {
                lock: Arc::new(PathLock::default()),
                users: 0,
            });
            entry.users += 1;
            Arc::clone(&entry.lock)
        };

        let mut state = lock(&path_lock.tickets);
        let ticket = state.next;
        state.next += 1;
        while state.serving != ticket {
            state = path_lock
                .turn
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(state);
        trace!(path = %path.display(), ticket, "acquired exclusive slot");

        ExclusiveSlot {
            guard: self,
            path: path.to_path_buf(),
            lock: path_lock,
        }
    }
}

/// Holds the exclusive slot for one path; releasing advances the queue and
/// reclaims the arena entry once nobody is waiting.
struct ExclusiveSlot<'a> {
    guard: &'a AccessGuard,
    path: PathBuf,
    lock: Arc<PathLock>,
}

impl Drop for ExclusiveSlot<'_> {
    fn drop(&mut self) {
        lock(&self.lock.tickets).serving += 1;
        self.lock.turn.notify_all();

        let mut locks = lock(&self.guard.locks);
        if let Some(entry) = locks.get_mut(&self.path) {
            entry.users -= 1;
            if entry.users == 0 {
                locks.remove(&self.path);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
