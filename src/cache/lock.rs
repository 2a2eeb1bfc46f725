// src/cache/lock.rs

//! Per-coordinate exclusive locks
//!
//! Two layers guard each cache entry:
//!
//! - **In-process**: a table of slots keyed by lock file path, shared by every
//!   resolver in the process. Threads wait on a condition variable.
//! - **Cross-process**: an `flock(LOCK_EX)` on `<root>/.locks/<hash>.lock`,
//!   taken once the in-process slot is ours.
//!
//! Both waits poll the cancellation token, so a cancelled resolution never
//! blocks forever behind a slow transfer in another thread or process.
//!
//! # Example
//!
//! ```ignore
//! let lock = EntryLock::acquire(&lock_path, &cancel)?;
//! // ... check cache, download, rename into place ...
//! drop(lock);
//! ```

use crate::error::{Error, Result};
use dashmap::DashMap;
use fs2::FileExt;
use parking_lot::{Condvar, Mutex};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// How often waiters re-check cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(50);

static LOCK_TABLE: LazyLock<LockTable> = LazyLock::new(LockTable::default);

#[derive(Default)]
struct Slot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Process-wide table of in-process slots
#[derive(Default)]
struct LockTable {
    slots: DashMap<PathBuf, Arc<Slot>>,
}

impl LockTable {
    fn slot(&self, path: &Path) -> Arc<Slot> {
        self.slots
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Slot::default()))
            .clone()
    }

    /// Drop the slot once nobody but the caller references it
    ///
    /// `own` is the number of references the caller still holds.
    fn release(&self, path: &Path, own: usize) {
        self.slots.remove_if(path, |_, slot| {
            Arc::strong_count(slot) <= 1 + own && !*slot.held.lock()
        });
    }
}

/// Exclusive lock over one cache entry, released on drop
pub struct EntryLock {
    /// Kept open to hold the flock
    file: Option<File>,
    slot: Arc<Slot>,
    path: PathBuf,
}

impl EntryLock {
    /// Acquire the lock, waiting for other holders
    ///
    /// Returns `Error::Cancelled` if the token fires while waiting.
    pub fn acquire(path: &Path, cancel: &CancellationToken) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::LockFailed {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let slot = LOCK_TABLE.slot(path);
        {
            let mut held = slot.held.lock();
            while *held {
                if cancel.is_cancelled() {
                    drop(held);
                    LOCK_TABLE.release(path, 1);
                    return Err(Error::Cancelled);
                }
                trace!("Waiting for in-process lock {}", path.display());
                slot.released.wait_for(&mut held, POLL_INTERVAL);
            }
            *held = true;
        }

        // From here on Drop releases the slot, whatever happens to the flock
        let mut lock = Self {
            file: None,
            slot,
            path: path.to_path_buf(),
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|source| Error::LockFailed {
                path: path.to_path_buf(),
                source,
            })?;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == ErrorKind::WouldBlock || is_contended(&e) => {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    trace!("Waiting for file lock {}", path.display());
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(Error::LockFailed {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }

        debug!("Acquired entry lock {}", path.display());
        lock.file = Some(file);
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
        {
            let mut held = self.slot.held.lock();
            *held = false;
        }
        self.slot.released.notify_all();
        LOCK_TABLE.release(&self.path, 1);
        trace!("Released entry lock {}", self.path.display());
    }
}
