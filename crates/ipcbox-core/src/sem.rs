//! Counting semaphore built from filesystem locks
//!
//! A semaphore is a directory holding four entries:
//!
//! ```text
//! <sem>/
//!   waitlock   - weak mutex; the wait gate, closed while the count is exhausted
//!   countlock  - strong mutex guarding the counter
//!   owner      - strong mutex held for the semaphore's lifetime by its creator
//!   counter    - single-line decimal integer
//! ```
//!
//! Waiters block on the gate, not on the counter. Every count change happens
//! under `countlock` and leaves the gate open iff the count is positive, so the
//! gate alone decides who may proceed while the guard keeps the arithmetic
//! consistent between processes.

use crate::io::atomic::atomic_replace;
use crate::io::error::IpcError;
use crate::io::lock::{poll, LockOptions, StrongMutex, Timeout, WeakMutex};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to a semaphore namespace; cheap to construct, holds no lock itself
#[derive(Debug, Clone)]
pub struct Semaphore {
    path: PathBuf,
    waitlock: WeakMutex,
    countlock: StrongMutex,
    owner: StrongMutex,
    counter: PathBuf,
    poll_interval: Duration,
}

impl Semaphore {
    /// Address the semaphore rooted at `path`.
    pub fn new(path: impl Into<PathBuf>, options: &LockOptions) -> Self {
        let path = path.into();
        Self {
            waitlock: WeakMutex::new(path.join("waitlock"), options),
            countlock: StrongMutex::new(path.join("countlock"), options),
            owner: StrongMutex::new(path.join("owner"), options),
            counter: path.join("counter"),
            poll_interval: options.poll_interval,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Create the semaphore with `initial` available permits
    ///
    /// The caller becomes the owner; only the owner may [`destroy`](Self::destroy)
    /// it. If any step fails, the namespace is removed again.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the namespace is present, otherwise the error of
    /// the failing step.
    pub fn init(&self, initial: u32) -> Result<(), IpcError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| IpcError::io(parent, e))?;
        }

        fs::create_dir(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                IpcError::AlreadyExists {
                    path: self.path.clone(),
                }
            } else {
                IpcError::io(&self.path, e)
            }
        })?;

        let result = (|| -> Result<(), IpcError> {
            let guard = self.countlock.try_lock_guard()?;
            self.owner.try_lock()?;
            if initial == 0 {
                self.waitlock.try_lock()?;
            }
            self.write_counter(i64::from(initial))?;
            guard.release()
        })();

        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Semaphore init failed, rolling back");
            if let Err(rm) = fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %rm, "Rollback failed");
            }
            return Err(e);
        }

        debug!(path = %self.path.display(), initial, "Semaphore created");
        Ok(())
    }

    /// Remove the semaphore if this process owns it
    ///
    /// # Errors
    ///
    /// `NotOwner` without side effects if another identity created it.
    pub fn destroy(&self) -> Result<(), IpcError> {
        self.owner.unlock()?;
        fs::remove_dir_all(&self.path).map_err(|e| IpcError::io(&self.path, e))?;
        debug!(path = %self.path.display(), "Semaphore destroyed");
        Ok(())
    }

    /// Identity that created the semaphore.
    pub fn owner(&self) -> Result<String, IpcError> {
        self.owner.holder()
    }

    /// Take one permit, polling the gate until `timeout` is spent.
    pub fn wait(&self, timeout: Timeout) -> Result<(), IpcError> {
        poll(self.waitlock.path(), timeout, self.poll_interval, || {
            self.pass_gate()
        })
    }

    /// Take one permit if one is available right now.
    ///
    /// # Errors
    ///
    /// `WouldBlock` if no permit is available; the counter is not touched.
    pub fn trywait(&self) -> Result<(), IpcError> {
        match self.pass_gate()? {
            Some(()) => Ok(()),
            None => Err(IpcError::WouldBlock {
                path: self.waitlock.path().to_path_buf(),
            }),
        }
    }

    /// Return one permit, opening the gate if it was closed.
    pub fn post(&self) -> Result<(), IpcError> {
        let guard = self.countlock.lock_guard(Timeout::Infinite)?;
        let count = self.read_counter()? + 1;
        self.write_counter(count)?;
        if count > 0 {
            self.open_gate()?;
        }
        guard.release()
    }

    /// Current count, read under the guard.
    pub fn peek(&self) -> Result<i64, IpcError> {
        let guard = self.countlock.lock_guard(Timeout::Infinite)?;
        let count = self.read_counter()?;
        guard.release()?;
        Ok(count)
    }

    /// One attempt at passing the gate and taking a permit.
    ///
    /// `Ok(None)` means the gate is closed, or was passed while another
    /// waiter held the last permit; in the latter case the gate stays closed
    /// behind us and the caller polls again.
    fn pass_gate(&self) -> Result<Option<()>, IpcError> {
        match self.waitlock.try_lock() {
            Ok(()) => {}
            Err(IpcError::WouldBlock { .. }) => return Ok(None),
            Err(e) => return Err(e),
        }

        let result = self.take_permit();
        if result.is_err() {
            // Do not leave the gate shut on an error path.
            if let Err(e) = self.open_gate() {
                warn!(path = %self.waitlock.path().display(), error = %e, "Failed to reopen wait gate");
            }
        }
        result
    }

    fn take_permit(&self) -> Result<Option<()>, IpcError> {
        let guard = self.countlock.lock_guard(Timeout::Infinite)?;
        let count = self.read_counter()?;

        if count <= 0 {
            guard.release()?;
            return Ok(None);
        }

        let count = count - 1;
        self.write_counter(count)?;
        if count > 0 {
            self.open_gate()?;
        }
        guard.release()?;
        Ok(Some(()))
    }

    /// Remove the gate entry; already open is fine.
    fn open_gate(&self) -> Result<(), IpcError> {
        match self.waitlock.unlock() {
            Ok(()) | Err(IpcError::NotHeld { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn read_counter(&self) -> Result<i64, IpcError> {
        let content =
            fs::read_to_string(&self.counter).map_err(|e| IpcError::io(&self.counter, e))?;
        content
            .trim()
            .parse()
            .map_err(|_| IpcError::CorruptCounter {
                path: self.counter.clone(),
                content,
            })
    }

    fn write_counter(&self, value: i64) -> Result<(), IpcError> {
        atomic_replace(&self.counter, format!("{value}\n").as_bytes())
    }
}
