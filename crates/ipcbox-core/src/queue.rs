//! FIFO queue over a line-oriented text store
//!
//! # Directory Structure
//!
//! ```text
//! <queue>/
//!   mutex   - strong mutex guarding `data`
//!   sem/    - semaphore counting unconsumed items
//!   data    - one item per line, oldest first
//! ```
//!
//! Producers append under `mutex` and then post `sem` once. Consumers wait on
//! `sem` first, so `get` only touches `data` when an item is known to exist.
//! Dequeue rewrites the remainder of the store through a temp file and
//! rename.

use crate::io::atomic::{append_line, atomic_replace};
use crate::io::error::IpcError;
use crate::io::lock::{LockOptions, StrongMutex, Timeout};
use crate::sem::Semaphore;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Handle to a queue namespace
#[derive(Debug, Clone)]
pub struct Queue {
    path: PathBuf,
    mutex: StrongMutex,
    sem: Semaphore,
    data: PathBuf,
}

impl Queue {
    pub fn new(path: impl Into<PathBuf>, options: &LockOptions) -> Self {
        let path = path.into();
        Self {
            mutex: StrongMutex::new(path.join("mutex"), options),
            sem: Semaphore::new(path.join("sem"), options),
            data: path.join("data"),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Create an empty queue owned by this process.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the namespace is present. A failed semaphore init
    /// removes the namespace again.
    pub fn init(&self) -> Result<(), IpcError> {
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

        if let Err(e) = self.sem.init(0) {
            if let Err(rm) = fs::remove_dir_all(&self.path) {
                warn!(path = %self.path.display(), error = %rm, "Rollback failed");
            }
            return Err(e);
        }

        debug!(path = %self.path.display(), "Queue created");
        Ok(())
    }

    /// Remove the queue and any unconsumed items.
    ///
    /// # Errors
    ///
    /// `NotOwner` (queue untouched) if another identity created it.
    pub fn destroy(&self) -> Result<(), IpcError> {
        self.sem.destroy()?;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(IpcError::io(&self.path, e)),
        }
        debug!(path = %self.path.display(), "Queue destroyed");
        Ok(())
    }

    /// Append one item at the tail
    ///
    /// A single trailing line terminator is accepted and dropped; any other
    /// line break would split the item and is rejected.
    ///
    /// # Errors
    ///
    /// `MultiLineItem` for items spanning lines. If the append fails, the
    /// semaphore is not posted and the error is returned; a partially
    /// written line is not rolled back.
    pub fn put(&self, item: &str) -> Result<(), IpcError> {
        let line = item
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or(item);
        if line.contains(['\n', '\r']) {
            return Err(IpcError::MultiLineItem);
        }

        {
            let _guard = self.mutex.lock_guard(Timeout::Infinite)?;
            append_line(&self.data, line)?;
        }

        self.sem.post()
    }

    /// Remove and return the item at the head, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// `Timeout` if no item became available. `EmptyStore` if the semaphore
    /// granted an item that the store does not contain (the permit is spent).
    pub fn get(&self, timeout: Timeout) -> Result<String, IpcError> {
        self.sem.wait(timeout)?;

        let _guard = self.mutex.lock_guard(Timeout::Infinite)?;
        let content = match fs::read_to_string(&self.data) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(IpcError::io(&self.data, e)),
        };

        let (head, rest) = match content.split_once('\n') {
            Some((head, rest)) => (head, rest),
            None if content.is_empty() => {
                warn!(path = %self.path.display(), "Semaphore granted an item but the store is empty");
                return Err(IpcError::EmptyStore {
                    path: self.data.clone(),
                });
            }
            None => (content.as_str(), ""),
        };

        atomic_replace(&self.data, rest.as_bytes())?;
        Ok(head.to_string())
    }

    /// Apply `visit` to each stored item in order, under the guard
    ///
    /// Returns `Ok(false)` if `visit` returned `false` and the traversal
    /// stopped early. The store is never modified.
    pub fn foreach<F>(&self, mut visit: F) -> Result<bool, IpcError>
    where
        F: FnMut(&str) -> bool,
    {
        let _guard = self.mutex.lock_guard(Timeout::Infinite)?;
        let content = match fs::read_to_string(&self.data) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(IpcError::io(&self.data, e)),
        };

        for line in content.lines() {
            if !visit(line) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Number of items available to `get`.
    pub fn len(&self) -> Result<usize, IpcError> {
        let count = self.sem.peek()?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, IpcError> {
        Ok(self.len()? == 0)
    }
}
