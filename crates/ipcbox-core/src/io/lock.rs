//! Weak and strong filesystem mutexes with poll-based waiting
//!
//! A lock is held exactly while its entry exists. Both variants acquire with
//! [`create_tagged`], so acquisition is a single atomic create-if-absent:
//!
//! - [`WeakMutex`] tags the entry with the pid and releases unconditionally.
//! - [`StrongMutex`] tags the entry with the configured holder identity and
//!   only releases for that holder. This check doubles as the permission gate
//!   for semaphore and queue teardown.
//!
//! There is no wakeup notification between processes; blocking acquisition
//! retries on a fixed interval until the [`Timeout`] is spent.

use crate::io::atomic::{create_tagged, read_tag, remove_entry};
use crate::io::error::IpcError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a blocking operation keeps polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Poll until the operation succeeds
    Infinite,
    /// Make at most `max(n, 1)` attempts, one poll interval apart.
    /// `Rounds(0)` is a single attempt that returns immediately.
    Rounds(u32),
}

impl Timeout {
    /// Map the integer convention used on the command line: negative waits
    /// forever, anything else is a round count.
    pub fn from_rounds(rounds: i64) -> Self {
        if rounds < 0 {
            Timeout::Infinite
        } else {
            Timeout::Rounds(u32::try_from(rounds).unwrap_or(u32::MAX))
        }
    }

    /// Whether this budget allows nothing beyond one immediate attempt.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Timeout::Rounds(0))
    }
}

/// Identity and polling cadence shared by every lock a process takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Identity recorded in strong-mutex entries
    pub holder: String,
    /// Delay between acquisition attempts
    pub poll_interval: Duration,
}

impl LockOptions {
    pub fn new(holder: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            holder: holder.into(),
            poll_interval,
        }
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            holder: std::process::id().to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Retry `attempt` until it yields a value or the timeout is spent
///
/// `attempt` returns `Ok(Some(v))` on success, `Ok(None)` when the resource
/// is busy, and `Err` for failures that should not be retried.
pub(crate) fn poll<T, F>(
    path: &Path,
    timeout: Timeout,
    interval: Duration,
    mut attempt: F,
) -> Result<T, IpcError>
where
    F: FnMut() -> Result<Option<T>, IpcError>,
{
    let mut made: u32 = 0;

    loop {
        if let Some(value) = attempt()? {
            return Ok(value);
        }
        made = made.saturating_add(1);

        let exhausted = match timeout {
            Timeout::Infinite => false,
            Timeout::Rounds(rounds) => made >= rounds.max(1),
        };
        if exhausted {
            debug!(path = %path.display(), rounds = made, "Poll budget exhausted");
            return Err(IpcError::Timeout {
                path: path.to_path_buf(),
                rounds: made,
            });
        }

        std::thread::sleep(interval);
    }
}

/// Exclusive lock released without a holder check
#[derive(Debug, Clone)]
pub struct WeakMutex {
    path: PathBuf,
    poll_interval: Duration,
}

impl WeakMutex {
    pub fn new(path: impl Into<PathBuf>, options: &LockOptions) -> Self {
        Self {
            path: path.into(),
            poll_interval: options.poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the entry currently exists.
    pub fn is_held(&self) -> bool {
        crate::io::atomic::is_tagged(&self.path)
    }

    /// Attempt to take the lock once.
    ///
    /// # Errors
    ///
    /// `WouldBlock` if the entry exists, `Io` for any other storage failure.
    pub fn try_lock(&self) -> Result<(), IpcError> {
        let pid = std::process::id().to_string();
        match create_tagged(&self.path, &pid) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(IpcError::WouldBlock {
                path: self.path.clone(),
            }),
            Err(e) => Err(IpcError::io(&self.path, e)),
        }
    }

    /// Take the lock, polling until `timeout` is spent.
    pub fn lock(&self, timeout: Timeout) -> Result<(), IpcError> {
        poll(&self.path, timeout, self.poll_interval, || {
            match self.try_lock() {
                Ok(()) => Ok(Some(())),
                Err(IpcError::WouldBlock { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Remove the entry, whoever created it.
    ///
    /// # Errors
    ///
    /// `NotHeld` if there is no entry, `Io` for any other storage failure.
    pub fn unlock(&self) -> Result<(), IpcError> {
        match remove_entry(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(IpcError::NotHeld {
                path: self.path.clone(),
            }),
            Err(e) => Err(IpcError::io(&self.path, e)),
        }
    }
}

/// Exclusive lock that records and enforces its holder
#[derive(Debug, Clone)]
pub struct StrongMutex {
    path: PathBuf,
    holder: String,
    poll_interval: Duration,
}

impl StrongMutex {
    pub fn new(path: impl Into<PathBuf>, options: &LockOptions) -> Self {
        Self {
            path: path.into(),
            holder: options.holder.clone(),
            poll_interval: options.poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity this handle acquires and releases as.
    pub fn identity(&self) -> &str {
        &self.holder
    }

    /// Identity recorded in the entry.
    ///
    /// # Errors
    ///
    /// `NotHeld` if there is no entry.
    pub fn holder(&self) -> Result<String, IpcError> {
        read_tag(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                IpcError::NotHeld {
                    path: self.path.clone(),
                }
            } else {
                IpcError::io(&self.path, e)
            }
        })
    }

    pub fn try_lock(&self) -> Result<(), IpcError> {
        match create_tagged(&self.path, &self.holder) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(IpcError::WouldBlock {
                path: self.path.clone(),
            }),
            Err(e) => Err(IpcError::io(&self.path, e)),
        }
    }

    pub fn lock(&self, timeout: Timeout) -> Result<(), IpcError> {
        poll(&self.path, timeout, self.poll_interval, || {
            match self.try_lock() {
                Ok(()) => Ok(Some(())),
                Err(IpcError::WouldBlock { .. }) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Release the entry if this handle's identity holds it.
    ///
    /// # Errors
    ///
    /// `NotOwner` (state untouched) if another identity holds the entry,
    /// `NotHeld` if there is no entry.
    pub fn unlock(&self) -> Result<(), IpcError> {
        let recorded = self.holder()?;
        if recorded != self.holder {
            return Err(IpcError::NotOwner {
                path: self.path.clone(),
                holder: recorded,
            });
        }
        remove_entry(&self.path).map_err(|e| IpcError::io(&self.path, e))
    }

    /// Non-blocking acquisition released when the guard drops.
    pub fn try_lock_guard(&self) -> Result<StrongGuard<'_>, IpcError> {
        self.try_lock()?;
        Ok(StrongGuard::new(self))
    }

    /// Blocking acquisition released when the guard drops.
    pub fn lock_guard(&self, timeout: Timeout) -> Result<StrongGuard<'_>, IpcError> {
        self.lock(timeout)?;
        Ok(StrongGuard::new(self))
    }
}

/// Strong-mutex guard that releases the entry on drop
pub struct StrongGuard<'a> {
    mutex: &'a StrongMutex,
    released: bool,
}

impl<'a> StrongGuard<'a> {
    fn new(mutex: &'a StrongMutex) -> Self {
        Self {
            mutex,
            released: false,
        }
    }

    /// Release now and surface the release error instead of logging it.
    pub fn release(mut self) -> Result<(), IpcError> {
        self.released = true;
        self.mutex.unlock()
    }
}

impl Drop for StrongGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.mutex.unlock() {
            warn!(path = %self.mutex.path.display(), error = %e, "Failed to release guard");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn fast(holder: &str) -> LockOptions {
        LockOptions::new(holder, Duration::from_millis(10))
    }

    #[test]
    fn test_timeout_from_rounds() {
        assert_eq!(Timeout::from_rounds(-1), Timeout::Infinite);
        assert_eq!(Timeout::from_rounds(-30), Timeout::Infinite);
        assert_eq!(Timeout::from_rounds(0), Timeout::Rounds(0));
        assert_eq!(Timeout::from_rounds(5), Timeout::Rounds(5));
        assert!(Timeout::Rounds(0).is_immediate());
        assert!(!Timeout::Infinite.is_immediate());
    }

    #[test]
    fn test_weak_trylock_and_unlock() {
        let temp_dir = TempDir::new().unwrap();
        let mutex = WeakMutex::new(temp_dir.path().join("w"), &fast("a"));

        mutex.try_lock().unwrap();
        assert!(mutex.is_held());
        assert!(matches!(mutex.try_lock(), Err(IpcError::WouldBlock { .. })));

        mutex.unlock().unwrap();
        assert!(!mutex.is_held());
        assert!(matches!(mutex.unlock(), Err(IpcError::NotHeld { .. })));
    }

    #[test]
    fn test_weak_unlock_by_anyone() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("w");
        let first = WeakMutex::new(&path, &fast("a"));
        let second = WeakMutex::new(&path, &fast("b"));

        first.try_lock().unwrap();
        second.unlock().unwrap();
        assert!(!first.is_held());
    }

    #[test]
    fn test_weak_lock_zero_timeout_returns_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let mutex = WeakMutex::new(
            temp_dir.path().join("w"),
            &LockOptions::new("a", Duration::from_secs(5)),
        );
        mutex.try_lock().unwrap();

        let started = std::time::Instant::now();
        let result = mutex.lock(Timeout::Rounds(0));

        assert!(matches!(
            result,
            Err(IpcError::Timeout { rounds: 1, .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_weak_lock_bounded_rounds() {
        let temp_dir = TempDir::new().unwrap();
        let mutex = WeakMutex::new(temp_dir.path().join("w"), &fast("a"));
        mutex.try_lock().unwrap();

        let result = mutex.lock(Timeout::Rounds(3));
        assert!(matches!(result, Err(IpcError::Timeout { rounds: 3, .. })));
    }

    #[test]
    fn test_weak_lock_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("w");
        let mutex = WeakMutex::new(&path, &fast("a"));
        mutex.try_lock().unwrap();

        let releaser = WeakMutex::new(&path, &fast("b"));
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            releaser.unlock().unwrap();
        });

        mutex.lock(Timeout::Infinite).unwrap();
        handle.join().unwrap();
        assert!(mutex.is_held());
    }

    #[test]
    fn test_strong_unlock_requires_holder() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("s");
        let mine = StrongMutex::new(&path, &fast("alice"));
        let theirs = StrongMutex::new(&path, &fast("bob"));

        mine.try_lock().unwrap();
        assert_eq!(mine.holder().unwrap(), "alice");

        match theirs.unlock() {
            Err(IpcError::NotOwner { holder, .. }) => assert_eq!(holder, "alice"),
            other => panic!("expected NotOwner, got {other:?}"),
        }
        // Failed release leaves the entry in place
        assert_eq!(mine.holder().unwrap(), "alice");

        mine.unlock().unwrap();
        assert!(matches!(mine.holder(), Err(IpcError::NotHeld { .. })));
    }

    #[test]
    fn test_strong_guard_releases_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let mutex = StrongMutex::new(temp_dir.path().join("s"), &fast("alice"));

        {
            let _guard = mutex.lock_guard(Timeout::Infinite).unwrap();
            assert!(matches!(mutex.try_lock(), Err(IpcError::WouldBlock { .. })));
        }

        let guard = mutex.try_lock_guard().unwrap();
        guard.release().unwrap();
        assert!(matches!(mutex.holder(), Err(IpcError::NotHeld { .. })));
    }

    #[test]
    fn test_strong_guard_serializes_threads() {
        let temp_dir = TempDir::new().unwrap();
        let path = Arc::new(temp_dir.path().join("s"));
        let counter = Arc::new(temp_dir.path().join("counter"));
        std::fs::write(counter.as_path(), "0").unwrap();
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let path = Arc::clone(&path);
                let counter = Arc::clone(&counter);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mutex = StrongMutex::new(path.as_path(), &fast(&format!("t{i}")));
                    barrier.wait();
                    for _ in 0..5 {
                        let _guard = mutex.lock_guard(Timeout::Infinite).unwrap();
                        let value: u32 = std::fs::read_to_string(counter.as_path())
                            .unwrap()
                            .parse()
                            .unwrap();
                        std::fs::write(counter.as_path(), (value + 1).to_string()).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let total = std::fs::read_to_string(counter.as_path()).unwrap();
        assert_eq!(total, "20");
    }

    #[test]
    fn test_lock_in_missing_directory_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let mutex = StrongMutex::new(temp_dir.path().join("nope").join("s"), &fast("a"));

        assert!(matches!(mutex.try_lock(), Err(IpcError::Io { .. })));
        assert!(matches!(mutex.lock(Timeout::Infinite), Err(IpcError::Io { .. })));
    }
}
