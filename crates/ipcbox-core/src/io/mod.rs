//! Atomic filesystem I/O and lock primitives
//!
//! This module provides the building blocks every higher layer composes:
//!
//! - **Tagged entries**: atomic create-if-absent carrying an identity string
//! - **Weak mutex**: pid-tagged lock, released by anyone
//! - **Strong mutex**: holder-tagged lock, released only by its holder
//! - **Atomic replace**: temp file + rename for crash-safe rewrites
//!
//! # Example
//!
//! ```rust,no_run
//! use ipcbox_core::io::{LockOptions, StrongMutex, Timeout};
//! use std::time::Duration;
//!
//! let options = LockOptions::new("worker-1", Duration::from_millis(100));
//! let mutex = StrongMutex::new("/tmp/ipcbox-demo.lock", &options);
//!
//! let guard = mutex.lock_guard(Timeout::Rounds(50)).unwrap();
//! // ... critical section ...
//! guard.release().unwrap();
//! ```

pub mod atomic;
pub mod error;
pub mod lock;

// Re-export primary API
pub use error::IpcError;
pub use lock::{LockOptions, StrongGuard, StrongMutex, Timeout, WeakMutex};
