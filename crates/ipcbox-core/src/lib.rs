//! Core library for ipcbox
//!
//! Inter-process coordination for processes that share nothing but a
//! filesystem: mutexes, counting semaphores, FIFO queues and pub/sub
//! endpoints, all built from atomic create-if-absent, identity-tagged create
//! and remove. There is no daemon and no shared memory; blocking operations
//! poll.
//!
//! Layering, leaf to root:
//! - [`io::WeakMutex`] / [`io::StrongMutex`] - lock entries
//! - [`sem::Semaphore`] - counter + wait gate + owner marker
//! - [`queue::Queue`] - line store + guard + semaphore
//! - [`uipc::Uipc`] - endpoints (one queue each) and topic fan-out

pub mod config;
pub mod home;
pub mod io;
pub mod logging;
pub mod queue;
pub mod sem;
pub mod uipc;

pub use config::Config;
pub use io::{IpcError, LockOptions, Timeout};
pub use queue::Queue;
pub use sem::Semaphore;
pub use uipc::{Envelope, PublishReport, Uipc};
