//! Error types for filesystem IPC operations

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during lock, semaphore, queue and endpoint operations
#[derive(Error, Debug)]
pub enum IpcError {
    /// A namespace or lock entry already exists (concurrent creation race)
    #[error("Already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// Non-blocking acquisition found the resource busy
    #[error("Resource busy: {path}")]
    WouldBlock { path: PathBuf },

    /// Blocking acquisition exhausted its poll budget
    #[error("Timed out on {path} after {rounds} poll rounds")]
    Timeout { path: PathBuf, rounds: u32 },

    /// Release or teardown attempted by an identity that does not hold the entry
    #[error("{path} is held by '{holder}', not by this process")]
    NotOwner { path: PathBuf, holder: String },

    /// Release of a lock entry that is not held
    #[error("Not held: {path}")]
    NotHeld { path: PathBuf },

    /// Unsubscribe from a topic the endpoint is not subscribed to
    #[error("Endpoint '{endpoint}' is not subscribed to '{topic}'")]
    NotSubscribed { endpoint: String, topic: String },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Persisted counter does not hold a decimal integer
    #[error("Corrupt counter in {path}: {content:?}")]
    CorruptCounter { path: PathBuf, content: String },

    /// Semaphore granted an item but the queue store had none
    #[error("Queue store is empty: {path}")]
    EmptyStore { path: PathBuf },

    /// Queue items must fit on a single line
    #[error("Queue items must not contain line breaks")]
    MultiLineItem,

    /// Endpoint or topic name rejected
    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Envelope could not be decoded or parsed
    #[error("Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    /// Envelope carries a version this implementation does not speak
    #[error("Unsupported envelope version: {found}")]
    UnsupportedVersion { found: serde_json::Value },

    /// Envelope lacks the requested field
    #[error("Envelope has no field '{field}'")]
    MissingField { field: String },
}

impl IpcError {
    /// Wrap an I/O error with the path it occurred on.
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        IpcError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this error means "try again later" rather than a hard failure.
    pub fn is_contention(&self) -> bool {
        matches!(self, IpcError::WouldBlock { .. } | IpcError::Timeout { .. })
    }
}
