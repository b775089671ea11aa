//! Endpoints: named inboxes backed by a queue
//!
//! # Directory Structure
//!
//! ```text
//! <uipc_root>/
//!   <endpoint>/
//!     queue/           - inbox queue (see `crate::queue`)
//!     owner            - account that opened the endpoint
//!     subscriptions/   - one link per subscribed topic
//!   priv/<user>/...    - auto-named endpoints
//! ```
//!
//! Endpoint names are relative paths under the uipc root. Messages are
//! [`Envelope`]s enqueued on the destination's queue; there is no
//! acknowledgment path.

use crate::io::atomic::{atomic_replace, is_tagged, read_tag};
use crate::io::error::IpcError;
use crate::io::lock::{LockOptions, Timeout};
use crate::queue::Queue;
use crate::uipc::envelope::Envelope;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Roots and identities the endpoint layer runs with
#[derive(Debug, Clone)]
pub struct Uipc {
    pub(crate) root: PathBuf,
    pub(crate) pubsub_root: PathBuf,
    pub(crate) user: String,
    pub(crate) options: LockOptions,
}

impl Uipc {
    /// Build an endpoint layer rooted at `root` with topics under `pubsub_root`.
    pub fn new(
        root: impl Into<PathBuf>,
        pubsub_root: impl Into<PathBuf>,
        user: impl Into<String>,
        options: LockOptions,
    ) -> Self {
        Self {
            root: root.into(),
            pubsub_root: pubsub_root.into(),
            user: user.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Create an endpoint, or return the existing one of that name
    ///
    /// With `None` (or an empty name), a private name of the form
    /// `priv/<user>/<program>.<pid>.<unix-secs>.<rand>` is generated.
    /// The name is unlikely to collide but not guaranteed unique.
    ///
    /// # Returns
    ///
    /// The canonical endpoint name.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the path is taken by something that is not an
    /// endpoint (for instance a directory holding other endpoints).
    /// `InvalidName` if the name lies inside another endpoint.
    pub fn open(&self, name: Option<&str>) -> Result<String, IpcError> {
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.private_name(),
        };
        let path = self.endpoint_path(&name)?;

        if path.exists() {
            if !is_endpoint(&path) {
                return Err(IpcError::AlreadyExists { path });
            }
            debug!(endpoint = %name, "Endpoint already exists");
            return Ok(name);
        }
        if let Some(outer) = self.enclosing_endpoint(&name) {
            return Err(IpcError::InvalidName {
                name,
                reason: format!("inside endpoint '{outer}'"),
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| IpcError::io(parent, e))?;
        }
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(name),
            Err(e) => return Err(IpcError::io(&path, e)),
        }

        let result = self.populate(&path);
        if let Err(e) = result {
            warn!(endpoint = %name, error = %e, "Endpoint init failed, rolling back");
            if let Err(rm) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %rm, "Rollback failed");
            }
            return Err(e);
        }

        debug!(endpoint = %name, "Endpoint opened");
        Ok(name)
    }

    fn populate(&self, path: &Path) -> Result<(), IpcError> {
        let subscriptions = path.join("subscriptions");
        fs::create_dir(&subscriptions).map_err(|e| IpcError::io(&subscriptions, e))?;
        Queue::new(path.join("queue"), &self.options).init()?;
        atomic_replace(&path.join("owner"), format!("{}\n", self.user).as_bytes())
    }

    /// Tear an endpoint down
    ///
    /// The queue is destroyed first, which fails for anyone but the opener and
    /// leaves the endpoint intact. Topic subscriptions are then dropped best
    /// effort.
    pub fn close(&self, name: &str) -> Result<(), IpcError> {
        let path = self.endpoint_path(name)?;

        self.queue(name)?.destroy()?;

        match self.subscriptions(name) {
            Ok(topics) => {
                for topic in topics {
                    if let Err(e) = self.unsubscribe(name, &topic) {
                        warn!(endpoint = %name, topic = %topic, error = %e, "Failed to unsubscribe on close");
                    }
                }
            }
            Err(e) => warn!(endpoint = %name, error = %e, "Failed to list subscriptions on close"),
        }

        fs::remove_dir_all(&path).map_err(|e| IpcError::io(&path, e))?;
        debug!(endpoint = %name, "Endpoint closed");
        Ok(())
    }

    /// Account recorded when the endpoint was opened.
    pub fn owner(&self, name: &str) -> Result<String, IpcError> {
        let owner = self.endpoint_path(name)?.join("owner");
        let content = fs::read_to_string(&owner).map_err(|e| IpcError::io(&owner, e))?;
        Ok(content.trim_end().to_string())
    }

    /// Enqueue `data` for `destination`, stamped as coming from `source`.
    pub fn send(&self, source: &str, destination: &str, data: &[u8]) -> Result<(), IpcError> {
        let queue = self.queue(destination)?;
        let msg = Envelope::new(source, destination, data, &self.user).encode()?;
        queue.put(&msg)
    }

    /// Take the next message for `name`, waiting up to `timeout` overall
    ///
    /// The remaining budget is recomputed from wall-clock time before every
    /// attempt, so repeated attempts never extend the wait past the original
    /// budget. The result is the encoded envelope; check
    /// [`version_supported`](crate::uipc::envelope::version_supported) or use
    /// [`Envelope::decode`] before trusting it.
    pub fn recv(&self, name: &str, timeout: Timeout) -> Result<String, IpcError> {
        let queue = self.queue(name)?;
        let started = Instant::now();
        let interval_ms = self.options.poll_interval.as_millis().max(1);

        loop {
            let remaining = match timeout {
                Timeout::Infinite => Timeout::Infinite,
                Timeout::Rounds(rounds) => {
                    let budget_ms = interval_ms * u128::from(rounds);
                    let left_ms = budget_ms.saturating_sub(started.elapsed().as_millis());
                    Timeout::Rounds(u32::try_from(left_ms / interval_ms).unwrap_or(u32::MAX))
                }
            };

            match queue.get(remaining) {
                Ok(msg) => return Ok(msg),
                Err(e) if remaining.is_immediate() => return Err(e),
                Err(e @ (IpcError::Timeout { .. } | IpcError::EmptyStore { .. })) => {
                    debug!(endpoint = %name, error = %e, "No message yet");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// The endpoint's inbox queue.
    pub fn queue(&self, name: &str) -> Result<Queue, IpcError> {
        Ok(Queue::new(self.endpoint_path(name)?.join("queue"), &self.options))
    }

    /// Topics `name` is subscribed to, from its side of the registry.
    pub fn subscriptions(&self, name: &str) -> Result<Vec<String>, IpcError> {
        read_links(&self.endpoint_path(name)?.join("subscriptions"))
    }

    pub(crate) fn endpoint_path(&self, name: &str) -> Result<PathBuf, IpcError> {
        validate_name(name)?;
        let path = self.root.join(name);
        if path.starts_with(&self.pubsub_root) {
            return Err(IpcError::InvalidName {
                name: name.to_string(),
                reason: "reserved for topics".to_string(),
            });
        }
        Ok(path)
    }

    /// Nearest proper prefix of `name` that is an endpoint.
    fn enclosing_endpoint(&self, name: &str) -> Option<String> {
        let mut prefix = self.root.clone();
        let segments: Vec<&str> = name.split('/').collect();
        for (i, segment) in segments.iter().enumerate().take(segments.len() - 1) {
            prefix.push(segment);
            if is_endpoint(&prefix) {
                return Some(segments[..=i].join("/"));
            }
        }
        None
    }

    fn private_name(&self) -> String {
        let program = std::env::args_os()
            .next()
            .and_then(|arg0| {
                Path::new(&arg0)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "ipcbox".to_string());
        let pid = std::process::id();
        let date = chrono::Utc::now().timestamp();
        let suffix: u16 = rand::random();

        format!("priv/{}/{program}.{pid}.{date}.{suffix}", self.user)
    }
}

/// Whether `path` holds a fully opened endpoint.
fn is_endpoint(path: &Path) -> bool {
    path.join("queue").is_dir() && path.join("owner").is_file()
}

/// Reject names that are empty, absolute, or climb out of their root.
pub(crate) fn validate_name(name: &str) -> Result<(), IpcError> {
    let invalid = |reason: &str| IpcError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.trim().is_empty() {
        return Err(invalid("empty"));
    }
    if name.contains('\0') || name.contains('\n') {
        return Err(invalid("control characters"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(invalid("absolute path"));
    }
    for segment in name.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." => return Err(invalid("'.' segment")),
            ".." => return Err(invalid("'..' segment")),
            _ => {}
        }
    }
    Ok(())
}

/// Collapse a hierarchical name into one directory entry name
///
/// `%` and `/` are percent-escaped, so distinct names never share an entry.
pub(crate) fn flatten(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2F")
}

/// Tags of every link in `dir`, sorted; other entries are ignored.
pub(crate) fn read_links(dir: &Path) -> Result<Vec<String>, IpcError> {
    let entries = fs::read_dir(dir).map_err(|e| IpcError::io(dir, e))?;
    let mut tags = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| IpcError::io(dir, e))?;
        let path = entry.path();
        if !is_tagged(&path) {
            continue;
        }
        match read_tag(&path) {
            Ok(tag) => tags.push(tag),
            Err(e) => warn!(path = %path.display(), error = %e, "Unreadable link"),
        }
    }

    tags.sort();
    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uipc::envelope;
    use std::time::Duration;
    use tempfile::TempDir;

    fn uipc(temp_dir: &TempDir, holder: &str) -> Uipc {
        let root = temp_dir.path().join("uipc");
        Uipc::new(
            &root,
            root.join("pubsub"),
            "alice",
            LockOptions::new(holder, Duration::from_millis(10)),
        )
    }

    #[test]
    fn test_open_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        let name = uipc.open(Some("a")).unwrap();
        assert_eq!(name, "a");

        let path = temp_dir.path().join("uipc/a");
        assert!(path.join("subscriptions").is_dir());
        assert!(path.join("queue/sem").is_dir());
        assert_eq!(uipc.owner("a").unwrap(), "alice");
    }

    #[test]
    fn test_open_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        uipc.open(Some("a")).unwrap();
        uipc.send("x", "a", b"kept").unwrap();
        assert_eq!(uipc.open(Some("a")).unwrap(), "a");

        // Reopening did not reinitialize the queue
        assert_eq!(uipc.queue("a").unwrap().len().unwrap(), 1);
    }

    #[test]
    fn test_open_auto_name() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        let name = uipc.open(None).unwrap();
        assert!(name.starts_with("priv/alice/"), "{name}");
        assert!(name.contains(&format!(".{}.", std::process::id())));
        assert!(temp_dir.path().join("uipc").join(&name).is_dir());

        let other = uipc.open(Some("")).unwrap();
        assert!(other.starts_with("priv/alice/"));
    }

    #[test]
    fn test_open_rejects_bad_names() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        for name in ["../escape", "/abs", "a/../b", "./a", "pubsub", "pubsub/x", "  "] {
            assert!(
                matches!(uipc.open(Some(name)), Err(IpcError::InvalidName { .. })),
                "{name} accepted"
            );
        }
    }

    #[test]
    fn test_open_rejects_non_endpoint_directories() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");
        uipc.open(Some("priv/alice/inbox")).unwrap();
        uipc.open(Some("a")).unwrap();

        for name in ["priv", "priv/alice", "a/queue", "a/subscriptions"] {
            assert!(
                matches!(uipc.open(Some(name)), Err(IpcError::AlreadyExists { .. })),
                "{name} accepted"
            );
        }
    }

    #[test]
    fn test_open_rejects_nested_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");
        uipc.open(Some("a")).unwrap();

        assert!(matches!(
            uipc.open(Some("a/b")),
            Err(IpcError::InvalidName { .. })
        ));
        assert!(matches!(
            uipc.open(Some("a/b/c")),
            Err(IpcError::InvalidName { .. })
        ));
        assert!(!temp_dir.path().join("uipc/a/b").exists());
    }

    #[test]
    fn test_send_recv() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        uipc.open(Some("a")).unwrap();
        uipc.open(Some("b")).unwrap();
        uipc.send("a", "b", b"hello").unwrap();

        let msg = uipc.recv("b", Timeout::Rounds(5)).unwrap();
        assert!(envelope::version_supported(&msg));
        let env = Envelope::decode(&msg).unwrap();
        assert_eq!(env.source, "a");
        assert_eq!(env.destination, "b");
        assert_eq!(env.user, "alice");
        assert_eq!(env.payload_utf8().unwrap(), "hello");
    }

    #[test]
    fn test_recv_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");
        uipc.open(Some("a")).unwrap();

        let started = Instant::now();
        let result = uipc.recv("a", Timeout::Rounds(3));

        assert!(matches!(result, Err(IpcError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_recv_zero_timeout_is_immediate() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");
        uipc.open(Some("a")).unwrap();

        assert!(matches!(
            uipc.recv("a", Timeout::Rounds(0)),
            Err(IpcError::Timeout { .. })
        ));
    }

    #[test]
    fn test_send_to_missing_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        assert!(matches!(
            uipc.send("a", "nobody", b"x"),
            Err(IpcError::Io { .. })
        ));
    }

    #[test]
    fn test_close_removes_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let uipc = uipc(&temp_dir, "p1");

        uipc.open(Some("a")).unwrap();
        uipc.close("a").unwrap();
        assert!(!temp_dir.path().join("uipc/a").exists());
    }

    #[test]
    fn test_close_by_stranger_keeps_endpoint_usable() {
        let temp_dir = TempDir::new().unwrap();
        let owner = uipc(&temp_dir, "p1");
        let stranger = uipc(&temp_dir, "p2");

        owner.open(Some("a")).unwrap();
        owner.send("x", "a", b"still here").unwrap();

        assert!(matches!(stranger.close("a"), Err(IpcError::NotOwner { .. })));

        let msg = owner.recv("a", Timeout::Rounds(1)).unwrap();
        assert_eq!(
            Envelope::decode(&msg).unwrap().payload_utf8().unwrap(),
            "still here"
        );
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a").is_ok());
        assert!(validate_name("priv/alice/x.1.2.3").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/./b").is_err());
        assert!(validate_name("a\0b").is_err());
    }

    #[test]
    fn test_flatten() {
        assert_eq!(flatten("priv/alice/inbox"), "priv%2Falice%2Finbox");
        assert_eq!(flatten("plain"), "plain");
        assert_eq!(flatten("under_score"), "under_score");
        assert_ne!(flatten("x/y"), flatten("x_y"));
        assert_ne!(flatten("a/b"), flatten("a%2Fb"));
    }
}
