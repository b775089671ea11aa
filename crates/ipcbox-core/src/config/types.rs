//! Configuration types

use crate::io::lock::LockOptions;
use crate::queue::Queue;
use crate::sem::Semaphore;
use crate::uipc::Uipc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default delay between poll attempts
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Fully resolved configuration
///
/// Built once per process by [`resolve_config`](super::resolve_config) and
/// handed to every constructor; nothing below this reads the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub paths: PathsConfig,
    pub polling: PollingConfig,
    pub identity: IdentityConfig,
}

/// Roots for each resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where bare semaphore names resolve
    pub sem_root: PathBuf,
    /// Where bare queue names resolve
    pub queue_root: PathBuf,
    /// Shared endpoint root
    pub uipc_root: PathBuf,
    /// Shared topic root
    pub pubsub_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between attempts of every blocking operation, in milliseconds
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Account stamped into envelopes and endpoint owner files
    pub user: String,
    /// Identity recorded in strong-mutex entries
    pub holder: String,
}

/// One configuration source; unset keys defer to lower-priority sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialConfig {
    pub paths: PartialPaths,
    pub polling: PartialPolling,
    pub identity: PartialIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialPaths {
    /// Base for the sem/queue/uipc defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sem_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uipc_root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubsub_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialPolling {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
}

impl PartialConfig {
    /// Overlay `other` on top of `self`; keys set in `other` win.
    pub fn merge(&mut self, other: PartialConfig) {
        let PartialConfig {
            paths,
            polling,
            identity,
        } = other;

        overlay(&mut self.paths.root, paths.root);
        overlay(&mut self.paths.sem_root, paths.sem_root);
        overlay(&mut self.paths.queue_root, paths.queue_root);
        overlay(&mut self.paths.uipc_root, paths.uipc_root);
        overlay(&mut self.paths.pubsub_root, paths.pubsub_root);
        overlay(&mut self.polling.interval_ms, polling.interval_ms);
        overlay(&mut self.identity.user, identity.user);
        overlay(&mut self.identity.holder, identity.holder);
    }

    /// Fill every unset key with its default
    ///
    /// Roots cascade: `root` defaults to `<home>/.toolbox`, the sem, queue and
    /// uipc roots default to subdirectories of `root`, and the pub/sub root
    /// defaults to `<uipc_root>/pubsub`.
    pub fn finish(self, home_dir: &Path) -> Config {
        let root = self
            .paths
            .root
            .unwrap_or_else(|| home_dir.join(".toolbox"));
        let uipc_root = self.paths.uipc_root.unwrap_or_else(|| root.join("uipc"));

        Config {
            paths: PathsConfig {
                sem_root: self.paths.sem_root.unwrap_or_else(|| root.join("sem")),
                queue_root: self.paths.queue_root.unwrap_or_else(|| root.join("queue")),
                pubsub_root: self
                    .paths
                    .pubsub_root
                    .unwrap_or_else(|| uipc_root.join("pubsub")),
                uipc_root,
            },
            polling: PollingConfig {
                interval_ms: self.polling.interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            },
            identity: IdentityConfig {
                user: self.identity.user.unwrap_or_else(default_user),
                holder: self
                    .identity
                    .holder
                    .unwrap_or_else(|| std::process::id().to_string()),
            },
        }
    }
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn default_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

impl Config {
    /// Defaults rooted at `home_dir`, ignoring files and environment.
    pub fn with_home(home_dir: &Path) -> Self {
        PartialConfig::default().finish(home_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions::new(self.identity.holder.clone(), self.poll_interval())
    }

    /// Semaphore handle for `name`; see [`resolve_resource`].
    pub fn semaphore(&self, name: &str) -> Semaphore {
        Semaphore::new(
            resolve_resource(&self.paths.sem_root, name),
            &self.lock_options(),
        )
    }

    /// Queue handle for `name`; see [`resolve_resource`].
    pub fn queue(&self, name: &str) -> Queue {
        Queue::new(
            resolve_resource(&self.paths.queue_root, name),
            &self.lock_options(),
        )
    }

    /// Endpoint layer over the configured uipc and pub/sub roots.
    pub fn uipc(&self) -> Uipc {
        Uipc::new(
            &self.paths.uipc_root,
            &self.paths.pubsub_root,
            self.identity.user.clone(),
            self.lock_options(),
        )
    }
}

/// Resolve a resource name: anything containing `/` is a path, a bare name
/// lives under `root`.
pub fn resolve_resource(root: &Path, name: &str) -> PathBuf {
    if name.contains('/') {
        PathBuf::from(name)
    } else {
        root.join(name)
    }
}
