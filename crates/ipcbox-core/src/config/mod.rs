//! Configuration resolution for ipcbox
//!
//! Configuration is resolved with the following priority (highest to lowest):
//! 1. Command-line flags
//! 2. Environment variables (`IPCBOX_*`)
//! 3. Config file (`--config`, else `~/.config/ipcbox/config.toml`)
//! 4. Defaults rooted at the home directory
//!
//! The resolved [`Config`] hands out [`Semaphore`](crate::Semaphore),
//! [`Queue`](crate::Queue) and [`Uipc`](crate::Uipc) handles, so the
//! primitives themselves never consult the environment.

mod discovery;
mod types;

pub use discovery::{resolve_config, ConfigError, ConfigOverrides};
pub use types::{
    resolve_resource, Config, IdentityConfig, PartialConfig, PartialIdentity, PartialPaths,
    PartialPolling, PathsConfig, PollingConfig, DEFAULT_POLL_INTERVAL_MS,
};
