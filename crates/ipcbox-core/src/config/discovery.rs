//! Configuration discovery and resolution

use super::types::{Config, PartialConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Explicitly requested config file does not exist
    #[error("Configuration not found: {0}")]
    NotFound(PathBuf),

    /// A value parsed but cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override the toolbox root
    pub root: Option<PathBuf>,
    /// Override the endpoint root
    pub uipc_root: Option<PathBuf>,
    /// Override the poll interval
    pub poll_interval_ms: Option<u64>,
    /// Override the envelope/owner account
    pub user: Option<String>,
    /// Override the lock holder identity
    pub holder: Option<String>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables (`IPCBOX_ROOT`, `IPCBOX_UIPC_ROOT`,
///    `IPCBOX_PUBSUB_ROOT`, `IPCBOX_POLL_MS`, `IPCBOX_USER`, `IPCBOX_HOLDER`)
/// 3. Config file (`overrides.config_path`, else `~/.config/ipcbox/config.toml`)
/// 4. Defaults
pub fn resolve_config(overrides: &ConfigOverrides, home_dir: &Path) -> Result<Config, ConfigError> {
    let mut layers = PartialConfig::default();

    // 3. Config file
    match &overrides.config_path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.clone()));
            }
            layers.merge(load_config_file(path)?);
        }
        None => {
            let default_path = home_dir.join(".config/ipcbox/config.toml");
            if default_path.exists() {
                match load_config_file(&default_path) {
                    Ok(file_config) => layers.merge(file_config),
                    Err(e) => warn!("Failed to parse config at {default_path:?}: {e}"),
                }
            }
        }
    }

    // 2. Environment
    layers.merge(env_layer());

    // 1. Command-line overrides
    layers.merge(override_layer(overrides));

    if layers.polling.interval_ms == Some(0) {
        return Err(ConfigError::Invalid(
            "poll interval must be at least 1 ms".to_string(),
        ));
    }

    Ok(layers.finish(home_dir))
}

/// Load a configuration file
fn load_config_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: PartialConfig = toml::from_str(&content)?;
    Ok(config)
}

fn env_layer() -> PartialConfig {
    let mut layer = PartialConfig::default();

    layer.paths.root = env_value("IPCBOX_ROOT").map(PathBuf::from);
    layer.paths.uipc_root = env_value("IPCBOX_UIPC_ROOT").map(PathBuf::from);
    layer.paths.pubsub_root = env_value("IPCBOX_PUBSUB_ROOT").map(PathBuf::from);
    layer.identity.user = env_value("IPCBOX_USER");
    layer.identity.holder = env_value("IPCBOX_HOLDER");

    if let Some(raw) = env_value("IPCBOX_POLL_MS") {
        match raw.parse::<u64>() {
            Ok(ms) => layer.polling.interval_ms = Some(ms),
            Err(_) => warn!("Ignoring IPCBOX_POLL_MS={raw:?}: not a number of milliseconds"),
        }
    }

    layer
}

fn override_layer(overrides: &ConfigOverrides) -> PartialConfig {
    let mut layer = PartialConfig::default();
    layer.paths.root = overrides.root.clone();
    layer.paths.uipc_root = overrides.uipc_root.clone();
    layer.polling.interval_ms = overrides.poll_interval_ms;
    layer.identity.user = overrides.user.clone();
    layer.identity.holder = overrides.holder.clone();
    layer
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
