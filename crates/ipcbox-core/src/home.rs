//! Home directory resolution
//!
//! All default roots (`~/.toolbox/...`, `~/.config/ipcbox/config.toml`) hang
//! off one home directory, resolved here.
//!
//! # Precedence
//!
//! 1. `IPCBOX_HOME` environment variable (if set and not blank)
//! 2. `dirs::home_dir()` platform default
//!
//! Tests and sandboxed deployments point `IPCBOX_HOME` at a scratch
//! directory so nothing touches the real home.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Get the home directory ipcbox roots its default paths in
///
/// # Errors
///
/// Returns an error if `IPCBOX_HOME` is unset or blank and the platform home
/// directory cannot be determined.
pub fn get_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("IPCBOX_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::home_dir().context("Could not determine home directory")
}
