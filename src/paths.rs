//! Path resolution for keysync
//!
//! # Environment Variables
//!
//! - `KEYSYNC_CONFIG` - Path of the keys file (read through the `--config` flag)
//! - `KEYSYNC_CONFIG_DIR` - Directory holding `keys.toml`
//!
//! # Path Resolution Priority
//!
//! For config_file():
//! 1. Explicit path (`--config` / `KEYSYNC_CONFIG`)
//! 2. `KEYSYNC_CONFIG_DIR/keys.toml`
//! 3. `XDG_CONFIG_HOME/keysync/keys.toml` (if set)
//! 4. `~/.config/keysync/keys.toml`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for the keys file
pub const ENV_CONFIG: &str = "KEYSYNC_CONFIG";

/// Environment variable for the config directory
pub const ENV_CONFIG_DIR: &str = "KEYSYNC_CONFIG_DIR";

/// File name looked up inside the config directory
pub const CONFIG_FILE_NAME: &str = "keys.toml";

/// Get the keysync config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("keysync");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("keysync");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Resolve the keys file, preferring an explicit path.
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(expand(&path.to_string_lossy())),
        None => Ok(config_dir()?.join(CONFIG_FILE_NAME)),
    }
}

/// Expand ~ and environment variables in a path string.
///
/// If a variable is undefined the path is returned unexpanded.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
