//! Configuration file discovery and loading
//!
//! Bootstrap configuration is a TOML file located by priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config file (`~/.config/roomscribe/config.toml`)
//! 4. System config file (`/etc/roomscribe/config.toml`)
//!
//! When no file is found the caller falls back to built-in defaults.
//! Individual settings may then be overridden by environment variables
//! (see `env_string` / `env_flag`).

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name used under the platform config dir
pub const CONFIG_DIR_NAME: &str = "roomscribe";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Locate the configuration file
///
/// Returns `None` when neither an explicit path nor a default file exists.
/// An explicit path (CLI or environment) that does not exist is an error,
/// since the operator clearly asked for it.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Result<Option<PathBuf>> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return require_existing(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    // Priority 3/4: user then system config file
    let user_config = dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    let system_config = PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);

    for candidate in user_config.into_iter().chain(std::iter::once(system_config)) {
        if candidate.exists() {
            debug!("Found config file: {}", candidate.display());
            return Ok(Some(candidate));
        }
    }

    Ok(None)
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Load and parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(value)
}

/// Load `T` from the resolved path, or `T::default()` if there is none
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => load_toml(path),
        None => {
            info!("No config file found, using built-in defaults");
            Ok(T::default())
        }
    }
}

/// Read a non-empty environment variable
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a boolean environment variable (`true`/`1`/`yes`, case-insensitive)
pub fn env_flag(name: &str) -> Option<bool> {
    env_string(name).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}
