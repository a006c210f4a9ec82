//! Core TOML config loading: read from path or platform default.

use crate::schema::ChatConfig;
use crate::validation;
use dailychat_common::ConfigError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::template::default_config_toml;

const APP_DIR: &str = "dailychat";
const FILE_NAME: &str = "config.toml";

/// `<platform config dir>/dailychat/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(FILE_NAME))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

/// Write the commented template to `path`, creating parent directories.
/// Returns false and leaves the file alone if one already exists.
pub fn create_default_config(path: &Path) -> Result<bool, ConfigError> {
    let write_err =
        |e: io::Error| ConfigError::ParseError(format!("cannot write {}: {e}", path.display()));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(write_err(e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(write_err)?;
    info!(path = %path.display(), "Wrote default config");
    Ok(true)
}

/// Load config from a specific TOML file path.
///
/// Missing fields fall back to serde defaults. Validation problems are
/// logged here; callers that need a hard failure run
/// [`validation::validate`] themselves.
pub fn load_from_path(path: &Path) -> Result<ChatConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config: ChatConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/dailychat/config.toml`
///
/// If the file does not exist, a commented default file is written and
/// defaults are returned.
pub fn load_default() -> Result<ChatConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(ChatConfig::default())
        }
        Err(e) => Err(e),
    }
}
