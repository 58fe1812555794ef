//! # Application Configuration
//!
//! `atomvault.toml`: the connection descriptor plus storage tuning.
//!
//! ```toml
//! uri = "sqlite://atomvault"
//!
//! [storage]
//! data_dir = "/var/lib/atomvault"
//! workers = 4
//! queue_capacity = 4096
//! busy_timeout_ms = 5000
//! ```

use atomvault_core::{StorageConfig, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Descriptor used when neither the command line nor the config names one.
pub const DEFAULT_URI: &str = "sqlite://atomvault";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub uri: Option<String>,
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            uri: Some(DEFAULT_URI.to_string()),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// The descriptor to connect with: explicit override, then config, then
    /// the default.
    pub fn resolve_uri(&self, override_uri: Option<&str>) -> String {
        override_uri
            .map(str::to_string)
            .or_else(|| self.uri.clone())
            .unwrap_or_else(|| DEFAULT_URI.to_string())
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("atomvault.toml")
}

/// Load the config file. `Ok(None)` when the file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<Option<AppConfig>, VaultError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| VaultError::Io(format!("{}: {}", path.display(), e)))?;
    let config: AppConfig = toml::from_str(&contents)
        .map_err(|e| VaultError::Serialization(format!("{}: {}", path.display(), e)))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &AppConfig, force: bool) -> Result<(), VaultError> {
    if path.exists() && !force {
        return Err(VaultError::Io(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| VaultError::Serialization(e.to_string()))?;
    std::fs::write(path, contents)
        .map_err(|e| VaultError::Io(format!("{}: {}", path.display(), e)))
}
