//! Configuration management for repocache

pub mod schema;

pub use schema::Config;

use crate::error::{RepoCacheError, RepoCacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Environment variable that toggles resumable downloads
pub const RESUMABLE_ENV: &str = "REPOCACHE_RESUMABLE";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repocache")
            .join("config.toml")
    }

    /// Get the agent data area
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repocache")
    }

    /// Get the default metadata cache directory
    pub fn default_cache_dir() -> PathBuf {
        Self::data_dir().join("cache")
    }

    /// Load configuration, using defaults if the file does not exist.
    ///
    /// Environment overrides are applied on top of the file contents.
    pub async fn load(&self) -> RepoCacheResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> RepoCacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| RepoCacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| RepoCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> RepoCacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            RepoCacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> RepoCacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RepoCacheError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides to a loaded config
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(value) = std::env::var(RESUMABLE_ENV) {
        match parse_bool(&value) {
            Some(resumable) => {
                debug!("{}={} overrides cache.resumable", RESUMABLE_ENV, resumable);
                config.cache.resumable = resumable;
            }
            None => warn!(
                "Ignoring {}='{}', expected true or false",
                RESUMABLE_ENV, value
            ),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
