//! Cache directory providers

use crate::config::{Config, ConfigManager};
use std::path::PathBuf;

/// Resolves the root directory of an agent's metadata cache
pub trait CacheRoot: Send + Sync {
    fn cache_dir(&self) -> PathBuf;
}

/// Cache inside the agent data area, or a configured override
#[derive(Debug, Clone)]
pub struct AgentDataArea {
    dir: PathBuf,
}

impl AgentDataArea {
    pub fn from_config(config: &Config) -> Self {
        Self {
            dir: config
                .cache
                .dir
                .clone()
                .unwrap_or_else(ConfigManager::default_cache_dir),
        }
    }
}

impl CacheRoot for AgentDataArea {
    fn cache_dir(&self) -> PathBuf {
        self.dir.clone()
    }
}

/// A fixed cache directory
#[derive(Debug, Clone)]
pub struct FixedRoot(pub PathBuf);

impl CacheRoot for FixedRoot {
    fn cache_dir(&self) -> PathBuf {
        self.0.clone()
    }
}
