//! Configuration schema for repocache
//!
//! Configuration is stored at `~/.config/repocache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Transport settings
    pub transport: TransportConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root override (defaults to the agent data area)
    pub dir: Option<PathBuf>,

    /// Keep interrupted downloads for resumption (default: true)
    pub resumable: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            resumable: true,
        }
    }
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connect and response-header timeout in seconds; bodies are not limited
    pub timeout_secs: u64,

    /// User-Agent header sent to HTTP repositories
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            user_agent: format!("repocache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
