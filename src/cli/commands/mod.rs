//! CLI command implementations

pub mod config;
pub mod evict;
pub mod fetch;
pub mod list;

pub use config::execute as config;
pub use evict::execute as evict;
pub use fetch::execute as fetch;
pub use list::execute as list;

use crate::cache::{AgentDataArea, CacheManager, CacheOptions};
use crate::config::Config;
use crate::transport::RepositoryTransport;
use std::sync::Arc;

/// Cache manager over the configured cache directory and transports
fn cache_manager(config: &Config, options: CacheOptions) -> CacheManager {
    CacheManager::new(
        AgentDataArea::from_config(config),
        Arc::new(RepositoryTransport::new(&config.transport)),
        options,
    )
}
