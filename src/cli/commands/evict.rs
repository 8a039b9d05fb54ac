//! Evict command - delete every cached index of a repository

use super::cache_manager;
use crate::cache::CacheOptions;
use crate::cli::args::EvictArgs;
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::location::RepositoryLocation;
use crate::ui::{self, UiContext};

/// Execute the evict command
pub async fn execute(args: EvictArgs, config: &Config) -> RepoCacheResult<()> {
    let ctx = UiContext::detect();
    let location = RepositoryLocation::parse(&args.location)?;
    let manager = cache_manager(config, CacheOptions::from_config(config));

    for prefix in &args.prefixes {
        manager.remember_prefix(prefix);
    }
    let deleted = manager.delete_cache(&location);
    manager.shutdown();

    if deleted == 0 {
        ui::step_info(&ctx, &format!("No cached indexes for {}", location));
        return Ok(());
    }

    let pending = manager.pending_deletes();
    if pending > 0 {
        ui::step_warn_hint(
            &ctx,
            &format!("{} file(s) could not be deleted", pending),
            "Close programs reading the cache and run evict again",
        );
    }
    ui::outro_success(
        &ctx,
        &format!(
            "Evicted {} file(s) for {}",
            deleted.saturating_sub(pending),
            location
        ),
    );
    Ok(())
}
