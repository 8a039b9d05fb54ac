//! Fetch command - refresh the cached indexes of a repository

use super::cache_manager;
use crate::cache::CacheOptions;
use crate::cli::args::FetchArgs;
use crate::config::Config;
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::location::RepositoryLocation;
use crate::progress::CancelToken;
use crate::ui::{self, TransferProgress, UiContext};
use tracing::debug;

/// Execute the fetch command
pub async fn execute(args: FetchArgs, config: &Config) -> RepoCacheResult<()> {
    let ctx = UiContext::detect();
    let location = RepositoryLocation::parse(&args.location)?;

    let mut options = CacheOptions::from_config(config);
    if args.no_resume {
        options.resumable = false;
    }
    let manager = cache_manager(config, options);

    let token = CancelToken::new();
    let signal_token = token.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling fetch");
            signal_token.cancel();
        }
    });

    ui::intro(&ctx, &format!("Fetching {}", location));

    let mut first_error = None;
    for prefix in &args.prefixes {
        let progress = TransferProgress::new(&ctx, token.clone());
        match manager.create_cache(&location, prefix, &progress).await {
            Ok(path) => ui::step_ok_detail(&ctx, prefix, &path.display().to_string()),
            Err(RepoCacheError::Cancelled) => {
                first_error = Some(RepoCacheError::Cancelled);
                break;
            }
            Err(e) => {
                ui::step_error_detail(&ctx, prefix, &e.to_string());
                first_error.get_or_insert(e);
            }
        }
    }

    signal.abort();
    manager.shutdown();

    match first_error {
        None => {
            ui::outro_success(&ctx, "Cache up to date");
            Ok(())
        }
        Some(e) => {
            ui::outro_error(&ctx, "Fetch incomplete");
            Err(e)
        }
    }
}
