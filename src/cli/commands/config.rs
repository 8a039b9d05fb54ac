//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::RepoCacheResult;
use crate::ui::{self, UiContext};

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    manager: &ConfigManager,
    config: &Config,
) -> RepoCacheResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> RepoCacheResult<()> {
    println!("{}", toml::to_string_pretty(config)?);

    let ctx = UiContext::detect();
    let cache_dir = config
        .cache
        .dir
        .clone()
        .unwrap_or_else(ConfigManager::default_cache_dir);
    ui::remark(&ctx, "Effective cache directory:");
    ui::key_value(&ctx, "cache", &cache_dir.display().to_string());
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> RepoCacheResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok_detail(&ctx, "Configuration initialized", &path.display().to_string());
    Ok(())
}
