//! List command - show cached indexes and parked downloads

use super::cache_manager;
use crate::cache::{CacheEntry, CacheOptions};
use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::RepoCacheResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> RepoCacheResult<()> {
    let manager = cache_manager(config, CacheOptions::from_config(config));
    let entries = manager.cached_entries().await?;

    if entries.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No cached indexes");
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Plain => print_plain(&entries),
    }

    Ok(())
}

fn file_name(entry: &CacheEntry) -> String {
    entry
        .path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned()
}

fn print_table(entries: &[CacheEntry]) {
    println!(
        "{:<40} {:<8} {:<10} {:>12} {:<20}",
        style("FILE").bold(),
        style("FORMAT").bold(),
        style("STATE").bold(),
        style("SIZE").bold(),
        style("MODIFIED").bold()
    );
    println!("{}", "-".repeat(94));

    for entry in entries {
        let state = if entry.partial {
            style("partial").yellow()
        } else {
            style("cached").green()
        };
        let modified = entry
            .modified
            .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<40} {:<8} {:<10} {:>12} {:<20}",
            file_name(entry),
            entry.format,
            state,
            entry.size_bytes,
            modified
        );
    }

    println!();
    println!("Total: {} file(s)", entries.len());
}

fn print_json(entries: &[CacheEntry]) -> RepoCacheResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        path: String,
        format: String,
        partial: bool,
        size_bytes: u64,
        modified: Option<String>,
    }

    let json: Vec<EntryJson> = entries
        .iter()
        .map(|e| EntryJson {
            path: e.path.display().to_string(),
            format: e.format.to_string(),
            partial: e.partial,
            size_bytes: e.size_bytes,
            modified: e.modified.map(|m| m.to_rfc3339()),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(entries: &[CacheEntry]) {
    for entry in entries {
        println!("{}", entry.path.display());
    }
}
