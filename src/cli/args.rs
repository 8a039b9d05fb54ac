//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Repocache - metadata repository cache manager
///
/// Keeps local copies of remote repository indexes up to date and resumes
/// interrupted downloads.
#[derive(Parser, Debug)]
#[command(name = "repocache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "REPOCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh the cached indexes of a repository
    Fetch(FetchArgs),

    /// Delete every cached index of a repository
    Evict(EvictArgs),

    /// List cached indexes and parked downloads
    List(ListArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Repository location (http://, https:// or file:// URL)
    pub location: String,

    /// Index prefix to cache (repeatable)
    #[arg(short, long = "prefix", default_value = "content")]
    pub prefixes: Vec<String>,

    /// Discard interrupted downloads instead of keeping them for resumption
    #[arg(long)]
    pub no_resume: bool,
}

/// Arguments for the evict command
#[derive(Parser, Debug)]
pub struct EvictArgs {
    /// Repository location whose caches are deleted
    pub location: String,

    /// Index prefixes to sweep
    #[arg(short, long = "prefix", default_values_t = [String::from("content"), String::from("artifacts")])]
    pub prefixes: Vec<String>,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
