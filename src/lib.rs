//! Repocache - metadata repository cache manager
//!
//! Keeps local copies of remote repository indexes fresh, resumes
//! interrupted downloads and evicts caches of removed repositories.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod location;
pub mod progress;
pub mod transport;
pub mod ui;

pub use error::{RepoCacheError, RepoCacheResult};
