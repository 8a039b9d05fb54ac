//! Error types for repocache
//!
//! All modules use `RepoCacheResult<T>` as their return type.

use crate::transport::DownloadStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for repocache operations
pub type RepoCacheResult<T> = Result<T, RepoCacheError>;

/// All errors that can occur in repocache
#[derive(Error, Debug)]
pub enum RepoCacheError {
    // Remote repository errors
    #[error("Neither {jar} nor {xml} found")]
    NotFound { jar: String, xml: String },

    #[error("Authentication failed for {location}")]
    AuthenticationFailed { location: String },

    #[error("Failed communicating with repository {location}: {reason}")]
    Communication { location: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Download of {remote} failed: {status}")]
    Transfer {
        remote: String,
        status: DownloadStatus,
    },

    #[error("Download of {remote} ended without a status ({reason}), partial file removed")]
    Unexpected { remote: String, reason: String },

    #[error("Invalid repository location '{location}': {reason}")]
    InvalidLocation { location: String, reason: String },

    #[error("Invalid cache prefix '{0}': must be non-empty and contain no path separators")]
    InvalidPrefix(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl RepoCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a communication error for a repository location
    pub fn communication(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Communication {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error represents a user or monitor cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Communication { .. } | Self::Transfer { .. } | Self::Unexpected { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("Check that the location points at a repository root"),
            Self::AuthenticationFailed { .. } => {
                Some("The repository requires credentials the transport could not supply")
            }
            Self::Transfer { .. } | Self::Cancelled => {
                Some("Run the fetch again; interrupted downloads resume where they stopped")
            }
            _ => None,
        }
    }
}
