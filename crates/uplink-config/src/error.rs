//! Error types for the configuration store.

use thiserror::Error;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON.
    #[error("Malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
}
