//! Flat key/value settings for the session.
//!
//! The session reads the store at start and on each foreground
//! re-entry; it never writes. Hosts own the file format and edits.

mod error;
mod store;

pub use error::ConfigError;
pub use store::{FileStore, MemoryStore};

use serde::{Deserialize, Serialize};

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Session-relevant settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Destination for publish attempts.
    #[serde(default)]
    pub destination_uri: String,

    /// Whether a publish may continue after the host backgrounds.
    #[serde(default = "default_true")]
    pub allow_background_publish: bool,

    /// Whether audio capture is enabled.
    #[serde(default = "default_true")]
    pub audio_enabled: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            destination_uri: String::new(),
            allow_background_publish: true,
            audio_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Read-only source of session settings.
pub trait SettingsStore: Send {
    /// Loads the current settings.
    fn load(&self) -> ConfigResult<SessionSettings>;
}
