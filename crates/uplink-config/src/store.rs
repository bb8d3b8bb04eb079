//! Settings store implementations.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{ConfigResult, SessionSettings, SettingsStore};

/// Settings read from a flat JSON file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store backed by the file at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SettingsStore for FileStore {
    fn load(&self) -> ConfigResult<SessionSettings> {
        let contents = fs::read_to_string(&self.path)?;
        let settings = serde_json::from_str(&contents)?;
        debug!(path = %self.path.display(), "Settings file loaded");
        Ok(settings)
    }
}

/// In-memory settings for hosts and tests.
///
/// Clones share the same settings, so a host can change them between
/// session reads.
#[derive(Clone, Default)]
pub struct MemoryStore {
    settings: Arc<Mutex<SessionSettings>>,
}

impl MemoryStore {
    /// Creates a store holding `settings`.
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    /// Replaces the stored settings.
    pub fn set(&self, settings: SessionSettings) {
        *self.settings.lock() = settings;
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> ConfigResult<SessionSettings> {
        Ok(self.settings.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ConfigError;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("uplink-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_file_store_reads_settings() {
        let path = temp_file(
            "settings.json",
            r#"{"destination_uri": "rtmp://example.com/live/key", "audio_enabled": false}"#,
        );

        let store = FileStore::new(path.clone());
        let settings = store.load().unwrap();

        assert_eq!(settings.destination_uri, "rtmp://example.com/live/key");
        assert!(settings.allow_background_publish);
        assert!(!settings.audio_enabled);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_file_store_missing_file() {
        let store = FileStore::new(PathBuf::from("/nonexistent/uplink-settings.json"));

        match store.load() {
            Err(ConfigError::Io(_)) => {}
            other => panic!("expected IO error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_file_store_malformed_file() {
        let path = temp_file("broken.json", "not json at all");

        let store = FileStore::new(path.clone());
        match store.load() {
            Err(ConfigError::Parse(_)) => {}
            other => panic!("expected parse error, got {:?}", other.map(|_| ())),
        }

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_memory_store_shares_updates() {
        let store = MemoryStore::new(SessionSettings::default());
        let clone = store.clone();

        clone.set(SessionSettings {
            destination_uri: "rtmp://example.com/a".to_string(),
            allow_background_publish: false,
            audio_enabled: true,
        });

        let settings = store.load().unwrap();
        assert_eq!(settings.destination_uri, "rtmp://example.com/a");
        assert!(!settings.allow_background_publish);
    }
}
