use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lock waits shorter than this would fail readers behind a slow writer.
pub const MIN_BUSY_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub schema_path: PathBuf,
    pub busy_timeout_secs: u64,
    /// Page cache size, in pages.
    pub cache_size_pages: u32,
    pub statement_cache_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("emails.db"),
            schema_path: PathBuf::from("database_schema.sql"),
            busy_timeout_secs: MIN_BUSY_TIMEOUT_SECS,
            cache_size_pages: 10_000,
            statement_cache_capacity: 100,
        }
    }
}

impl StoreConfig {
    pub fn load() -> Self {
        Self::load_from("settings.toml")
    }

    /// Reads an explicit settings file, keeping defaults for any missing
    /// field. An absent or unparsable file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        use std::fs;
        let path = path.as_ref();
        if let Ok(content) = fs::read_to_string(path) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "ignoring invalid settings file");
                }
            }
        }
        Self::default()
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs.max(MIN_BUSY_TIMEOUT_SECS))
    }
}
