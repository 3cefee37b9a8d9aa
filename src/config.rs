//! Tracker configuration.
//!
//! Configuration is a flat string map, matching the keys the collector
//! ecosystem already uses (`log`, `logSSL`, `domain`, `pixelPath`, `site`, ...).
//! Typed accessors interpret the values the pipeline cares about.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Recognised configuration keys.
pub mod keys {
    pub const SECURE: &str = "secure";
    pub const LOG: &str = "log";
    pub const LOG_SSL: &str = "logSSL";
    pub const SITE: &str = "site";
    pub const PIXEL_PATH: &str = "pixelPath";
    pub const DOMAIN: &str = "domain";
    pub const IDENTIFIER: &str = "identifier";
    pub const HASH_USER_ID: &str = "hashUserId";
    pub const STORAGE: &str = "storage";
    pub const ENABLE_BACKGROUND_TASK: &str = "enableBackgroundTask";
    pub const TVT_SPOT_VALIDITY_TIME: &str = "tvtSpotValidityTime";
    pub const DOWNLOAD_SOURCE: &str = "downloadSource";
    pub const SESSION_BACKGROUND_DURATION: &str = "sessionBackgroundDuration";
    pub const STORAGE_DURATION: &str = "storageDuration";
    pub const DATA_PATH: &str = "dataPath";
}

/// Offline storage policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Every hit goes to storage; only an explicit drain sends them.
    Always,
    /// Hits are never stored; failed hits are dropped.
    Never,
    /// Hits are stored only when they cannot be delivered.
    Required,
}

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerConfig {
    parameters: BTreeMap<String, String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hit-tracker");

        let defaults = [
            (keys::LOG, "logp"),
            (keys::LOG_SSL, "logs"),
            (keys::DOMAIN, "xiti.com"),
            (keys::PIXEL_PATH, "/hit.xiti"),
            (keys::SITE, ""),
            (keys::SECURE, "false"),
            (keys::IDENTIFIER, "uuid"),
            (keys::HASH_USER_ID, "false"),
            (keys::STORAGE, "required"),
            (keys::ENABLE_BACKGROUND_TASK, "true"),
            (keys::TVT_SPOT_VALIDITY_TIME, "5"),
            (keys::DOWNLOAD_SOURCE, "ext"),
            (keys::SESSION_BACKGROUND_DURATION, "60"),
            (keys::STORAGE_DURATION, "30"),
        ];

        let mut parameters: BTreeMap<String, String> = defaults
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        parameters.insert(
            keys::DATA_PATH.to_string(),
            data_dir.to_string_lossy().into_owned(),
        );

        Self { parameters }
    }
}

impl TrackerConfig {
    /// Configuration with no keys at all.
    pub fn empty() -> Self {
        Self {
            parameters: BTreeMap::new(),
        }
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, layering it over the defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let stored: BTreeMap<String, String> = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.parameters.extend(stored);
        }
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hit-tracker")
            .join("config.json")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parameters.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.parameters.remove(key);
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
    }

    pub fn is_secure(&self) -> bool {
        self.flag(keys::SECURE)
    }

    pub fn hash_user_id(&self) -> bool {
        self.flag(keys::HASH_USER_ID)
    }

    pub fn storage_mode(&self) -> StorageMode {
        match self.get(keys::STORAGE).map(str::to_lowercase).as_deref() {
            Some("always") => StorageMode::Always,
            Some("never") => StorageMode::Never,
            _ => StorageMode::Required,
        }
    }

    pub fn identifier(&self) -> &str {
        self.get(keys::IDENTIFIER).unwrap_or("uuid")
    }

    /// Days a stored hit is kept before being purged.
    pub fn storage_duration_days(&self) -> i64 {
        self.get(keys::STORAGE_DURATION)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(30)
    }

    /// Directory for the offline store and other local state.
    pub fn data_path(&self) -> PathBuf {
        self.get(keys::DATA_PATH)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(self.data_path()).map_err(|e| ConfigError::IoError(e.to_string()))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrackerConfig::default();
        assert_eq!(config.get(keys::LOG), Some("logp"));
        assert_eq!(config.get(keys::DOMAIN), Some("xiti.com"));
        assert!(!config.is_secure());
        assert!(!config.hash_user_id());
        assert_eq!(config.storage_mode(), StorageMode::Required);
        assert_eq!(config.storage_duration_days(), 30);
    }

    #[test]
    fn test_storage_mode_parsing() {
        let config = TrackerConfig::default().with(keys::STORAGE, "always");
        assert_eq!(config.storage_mode(), StorageMode::Always);

        let config = TrackerConfig::default().with(keys::STORAGE, "NEVER");
        assert_eq!(config.storage_mode(), StorageMode::Never);

        let config = TrackerConfig::default().with(keys::STORAGE, "whatever");
        assert_eq!(config.storage_mode(), StorageMode::Required);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = TrackerConfig::default()
            .with(keys::SITE, "552987")
            .with(keys::SECURE, "true");
        config.save_to(&path).unwrap();

        let loaded = TrackerConfig::load_from(&path).unwrap();
        assert_eq!(loaded.get(keys::SITE), Some("552987"));
        assert!(loaded.is_secure());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = TrackerConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, TrackerConfig::default());
    }
}
