//! User-level configuration for redstring
//!
//! Supports loading config from:
//! - Environment variables
//! - ~/.config/redstring/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::{BridgeSettings, ReconnectPolicy};

pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:3001";
pub const DEFAULT_AI_URL: &str = "http://localhost:3001";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Bridge base URL (default: http://localhost:3001)
    pub url: Option<String>,

    /// Seconds between snapshot pushes (default: 10)
    pub push_interval_secs: Option<u64>,

    /// Seconds between pending-action polls (default: 2)
    pub poll_interval_secs: Option<u64>,

    /// Prototypes included per snapshot (default: 50)
    pub snapshot_prototype_limit: Option<usize>,

    /// Reconnect attempts before giving up (default: 5)
    pub max_reconnect_attempts: Option<u32>,

    /// Per-request timeout in seconds (default: 10)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AiConfig {
    /// Base URL serving /api/ai/chat and /api/ai/agent
    pub url: Option<String>,

    /// System prompt sent with every request
    pub system_prompt: Option<String>,

    /// Agent calls can be slow (default: 120)
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Where universes.json and chat history live (default: platform data dir)
    pub data_dir: Option<PathBuf>,

    /// Session cache database (default: platform cache dir)
    pub cache_db: Option<PathBuf>,
}

impl UserConfig {
    /// Load config from all sources, with priority:
    /// 1. Environment variables (highest)
    /// 2. User config (~/.config/redstring/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = UserConfig::default();

        if let Some(path) = Self::user_config_path().filter(|p| p.exists()) {
            match Self::load_from(&path) {
                Ok(file_config) => config.merge(file_config),
                Err(e) => tracing::warn!("Ignoring {}: {:#}", path.display(), e),
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Parse one config file, without environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("REDSTRING_BRIDGE_URL") {
            self.bridge.url = Some(url);
        }
        if let Ok(url) = std::env::var("REDSTRING_AI_URL") {
            self.ai.url = Some(url);
        }
    }

    /// Get the user config directory path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("redstring").join("config.toml"))
    }

    /// Merge another config into this one (other takes priority)
    fn merge(&mut self, other: UserConfig) {
        let b = other.bridge;
        if b.url.is_some() {
            self.bridge.url = b.url;
        }
        if b.push_interval_secs.is_some() {
            self.bridge.push_interval_secs = b.push_interval_secs;
        }
        if b.poll_interval_secs.is_some() {
            self.bridge.poll_interval_secs = b.poll_interval_secs;
        }
        if b.snapshot_prototype_limit.is_some() {
            self.bridge.snapshot_prototype_limit = b.snapshot_prototype_limit;
        }
        if b.max_reconnect_attempts.is_some() {
            self.bridge.max_reconnect_attempts = b.max_reconnect_attempts;
        }
        if b.timeout_secs.is_some() {
            self.bridge.timeout_secs = b.timeout_secs;
        }

        let a = other.ai;
        if a.url.is_some() {
            self.ai.url = a.url;
        }
        if a.system_prompt.is_some() {
            self.ai.system_prompt = a.system_prompt;
        }
        if a.timeout_secs.is_some() {
            self.ai.timeout_secs = a.timeout_secs;
        }

        if other.storage.data_dir.is_some() {
            self.storage.data_dir = other.storage.data_dir;
        }
        if other.storage.cache_db.is_some() {
            self.storage.cache_db = other.storage.cache_db;
        }
    }

    pub fn bridge_url(&self) -> &str {
        self.bridge.url.as_deref().unwrap_or(DEFAULT_BRIDGE_URL)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge.timeout_secs.unwrap_or(10))
    }

    /// Bridge service settings with defaults filled in
    pub fn bridge_settings(&self) -> BridgeSettings {
        let defaults = BridgeSettings::default();
        BridgeSettings {
            push_interval: self
                .bridge
                .push_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.push_interval),
            poll_interval: self
                .bridge
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            prototype_limit: self
                .bridge
                .snapshot_prototype_limit
                .unwrap_or(defaults.prototype_limit),
            reconnect: ReconnectPolicy {
                max_attempts: self
                    .bridge
                    .max_reconnect_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
                ..defaults.reconnect
            },
            ..defaults
        }
    }

    pub fn ai_url(&self) -> &str {
        self.ai.url.as_deref().unwrap_or(DEFAULT_AI_URL)
    }

    pub fn ai_timeout(&self) -> Duration {
        Duration::from_secs(self.ai.timeout_secs.unwrap_or(120))
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.ai.system_prompt.as_deref()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("redstring")
        })
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.storage
            .cache_db
            .clone()
            .unwrap_or_else(crate::persistence::CacheSlot::default_path)
    }

    pub fn universe_registry_path(&self) -> PathBuf {
        self.data_dir().join("universes.json")
    }

    pub fn chat_history_path(&self) -> PathBuf {
        self.data_dir().join("chat_history.json")
    }

    /// Initialize user config directory and create example config
    pub fn init_user_config() -> Result<PathBuf> {
        let config_path = Self::user_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Self::write_example(&config_path)?;
        Ok(config_path)
    }

    /// Write the commented example config unless a file already exists.
    /// Returns true if a file was written.
    pub fn write_example(config_path: &Path) -> Result<bool> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if config_path.exists() {
            return Ok(false);
        }

        let example = r#"# Redstring User Configuration

[bridge]
# Local bridge process (also settable via REDSTRING_BRIDGE_URL)
# url = "http://localhost:3001"
# push_interval_secs = 10
# poll_interval_secs = 2
# snapshot_prototype_limit = 50
# max_reconnect_attempts = 5
# timeout_secs = 10

[ai]
# Serves /api/ai/chat and /api/ai/agent (also REDSTRING_AI_URL)
# url = "http://localhost:3001"
# system_prompt = "You help organise a knowledge graph."
# timeout_secs = 120

[storage]
# data_dir = "/path/to/redstring-data"
# cache_db = "/path/to/sessions.redb"
"#;
        std::fs::write(config_path, example)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = UserConfig::default();
        assert_eq!(config.bridge_url(), DEFAULT_BRIDGE_URL);
        assert_eq!(config.bridge_timeout(), Duration::from_secs(10));
        assert_eq!(config.ai_timeout(), Duration::from_secs(120));
        assert!(config.system_prompt().is_none());

        let settings = config.bridge_settings();
        assert_eq!(settings.push_interval, Duration::from_secs(10));
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.prototype_limit, 50);
        assert_eq!(settings.reconnect.max_attempts, 5);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
[bridge]
url = "http://127.0.0.1:4000"
poll_interval_secs = 5
max_reconnect_attempts = 2

[ai]
system_prompt = "Be brief."
"#;
        let config: UserConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bridge_url(), "http://127.0.0.1:4000");
        let settings = config.bridge_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.push_interval, Duration::from_secs(10));
        assert_eq!(settings.reconnect.max_attempts, 2);
        assert_eq!(settings.reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(config.system_prompt(), Some("Be brief."));
    }

    #[test]
    fn test_toml_parsing_minimal() {
        let config: UserConfig = toml::from_str("").unwrap();
        assert_eq!(config.ai_url(), DEFAULT_AI_URL);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [[ not valid toml {{{}}}").unwrap();
        let err = UserConfig::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid TOML"));
    }

    #[test]
    fn test_merge_overrides_set_fields() {
        let mut base = UserConfig::default();
        base.bridge.url = Some("http://old".into());
        base.ai.timeout_secs = Some(30);

        let mut other = UserConfig::default();
        other.bridge.url = Some("http://new".into());
        other.storage.data_dir = Some(PathBuf::from("/data"));
        base.merge(other);

        assert_eq!(base.bridge_url(), "http://new");
        assert_eq!(base.ai_timeout(), Duration::from_secs(30));
        assert_eq!(base.universe_registry_path(), PathBuf::from("/data/universes.json"));
    }

    #[test]
    fn test_example_config_parses_and_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("redstring").join("config.toml");
        assert!(UserConfig::write_example(&path).unwrap());
        let config = UserConfig::load_from(&path).unwrap();
        assert_eq!(config.bridge_url(), DEFAULT_BRIDGE_URL);

        std::fs::write(&path, "[bridge]\nurl = \"http://kept\"\n").unwrap();
        assert!(!UserConfig::write_example(&path).unwrap());
        assert_eq!(UserConfig::load_from(&path).unwrap().bridge_url(), "http://kept");
    }

    #[test]
    fn test_user_config_path_returns_some() {
        if let Some(p) = UserConfig::user_config_path() {
            assert!(p.ends_with("redstring/config.toml"));
        }
    }
}
