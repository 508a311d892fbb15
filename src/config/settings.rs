//! Application configuration

use anyhow::{Context, Result};
use rg_probe_core::TopicConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::default_topics;

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// Application-wide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the config format
    #[serde(default = "default_version")]
    pub version: u32,
    /// Scheduler settings
    #[serde(default)]
    pub poll: PollSettings,
    /// Measurements to publish
    #[serde(default)]
    pub topics: Vec<TopicConfig>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl AppConfig {
    /// Load configuration from the default location, falling back to the
    /// built-in topic set when no file exists yet
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            log::info!(
                "No config at {}, using built-in topics",
                config_path.display()
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        if config.version > CONFIG_VERSION {
            log::warn!(
                "Config {} has version {}, newer than supported version {}",
                path.display(),
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Save configuration to a specific file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "github.hilgardt_collab", "rg-probe")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("config.json"))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            poll: PollSettings::default(),
            topics: default_topics(),
        }
    }
}

/// Poll driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    /// How often the driver looks for due topics
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,
    /// Maximum number of topics read concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Cache lifetime used by the startup snapshot
    #[serde(default = "default_initial_refresh_ms")]
    pub initial_refresh_ms: u64,
}

fn default_base_interval_ms() -> u64 {
    250
}

fn default_workers() -> usize {
    rg_probe_core::constants::DEFAULT_WORKER_COUNT
}

fn default_initial_refresh_ms() -> u64 {
    rg_probe_core::constants::INITIAL_REFRESH_INTERVAL.as_millis() as u64
}

impl PollSettings {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms.max(1))
    }

    pub fn initial_refresh_ms(&self) -> i64 {
        i64::try_from(self.initial_refresh_ms).unwrap_or(i64::MAX)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_interval_ms: default_base_interval_ms(),
            workers: default_workers(),
            initial_refresh_ms: default_initial_refresh_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rg_probe_core::{Category, Channel, TimeUnit};

    #[test]
    fn test_parse_minimal_config() {
        let config: AppConfig = serde_json::from_str(
            r#"{
                "topics": [
                    {"path": "host/mem", "category": "MEMORY", "channel": "MEMORY_USED"},
                    {"path": "host/fan", "category": "SENSORS", "channel": "FAN_SPEED",
                     "index": 1, "refresh_interval_value": 500,
                     "refresh_interval_unit": "MILLISECONDS"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.poll.base_interval_ms, 250);
        assert_eq!(config.poll.workers, 3);
        assert_eq!(config.poll.initial_refresh_ms, 3_600_000);

        assert_eq!(config.topics.len(), 2);
        assert_eq!(config.topics[0].channel, Channel::Used);
        assert_eq!(config.topics[0].refresh_interval().as_millis(), 10_000);
        assert_eq!(config.topics[1].category, Category::Sensors);
        assert_eq!(config.topics[1].index, Some(1));
        assert_eq!(config.topics[1].refresh_interval_unit, TimeUnit::Milliseconds);
        assert_eq!(config.topics[1].refresh_interval().as_millis(), 500);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let result: Result<AppConfig, _> = serde_json::from_str(
            r#"{"topics": [{"path": "x", "category": "GPU", "channel": "LOAD"}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let mut config = AppConfig::default();
        config.poll.workers = 5;
        config.save_to_path(&path).unwrap();

        let loaded = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.poll.workers, 5);
        assert_eq!(loaded.topics.len(), config.topics.len());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from_path(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_poll_settings_guard_zero_interval() {
        let settings = PollSettings {
            base_interval_ms: 0,
            ..PollSettings::default()
        };
        assert_eq!(settings.base_interval(), Duration::from_millis(1));
    }
}
