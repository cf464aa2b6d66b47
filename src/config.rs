//! Configuration for an acquisition run.

use crate::device::{ChannelLayout, GloveBackend, KeyboardBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for `labsync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root under which `sub-XX/run-YY` directories are created
    pub log_dir: PathBuf,

    pub glove: GloveConfig,

    pub trigger: TriggerConfig,

    pub stimulus: StimulusConfig,

    /// How long to wait for each worker to open its device (in seconds)
    #[serde(with = "duration_serde")]
    pub ready_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("labsync");

        Self {
            log_dir: data_dir.join("logs"),
            glove: GloveConfig::default(),
            trigger: TriggerConfig::default(),
            stimulus: StimulusConfig::default(),
            ready_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or the defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("labsync")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GloveConfig {
    pub enabled: bool,
    pub port: String,
    pub channels: ChannelLayout,
    pub backend: GloveBackend,
}

impl Default for GloveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: "USB0".to_string(),
            channels: ChannelLayout::five_dt_14(),
            backend: GloveBackend::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    pub enabled: bool,
    /// Key the scanner sends once per TR
    pub key: String,
    pub backend: KeyboardBackend,

    /// Re-check interval while waiting for the first TR (in seconds)
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Give up waiting for the first TR after this long; wait forever if unset
    #[serde(with = "duration_serde::option")]
    pub sync_timeout: Option<Duration>,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: "s".to_string(),
            backend: KeyboardBackend::default(),
            poll_interval: Duration::from_millis(1),
            sync_timeout: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StimulusConfig {
    /// Stimuli in presentation order
    pub labels: Vec<String>,

    /// How long each stimulus stays on screen (in seconds)
    #[serde(with = "duration_serde")]
    pub display: Duration,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            labels: (1..=8).map(|i| format!("stimuli/image_{i}.jpeg")).collect(),
            display: Duration::from_secs(5),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration.map(|d| d.as_secs_f64()).serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<f64>::deserialize(deserializer)? {
                Some(secs) => Duration::try_from_secs_f64(secs)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.glove.enabled);
        assert_eq!(config.glove.port, "USB0");
        assert_eq!(config.glove.channels.len(), 14);
        assert_eq!(config.trigger.key, "s");
        assert_eq!(config.stimulus.labels.len(), 8);
        assert_eq!(config.stimulus.labels[0], "stimuli/image_1.jpeg");
        assert_eq!(config.stimulus.display, Duration::from_secs(5));
        assert!(config.trigger.sync_timeout.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"log_dir": "/data/study", "trigger": {"key": "t", "sync_timeout": 2.5}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/data/study"));
        assert_eq!(config.trigger.key, "t");
        assert_eq!(config.trigger.sync_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.trigger.poll_interval, Duration::from_millis(1));
        assert_eq!(config.glove.port, "USB0");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.ready_timeout = Duration::from_millis(750);
        config.glove.enabled = false;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.ready_timeout, Duration::from_millis(750));
        assert!(!loaded.glove.enabled);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.ready_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"ready_timeout": -1.0}"#).unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
