//! Runner configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crowdsafety::{CrowdFeedConfig, FirestoreConfig, SimulationConfig, WeatherConfig};

/// Error types for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value parsed but cannot be used
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub crowd_feed: CrowdFeedSection,
    #[serde(default)]
    pub weather: WeatherSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name reported in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Interval between state summaries in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            json_logs: false,
            stats_interval_secs: default_stats_interval(),
        }
    }
}

/// Which document store backs the mirrors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    /// Firestore REST API (or its emulator)
    #[default]
    Firestore,
    /// In-process store; nothing is shared or kept across restarts
    Memory,
}

/// Remote document store used by the mirrors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Attach the mirrors to a store; off leaves them unavailable
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: RemoteBackend,

    #[serde(flatten)]
    pub store: FirestoreConfig,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RemoteBackend::default(),
            store: FirestoreConfig::default(),
        }
    }
}

/// Crowd counter polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdFeedSection {
    #[serde(default)]
    pub enabled: bool,

    /// Zone whose count is polled
    #[serde(default = "default_zone")]
    pub zone: String,

    #[serde(flatten)]
    pub client: CrowdFeedConfig,
}

impl Default for CrowdFeedSection {
    fn default() -> Self {
        Self {
            enabled: false,
            zone: default_zone(),
            client: CrowdFeedConfig::default(),
        }
    }
}

/// Observed weather
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherSection {
    #[serde(default)]
    pub enabled: bool,

    /// Interval between fetches in seconds
    #[serde(default = "default_weather_refresh")]
    pub refresh_interval_secs: u64,

    #[serde(flatten)]
    pub client: WeatherConfig,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_interval_secs: default_weather_refresh(),
            client: WeatherConfig::default(),
        }
    }
}

// Defaults
fn default_name() -> String { "crowdsafety-node".to_string() }
fn default_stats_interval() -> u64 { 60 }
fn default_true() -> bool { true }
fn default_zone() -> String { "Zone A".to_string() }
fn default_weather_refresh() -> u64 { 600 }

impl Config {
    /// Load from `path`. Returns `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Reject values the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("simulation.tick_interval_ms", self.simulation.tick_interval_ms),
            ("crowd_feed.poll_interval_ms", self.crowd_feed.client.poll_interval_ms),
            ("node.stats_interval_secs", self.node.stats_interval_secs),
            ("weather.refresh_interval_secs", self.weather.refresh_interval_secs),
            ("remote.poll_interval_ms", self.remote.store.poll_interval_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }
}
