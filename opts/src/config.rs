//! Configuration for optionstore

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file backing the persisted options
    #[serde(rename = "store-path")]
    pub store_path: PathBuf,

    /// Defaults manifest; the builtin manifest is used when unset
    #[serde(rename = "defaults-path")]
    pub defaults_path: Option<PathBuf>,

    /// Quiescence delay before change hooks fire
    #[serde(rename = "notify-delay-ms")]
    pub notify_delay_ms: u64,

    /// Quiescence delay before the options map is written back
    #[serde(rename = "write-delay-ms")]
    pub write_delay_ms: u64,

    /// Command channel capacity
    #[serde(rename = "channel-buffer")]
    pub channel_buffer: usize,

    /// Broadcast capacity for change forwarding
    #[serde(rename = "bus-capacity")]
    pub bus_capacity: usize,

    /// Trace option reads, writes and rejections
    pub debug: bool,

    /// Log level override
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("optionstore")
        .join("options.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            defaults_path: None,
            notify_delay_ms: crate::DEFAULT_DELAY_MS,
            write_delay_ms: crate::DEFAULT_DELAY_MS,
            channel_buffer: 256,
            bus_capacity: crate::bus::DEFAULT_BUS_CAPACITY,
            debug: false,
            log_level: None,
        }
    }
}

impl StoreConfig {
    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify_delay_ms)
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Project-local: .optionstore.yml
        let local_config = PathBuf::from(".optionstore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // User: ~/.config/optionstore/optionstore.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("optionstore").join("optionstore.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::debug!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
