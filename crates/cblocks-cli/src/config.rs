//! Configuration loading.
//!
//! `config.toml` is optional; missing sections and fields fall back to the
//! defaults in `cblocks_core::config`. Environment variables override both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use cblocks_commands::MqttConfig;
use cblocks_core::config::{env_vars, storage, write};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CBlocksConfig {
    pub mqtt: MqttConfig,
    pub storage: StorageConfig,
    pub write: WriteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(storage::DEFAULT_DATA_DIR),
        }
    }
}

impl StorageConfig {
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(storage::REGISTRY_FILE)
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.data_dir.join(storage::MAPPINGS_FILE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteConfig {
    /// How long a write waits for the device, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            timeout_ms: write::DEFAULT_TIMEOUT_MS,
        }
    }
}

impl WriteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl CBlocksConfig {
    /// Load the config file if present, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!(category = "config", "Loading config from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            info!(category = "config", "No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(broker) = lookup(env_vars::MQTT_BROKER) {
            self.mqtt.broker = broker;
        }
        if let Some(port) = lookup(env_vars::MQTT_PORT).and_then(|s| s.parse().ok()) {
            self.mqtt.port = port;
        }
        if let Some(data_dir) = lookup(env_vars::DATA_DIR) {
            self.storage.data_dir = PathBuf::from(data_dir);
        }
        if let Some(timeout_ms) = lookup(env_vars::WRITE_TIMEOUT_MS).and_then(|s| s.parse().ok()) {
            self.write.timeout_ms = timeout_ms;
        }
    }
}
