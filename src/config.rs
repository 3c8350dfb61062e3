//! Receiver configuration loaded from a TOML file.
//!
//! The file lives at `~/.config/tvreceiver/config.toml` unless a path is passed on
//! the command line. A missing file is created with defaults so the receiver can
//! start on a fresh install without any manual setup.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const CONFIG_DIR: &str = ".config/tvreceiver";
const CONFIG_FILE: &str = "config.toml";
const DATA_DIR: &str = ".local/share/tvreceiver";

/// MQTT broker connection settings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,
    /// Fixed delay between reconnect attempts in seconds
    pub reconnect_delay_secs: u64,
    /// First segment of every device topic (`<prefix>/<serial>/...`)
    pub topic_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            keep_alive_secs: 60,
            reconnect_delay_secs: 5,
            topic_prefix: "tv".to_string(),
        }
    }
}

/// Display behaviour of the presentation shell.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// How long a transient status line stays visible, in milliseconds
    pub auto_hide_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { auto_hide_ms: 2000 }
    }
}

/// Where downloaded media and persisted state are kept.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for downloaded media files. Defaults to `<data_dir>/media`.
    pub media_dir: Option<PathBuf>,
    /// Directory for the key-value state file. Defaults to `~/.local/share/tvreceiver`.
    pub data_dir: Option<PathBuf>,
    /// Restore pairing flag and media list from the previous run
    pub restore_session: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            media_dir: None,
            data_dir: None,
            restore_session: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ReceiverConfig {
    pub broker: BrokerConfig,
    pub display: DisplayConfig,
    pub storage: StorageConfig,
}

impl ReceiverConfig {
    /// Loads the configuration from `path`, writing defaults first if the file is missing.
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("Creating default configuration at {}", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))
    }

    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            let mut path = get_home_dir();
            path.push(DATA_DIR);
            path
        })
    }

    pub fn media_dir(&self) -> PathBuf {
        self.storage
            .media_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("media"))
    }

    pub fn auto_hide(&self) -> Duration {
        Duration::from_millis(self.display.auto_hide_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.broker.reconnect_delay_secs)
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ReceiverConfig::load_or_create(&path).await.unwrap();

        assert_eq!(config, ReceiverConfig::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[broker]\nhost = \"localhost\"\n")
            .await
            .unwrap();

        let config = ReceiverConfig::load_or_create(&path).await.unwrap();

        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.display.auto_hide_ms, 2000);
    }

    #[test]
    fn media_dir_defaults_below_data_dir() {
        let mut config = ReceiverConfig::default();
        config.storage.data_dir = Some(PathBuf::from("/var/lib/tv"));

        assert_eq!(config.media_dir(), PathBuf::from("/var/lib/tv/media"));
    }
}
