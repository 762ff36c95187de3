//! Application settings, stored as TOML under the user's config directory.
//!
//! A missing file is not an error: the defaults are used and the caller may
//! write them out with [`ensure_default_config`]. A file that exists but does
//! not parse is reported, so a typo never silently resets the broker address.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mqtt::{ListenerOptions, MqttListenerConfig};

const CONFIG_DIR: &str = ".config/mqtt-navigator";
const CONFIG_FILE: &str = "config.toml";
const SESSION_DIR: &str = "sessions";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub channel_capacity: usize,
    pub session_dir: PathBuf,
    pub broker: MqttListenerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            client_id: None,
            keep_alive_secs: 5,
            channel_capacity: 100,
            session_dir: config_dir().join(SESSION_DIR),
            broker: MqttListenerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Transport options derived from these settings.
    pub fn listener_options(&self) -> ListenerOptions {
        let mut options = ListenerOptions {
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            channel_capacity: self.channel_capacity,
            ..ListenerOptions::default()
        };
        if let Some(client_id) = self.client_id.as_ref().filter(|id| !id.is_empty()) {
            options.client_id = client_id.clone();
        }
        options
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Loads the default config file.
    pub async fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|source| io_error(path, source))?
        {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| io_error(path, source))?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }
        tokio::fs::write(path, self.to_toml()?)
            .await
            .map_err(|source| io_error(path, source))
    }
}

/// Writes the default config file unless one already exists.
pub async fn ensure_default_config() -> Result<PathBuf, ConfigError> {
    let path = config_path();
    ensure_default_config_at(&path).await?;
    Ok(path)
}

pub async fn ensure_default_config_at(path: &Path) -> Result<(), ConfigError> {
    if tokio::fs::try_exists(path)
        .await
        .map_err(|source| io_error(path, source))?
    {
        return Ok(());
    }
    info!("Creating default configuration at {}", path.display());
    AppConfig::default().save_to(path).await
}

pub fn config_dir() -> PathBuf {
    get_home_dir().join(CONFIG_DIR)
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}
