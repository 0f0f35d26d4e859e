use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::mqtt::config::{ConnectionConfig, DEFAULT_PORT};

const CONFIG_DIR: &str = ".config/mqtt-status-light";
const SETTINGS_FILE: &str = "settings.toml";

/// Overrides the settings file location.
pub const CONFIG_PATH_ENV: &str = "MQTT_STATUS_LIGHT_CONFIG";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Settings incomplete, missing: {0}")]
    Incomplete(String),

    #[error("Port {0} is outside 1-65535")]
    InvalidPort(i64),
}

/// Broker settings as stored on disk. Every key is optional so a partially
/// filled file still loads.
#[derive(Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct StoredSettings {
    pub broker: Option<String>,
    pub port: Option<i64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: Option<String>,
}

impl fmt::Debug for StoredSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSettings")
            .field("broker", &self.broker)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .field("topic", &self.topic)
            .finish()
    }
}

impl StoredSettings {
    /// Skeleton written on first run: empty broker and topic, default port.
    pub fn template() -> Self {
        Self {
            broker: Some(String::new()),
            port: Some(DEFAULT_PORT as i64),
            username: Some(String::new()),
            password: Some(String::new()),
            topic: Some(String::new()),
        }
    }

    /// Broker present, topic present, port > 0.
    pub fn is_complete(&self) -> bool {
        non_empty(&self.broker).is_some()
            && non_empty(&self.topic).is_some()
            && self.port.is_some_and(|port| port > 0)
    }

    /// Converts to the immutable connection parameters.
    ///
    /// Empty username or password strings count as not set.
    pub fn connection_config(&self) -> Result<ConnectionConfig, SettingsError> {
        let mut missing = Vec::new();
        let broker = non_empty(&self.broker);
        if broker.is_none() {
            missing.push("broker");
        }
        let topic = non_empty(&self.topic);
        if topic.is_none() {
            missing.push("topic");
        }
        let port = match self.port {
            None | Some(0) => {
                missing.push("port");
                None
            }
            Some(port) => Some(u16::try_from(port).map_err(|_| SettingsError::InvalidPort(port))?),
        };

        match (broker, port, topic) {
            (Some(broker), Some(port), Some(topic)) => {
                let mut config = ConnectionConfig::new(broker, port, topic);
                if let Some(user) = non_empty(&self.username) {
                    config = config.with_credentials(user, non_empty(&self.password).map(str::to_string));
                }
                Ok(config)
            }
            _ => Err(SettingsError::Incomplete(missing.join(", "))),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Reads and writes the settings file.
#[derive(Clone, Debug)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `$MQTT_STATUS_LIGHT_CONFIG` if set, otherwise
    /// `~/.config/mqtt-status-light/settings.toml`.
    pub fn from_env() -> Self {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::new(path),
            None => {
                let mut path = get_home_dir();
                path.push(CONFIG_DIR);
                path.push(SETTINGS_FILE);
                Self::new(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the settings. A missing file yields empty settings.
    pub async fn load(&self) -> Result<StoredSettings> {
        if !tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| eyre!("Failed to check if settings file exists: {}", e))?
        {
            warn!("Settings file {} does not exist", self.path.display());
            return Ok(StoredSettings::default());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| eyre!("Failed to read settings file: {}", e))?;
        let settings =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse settings file: {}", e))?;
        debug!("Loaded settings from {}", self.path.display());
        Ok(settings)
    }

    pub async fn save(&self, settings: &StoredSettings) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
        }

        let content = toml::to_string_pretty(settings)
            .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| eyre!("Failed to write settings file: {}", e))?;

        info!("Settings saved to {}", self.path.display());
        Ok(())
    }

    /// Removes the stored settings. Missing file is not an error.
    pub async fn reset(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| eyre!("Failed to check if settings file exists: {}", e))?
        {
            tokio::fs::remove_file(&self.path)
                .await
                .map_err(|e| eyre!("Failed to delete settings file: {}", e))?;
            info!("Settings reset, removed {}", self.path.display());
        } else {
            debug!("Nothing to reset at {}", self.path.display());
        }
        Ok(())
    }

    /// Writes [`StoredSettings::template`] if no settings file exists yet.
    /// Returns whether a file was written.
    pub async fn ensure_template(&self) -> Result<bool> {
        if tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| eyre!("Failed to check if settings file exists: {}", e))?
        {
            return Ok(false);
        }
        self.save(&StoredSettings::template()).await?;
        Ok(true)
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
