//! Bridge configuration
//!
//! Read from a TOML file. Every field has a default, so a partial file only needs the
//! values it changes. A missing default file is created on first start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::emitter::{ClickButton, DeviceCapabilities};

const CONFIG_DIR: &str = ".config/rotary-pointer";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config file {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// BCM pin assignment for the encoder and its push switch.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    pub encoder_a: u8,
    pub encoder_b: u8,
    pub button: u8,
    /// Button pulls the line low when pressed
    pub button_active_low: bool,
    /// Debounce window handed to the GPIO driver
    pub button_debounce_ms: u64,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            encoder_a: 17,
            encoder_b: 18,
            button: 27,
            button_active_low: true,
            button_debounce_ms: 5,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Pointer units per encoder detent
    pub scale_factor: i32,
    /// Presses at least this long are clicks, shorter ones toggle the axis
    pub hold_threshold_ms: u64,
    /// Window after the first tick in which further ticks fold into one motion event
    pub drain_interval_ms: u64,
    pub device_name: String,
    pub click_button: ClickButton,
    pub pins: PinConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scale_factor: 10,
            hold_threshold_ms: 500,
            drain_interval_ms: 8,
            device_name: "Rotary Pointer".to_string(),
            click_button: ClickButton::Left,
            pins: PinConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn hold_threshold(&self) -> Duration {
        Duration::from_millis(self.hold_threshold_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            name: self.device_name.clone(),
            click_button: self.click_button,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scale_factor <= 0 {
            return Err(ConfigError::Invalid(format!(
                "scale_factor must be positive, got {}",
                self.scale_factor
            )));
        }
        if self.hold_threshold_ms == 0 {
            return Err(ConfigError::Invalid(
                "hold_threshold_ms must be greater than zero".to_string(),
            ));
        }
        if self.device_name.trim().is_empty() {
            return Err(ConfigError::Invalid("device_name is empty".to_string()));
        }

        let pins = &self.pins;
        if pins.encoder_a == pins.encoder_b
            || pins.encoder_a == pins.button
            || pins.encoder_b == pins.button
        {
            return Err(ConfigError::Invalid(format!(
                "pins must be distinct, got a={} b={} button={}",
                pins.encoder_a, pins.encoder_b, pins.button
            )));
        }
        Ok(())
    }

    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Write {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    /// Loads an explicitly given file. The file must exist.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_toml(&content, path)?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Loads the per-user file, writing defaults there first if it is missing.
    pub async fn load_or_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        Self::ensure_default_config(&path).await?;
        Self::load(&path).await
    }

    pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            return Ok(());
        }

        warn!(
            "No configuration at {}, writing defaults",
            path.display()
        );
        let write_err = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_err(e.to_string()))?;
        }
        let content = Self::default().to_toml()?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| write_err(e.to_string()))
    }
}

pub fn default_config_path() -> PathBuf {
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}
