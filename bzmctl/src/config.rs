/*!
Configuration management for bzmctl.
*/

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use bzm::HeaderWidth;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Bus bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// UDP address of the serial bus bridge
    pub bridge_addr: String,

    /// Local UDP bind address
    pub bind_addr: String,

    /// Wide header generation used for register and job commands
    pub header_width: HeaderWidth,

    /// Reply timeout in milliseconds
    pub timeout_ms: u64,

    /// Socket receive buffer size in bytes
    pub recv_buffer_size: usize,
}

impl BusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bridge_addr: "127.0.0.1:5555".to_string(),
            bind_addr: "0.0.0.0:0".to_string(),
            header_width: HeaderWidth::Wide24,
            timeout_ms: 100,
            recv_buffer_size: 64 * 1024,
        }
    }
}
