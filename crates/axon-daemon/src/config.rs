//! Configuration loading

use anyhow::Result;
use axon_bridge::BridgeConfig;
use axon_core::{DriverOptions, OptionValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Driver device database
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Where the driver persists network configuration
    #[serde(default = "default_user_dir")]
    pub user_dir: PathBuf,
    /// Controller device path
    #[serde(default = "default_device")]
    pub device: String,
    /// Extra driver command line
    #[serde(default)]
    pub command_line: String,
    /// Simulated network description (built-in demo network when unset)
    #[serde(default)]
    pub network: Option<PathBuf>,
    /// Named driver options
    #[serde(default = "default_options")]
    pub options: BTreeMap<String, OptionValue>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            user_dir: default_user_dir(),
            device: default_device(),
            command_line: String::new(),
            network: None,
            options: default_options(),
        }
    }
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/openzwave/")
}

fn default_user_dir() -> PathBuf {
    PathBuf::from("./user-data/")
}

fn default_device() -> String {
    "/dev/usbzwave".to_string()
}

fn default_options() -> BTreeMap<String, OptionValue> {
    let mut options = BTreeMap::new();
    options.insert("Logging".to_string(), OptionValue::Bool(false));
    options
}

impl DriverConfig {
    /// Build the locked driver options
    pub fn driver_options(&self) -> Result<DriverOptions> {
        let mut options = DriverOptions::create(&self.config_dir, &self.user_dir, &self.command_line);
        for (name, value) in &self.options {
            options.add_option(name, value.clone())?;
        }
        options.lock();
        Ok(options)
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}
