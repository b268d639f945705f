//! Contract with the Z-Wave driver
//!
//! The driver is opaque: it owns the serial link to the controller, runs
//! its own threads, and reports everything through a watcher callback.
//! Implementations must be safe to call from several threads at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ids::{HomeId, NodeId, ValueId};
use crate::notification::Notification;
use crate::value_type::{MetadataSource, StateValue};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Driver is busy")]
    Busy,
    #[error("Driver call timed out")]
    Timeout,
    #[error("Driver is not ready")]
    NotReady,
    #[error("Unknown value {0}")]
    UnknownValue(ValueId),
    #[error("Unknown node {node_id} on network {home_id}")]
    UnknownNode { home_id: HomeId, node_id: NodeId },
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Driver rejected the request: {0}")]
    Rejected(String),
    #[error("Failed to open controller at {path}: {reason}")]
    Open { path: String, reason: String },
}

impl DriverError {
    /// Whether retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout | Self::NotReady)
    }
}

/// Callback receiving every notification, invoked on driver threads
pub type Watcher = Box<dyn Fn(Notification) + Send + Sync>;

/// Operations the bridge needs from the driver
pub trait Driver: MetadataSource + Send + Sync {
    /// Open a controller and start reporting its network
    fn add_driver(&self, device_path: &str) -> Result<(), DriverError>;
    fn add_watcher(&self, watcher: Watcher) -> Result<(), DriverError>;
    /// Persist the driver's configuration for one network
    fn write_config(&self, home_id: HomeId) -> Result<(), DriverError>;

    fn get_value(&self, id: ValueId) -> Result<StateValue, DriverError>;
    fn set_value(&self, id: ValueId, value: StateValue) -> Result<(), DriverError>;
    fn set_node_level(&self, home_id: HomeId, node_id: NodeId, level: u8) -> Result<(), DriverError>;
    fn set_config_param(
        &self,
        home_id: HomeId,
        node_id: NodeId,
        param: u8,
        value: i32,
    ) -> Result<(), DriverError>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionsError {
    #[error("Options are locked, cannot set '{0}'")]
    Locked(String),
    #[error("Options must be locked before the driver is created")]
    NotLocked,
}

/// Value of a named driver option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    String(String),
}

/// Driver start-up options
///
/// Options are collected, then locked; a driver only accepts locked
/// options and nothing can be changed afterwards.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    config_dir: PathBuf,
    user_dir: PathBuf,
    command_line: String,
    options: BTreeMap<String, OptionValue>,
    locked: bool,
}

impl DriverOptions {
    /// Start a set of options
    ///
    /// `config_dir` holds the driver's device database, `user_dir` is where
    /// it persists per-network configuration.
    pub fn create(
        config_dir: impl Into<PathBuf>,
        user_dir: impl Into<PathBuf>,
        command_line: impl Into<String>,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            user_dir: user_dir.into(),
            command_line: command_line.into(),
            options: BTreeMap::new(),
            locked: false,
        }
    }

    pub fn add_option_bool(&mut self, name: &str, value: bool) -> Result<(), OptionsError> {
        self.add_option(name, OptionValue::Bool(value))
    }

    pub fn add_option_string(&mut self, name: &str, value: &str) -> Result<(), OptionsError> {
        self.add_option(name, OptionValue::String(value.to_string()))
    }

    pub fn add_option(&mut self, name: &str, value: OptionValue) -> Result<(), OptionsError> {
        if self.locked {
            return Err(OptionsError::Locked(name.to_string()));
        }
        self.options.insert(name.to_string(), value);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Fail unless the options are locked
    pub fn ensure_locked(&self) -> Result<(), OptionsError> {
        if self.locked {
            Ok(())
        } else {
            Err(OptionsError::NotLocked)
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.options.get(name) {
            Some(OptionValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::String(v)) => Some(v),
            _ => None,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn user_dir(&self) -> &Path {
        &self.user_dir
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}
