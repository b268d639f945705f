//! Command marshalling between subscribers and the driver
//!
//! Reads are served synchronously from the driver. Writes are checked
//! against the binding's capabilities and declared types, then queued to
//! the write worker; the caller gets a request ID back at once.

use axon_core::{Driver, DriverError, HomeId, NodeId, StateValue, TreePath, ValidationError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::coordinator::CoordinatorHandle;
use crate::events::SessionEvent;
use crate::lifecycle::BridgeError;
use crate::registry::{
    config_param_type, config_value_type, level_type, BindingTarget, CommandBinding,
    CommandRegistry, SET_CONFIG_PARAM, SET_LEVEL,
};
use crate::worker::{WriteCommand, WriteRequest};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("No command bound at '{0}'")]
    NotFound(TreePath),
    #[error("'{path}' does not support {capability}")]
    CapabilityAbsent {
        path: TreePath,
        capability: &'static str,
    },
    #[error("Invalid argument: {0}")]
    Validation(#[from] ValidationError),
    #[error("Write queue is full")]
    Busy,
    #[error("Bridge is shutting down")]
    Stopped,
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Entry point for subscriber commands
#[derive(Clone)]
pub struct CommandMarshaller {
    driver: Arc<dyn Driver>,
    registry: CommandRegistry,
    coordinator: CoordinatorHandle,
    writes: mpsc::Sender<WriteRequest>,
}

impl CommandMarshaller {
    pub fn new(
        driver: Arc<dyn Driver>,
        registry: CommandRegistry,
        coordinator: CoordinatorHandle,
        writes: mpsc::Sender<WriteRequest>,
    ) -> Self {
        Self {
            driver,
            registry,
            coordinator,
            writes,
        }
    }

    fn binding(&self, path: &TreePath) -> Result<CommandBinding, CommandError> {
        self.registry
            .get(path)
            .ok_or_else(|| CommandError::NotFound(path.clone()))
    }

    /// Read a value from the driver
    pub fn get(&self, path: &TreePath) -> Result<StateValue, CommandError> {
        match self.binding(path)?.target {
            BindingTarget::Value {
                value_id, get: true, ..
            } => Ok(self.driver.get_value(value_id)?),
            _ => Err(CommandError::CapabilityAbsent {
                path: path.clone(),
                capability: "get",
            }),
        }
    }

    /// Validate a new state and queue it for writing
    pub fn set(&self, path: &TreePath, value: StateValue) -> Result<Uuid, CommandError> {
        let BindingTarget::Value {
            value_id,
            state_type,
            set: true,
            ..
        } = self.binding(path)?.target
        else {
            return Err(CommandError::CapabilityAbsent {
                path: path.clone(),
                capability: "set",
            });
        };

        let value = state_type.validate(&value)?;
        self.enqueue(path, WriteCommand::SetValue { value_id, value })
    }

    /// Set the basic level of a node
    pub fn set_level(&self, path: &TreePath, level: i64) -> Result<Uuid, CommandError> {
        let (home_id, node_id) = self.node_command(path, SET_LEVEL)?;
        let level = as_integer(level_type().validate(&StateValue::Int(level))?) as u8;
        self.enqueue(
            path,
            WriteCommand::SetNodeLevel {
                home_id,
                node_id,
                level,
            },
        )
    }

    /// Write a configuration parameter of a node
    pub fn set_config_param(&self, path: &TreePath, param: i64, value: i64) -> Result<Uuid, CommandError> {
        let (home_id, node_id) = self.node_command(path, SET_CONFIG_PARAM)?;
        let param = as_integer(config_param_type().validate(&StateValue::Int(param))?) as u8;
        let value = as_integer(config_value_type().validate(&StateValue::Int(value))?) as i32;
        self.enqueue(
            path,
            WriteCommand::SetConfigParam {
                home_id,
                node_id,
                param,
                value,
            },
        )
    }

    /// Emit an event through the coordinating thread
    pub async fn emit_event(&self, event: SessionEvent) -> Result<(), CommandError> {
        self.coordinator.emit(event).await.map_err(stopped)
    }

    /// Register a command through the coordinating thread
    pub async fn register_command(&self, binding: CommandBinding) -> Result<(), CommandError> {
        self.coordinator.register(binding).await.map_err(stopped)
    }

    fn node_command(
        &self,
        path: &TreePath,
        command: &'static str,
    ) -> Result<(HomeId, NodeId), CommandError> {
        match self.binding(path)?.target {
            BindingTarget::Node {
                home_id,
                node_id,
                commands,
            } if commands.iter().any(|c| c.name == command) => Ok((home_id, node_id)),
            _ => Err(CommandError::CapabilityAbsent {
                path: path.clone(),
                capability: command,
            }),
        }
    }

    fn enqueue(&self, path: &TreePath, command: WriteCommand) -> Result<Uuid, CommandError> {
        let request = WriteRequest::new(path.clone(), command);
        let id = request.id;
        match self.writes.try_send(request) {
            Ok(()) => {
                debug!(request_id = %id, path = %path, "Write queued");
                Ok(id)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(path = %path, "Write queue full, write rejected");
                Err(CommandError::Busy)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CommandError::Stopped),
        }
    }
}

fn stopped(_: BridgeError) -> CommandError {
    CommandError::Stopped
}

// Validation of a bounded integer always yields an integer
fn as_integer(value: StateValue) -> i64 {
    match value {
        StateValue::Int(v) => v,
        _ => 0,
    }
}
