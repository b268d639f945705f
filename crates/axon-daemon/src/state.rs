//! Application state management

use anyhow::{Context, Result};
use axon_bridge::{
    Bridge, BridgeError, CommandMarshaller, CommandRegistry, CoordinatorHandle, SessionEvent,
};
use axon_core::DeviceTree;
use axon_sim::{SimDriver, SimNetwork};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::{Config, DriverConfig};

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Subscriber commands
    pub marshaller: CommandMarshaller,
    /// Registered commands
    pub registry: CommandRegistry,
    /// Coordinating thread, for tree snapshots
    pub coordinator: CoordinatorHandle,
    /// Event broadcast for WebSocket clients
    events: broadcast::Sender<SessionEvent>,
}

impl AppState {
    /// Create application state around a running bridge
    pub fn new(config: Config, bridge: &Bridge) -> Arc<Self> {
        Arc::new(Self {
            config,
            marshaller: bridge.marshaller(),
            registry: bridge.registry(),
            coordinator: bridge.coordinator(),
            events: bridge.events(),
        })
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current device tree
    pub async fn tree(&self) -> Result<DeviceTree, BridgeError> {
        self.coordinator.snapshot().await
    }
}

/// Create the driver described by the configuration
pub fn create_driver(config: &DriverConfig) -> Result<Arc<SimDriver>> {
    let options = config.driver_options()?;
    let network = match &config.network {
        Some(path) => SimNetwork::from_file(path)
            .with_context(|| format!("loading network description {}", path.display()))?,
        None => {
            info!("No network description configured, using the demo network");
            SimNetwork::demo()
        }
    };
    Ok(Arc::new(SimDriver::new(&options, network)?))
}
