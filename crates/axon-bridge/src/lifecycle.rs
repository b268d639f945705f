//! Bridge start-up and shutdown

use axon_core::{DeviceTree, Driver, DriverError, HomeId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::commands::CommandMarshaller;
use crate::coordinator::{Coordinator, CoordinatorHandle};
use crate::events::SessionEvent;
use crate::registry::CommandRegistry;
use crate::worker::{RetryPolicy, WriteWorker};

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to start coordinator thread: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Driver error: {0}")]
    DriverError(#[from] DriverError),
    #[error("Bridge has stopped")]
    Stopped,
}

/// Bridge tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Notifications buffered between driver threads and the coordinator
    pub handoff_capacity: usize,
    /// Writes buffered before `set` reports busy
    pub write_queue_capacity: usize,
    /// Driver writes in flight at once
    pub max_concurrent_writes: usize,
    /// Session events buffered per subscriber
    pub event_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            handoff_capacity: 1024,
            write_queue_capacity: 256,
            max_concurrent_writes: 4,
            event_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

/// A running bridge between one driver and its subscribers
pub struct Bridge {
    driver: Arc<dyn Driver>,
    coordinator: CoordinatorHandle,
    coordinator_thread: thread::JoinHandle<DeviceTree>,
    marshaller: CommandMarshaller,
    registry: CommandRegistry,
    events: broadcast::Sender<SessionEvent>,
    worker: JoinHandle<()>,
    stop_worker: oneshot::Sender<()>,
}

impl Bridge {
    /// Start the coordinator and write worker and attach them to the driver
    ///
    /// Must be called from within a Tokio runtime. No controller is opened
    /// yet, so subscribers can attach before the first notification.
    pub fn start(driver: Arc<dyn Driver>, config: &BridgeConfig) -> Result<Self, BridgeError> {
        let registry = CommandRegistry::new();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let (coordinator, coordinator_thread) =
            Coordinator::new(driver.clone(), registry.clone(), events.clone())
                .spawn(config.handoff_capacity)?;

        let worker = WriteWorker::new(
            driver.clone(),
            config.retry.clone(),
            coordinator.clone(),
            config.max_concurrent_writes,
        );
        let (writes, queue) = mpsc::channel(config.write_queue_capacity.max(1));
        let (stop_worker, stop) = oneshot::channel();
        let worker = worker.spawn(queue, stop);

        let marshaller =
            CommandMarshaller::new(driver.clone(), registry.clone(), coordinator.clone(), writes);

        driver.add_watcher(coordinator.watcher())?;
        info!(
            handoff_capacity = config.handoff_capacity,
            write_queue_capacity = config.write_queue_capacity,
            "Bridge started"
        );

        Ok(Self {
            driver,
            coordinator,
            coordinator_thread,
            marshaller,
            registry,
            events,
            worker,
            stop_worker,
        })
    }

    /// Open a controller; its network is reported through the coordinator
    pub fn add_controller(&self, device_path: &str) -> Result<(), BridgeError> {
        info!(device = %device_path, "Opening controller");
        self.driver.add_driver(device_path)?;
        Ok(())
    }

    pub fn marshaller(&self) -> CommandMarshaller {
        self.marshaller.clone()
    }

    pub fn registry(&self) -> CommandRegistry {
        self.registry.clone()
    }

    pub fn coordinator(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Sender side of the event channel, for handing out subscriptions
    pub fn events(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    /// Copy of the current tree
    pub async fn snapshot(&self) -> Result<DeviceTree, BridgeError> {
        self.coordinator.snapshot().await
    }

    /// Stop the bridge, flushing the configuration of every network
    ///
    /// Writes in flight are allowed to finish. Writes still queued are
    /// reported as [`SessionEvent::WriteFailed`] without reaching the
    /// driver, and later writes are refused. Returns the networks whose
    /// configuration was written.
    pub async fn shutdown(self) -> Result<Vec<HomeId>, BridgeError> {
        info!("Bridge shutting down");

        // The worker may already have ended if every sender was dropped
        let _ = self.stop_worker.send(());
        if let Err(e) = self.worker.await {
            error!(error = %e, "Write worker did not exit cleanly");
        }

        let home_ids = self.coordinator.snapshot().await?.home_ids();
        let mut flushed = Vec::with_capacity(home_ids.len());
        for home_id in home_ids {
            let driver = self.driver.clone();
            let result = tokio::task::spawn_blocking(move || driver.write_config(home_id))
                .await
                .unwrap_or_else(|e| Err(DriverError::Rejected(format!("flush task failed: {}", e))));
            match result {
                Ok(()) => {
                    info!(home_id = %home_id, "Configuration flushed");
                    flushed.push(home_id);
                }
                Err(e) => error!(home_id = %home_id, error = %e, "Failed to flush configuration"),
            }
        }

        self.coordinator.stop().await?;
        let thread = self.coordinator_thread;
        if !matches!(tokio::task::spawn_blocking(move || thread.join()).await, Ok(Ok(_))) {
            error!("Coordinator thread did not exit cleanly");
        }

        info!(networks = flushed.len(), "Bridge stopped");
        Ok(flushed)
    }
}
