//! The coordinating thread
//!
//! One dedicated thread owns the [`DeviceTree`]. Driver threads, the write
//! worker and session callers hand it work through one bounded FIFO
//! channel; it applies notifications to the tree, keeps the command
//! registry in step and is the only emitter of session events.

use axon_core::{
    DeviceTree, Driver, Notification, NotificationRouter, NotificationType, RouteError,
    TreeChange, TreeError, TreePath, Watcher,
};
use std::sync::Arc;
use std::thread;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::events::SessionEvent;
use crate::lifecycle::BridgeError;
use crate::registry::{CommandBinding, CommandRegistry};

/// Work handed to the coordinating thread
#[derive(Debug)]
pub(crate) enum Handoff {
    Notification(Notification),
    Emit(SessionEvent),
    Register(CommandBinding),
    Snapshot(oneshot::Sender<DeviceTree>),
    Stop,
}

/// Sending side of the hand-off channel
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Handoff>,
}

impl CoordinatorHandle {
    #[cfg(test)]
    pub(crate) fn for_tests(tx: mpsc::Sender<Handoff>) -> Self {
        Self { tx }
    }

    /// Watcher forwarding driver notifications to the coordinator
    ///
    /// The watcher blocks while the channel is full and must be invoked
    /// from driver threads, never from inside the async runtime.
    pub fn watcher(&self) -> Watcher {
        let tx = self.tx.clone();
        Box::new(move |notification: Notification| {
            trace!(kind = %notification.kind, node_id = %notification.node_id, "Hand-off");
            if tx.blocking_send(Handoff::Notification(notification)).is_err() {
                debug!("Coordinator stopped, notification dropped");
            }
        })
    }

    async fn send(&self, handoff: Handoff) -> Result<(), BridgeError> {
        self.tx.send(handoff).await.map_err(|_| BridgeError::Stopped)
    }

    /// Emit an event from the coordinating thread
    pub async fn emit(&self, event: SessionEvent) -> Result<(), BridgeError> {
        self.send(Handoff::Emit(event)).await
    }

    /// Register a command from the coordinating thread
    pub async fn register(&self, binding: CommandBinding) -> Result<(), BridgeError> {
        self.send(Handoff::Register(binding)).await
    }

    /// Copy of the tree as it is once every earlier hand-off is applied
    pub async fn snapshot(&self) -> Result<DeviceTree, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.send(Handoff::Snapshot(tx)).await?;
        rx.await.map_err(|_| BridgeError::Stopped)
    }

    /// Ask the coordinator to exit after the hand-offs already queued
    pub(crate) async fn stop(&self) -> Result<(), BridgeError> {
        self.send(Handoff::Stop).await
    }
}

pub struct Coordinator {
    tree: DeviceTree,
    router: NotificationRouter,
    driver: Arc<dyn Driver>,
    registry: CommandRegistry,
    events: broadcast::Sender<SessionEvent>,
}

impl Coordinator {
    pub fn new(
        driver: Arc<dyn Driver>,
        registry: CommandRegistry,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            tree: DeviceTree::new(),
            router: NotificationRouter::new(),
            driver,
            registry,
            events,
        }
    }

    /// Start the coordinating thread
    pub fn spawn(
        self,
        capacity: usize,
    ) -> Result<(CoordinatorHandle, thread::JoinHandle<DeviceTree>), BridgeError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let join = thread::Builder::new()
            .name("axon-coordinator".to_string())
            .spawn(move || self.run(rx))?;
        Ok((CoordinatorHandle { tx }, join))
    }

    /// Process hand-offs until stopped, returning the final tree
    fn run(mut self, mut rx: mpsc::Receiver<Handoff>) -> DeviceTree {
        info!("Coordinator started");
        while let Some(handoff) = rx.blocking_recv() {
            match handoff {
                Handoff::Notification(notification) => self.handle_notification(&notification),
                Handoff::Emit(event) => self.publish(event),
                Handoff::Register(binding) => self.register(binding),
                Handoff::Snapshot(reply) => {
                    let _ = reply.send(self.tree.clone());
                }
                Handoff::Stop => break,
            }
        }
        info!("Coordinator stopped");
        self.tree
    }

    fn handle_notification(&mut self, notification: &Notification) {
        match self.router.route(&mut self.tree, notification, &self.driver) {
            Ok(changes) => {
                for change in changes {
                    self.apply(change);
                }
            }
            Err(RouteError::Unroutable {
                kind,
                home_id,
                node_id,
            }) => {
                debug!(kind = %kind, home_id = %home_id, node_id = %node_id, "Unroutable notification dropped");
            }
            Err(RouteError::Tree(TreeError::NotFound(path))) => {
                warn!(kind = %notification.kind, path = %path, "Notification for a missing tree entry dropped");
            }
            Err(e) => {
                warn!(kind = %notification.kind, error = %e, "Notification not applied");
            }
        }

        if matches!(
            notification.kind,
            NotificationType::AllNodesQueried | NotificationType::AllNodesQueriedSomeDead
        ) && self.tree.network(notification.home_id).is_some()
        {
            info!(home_id = %notification.home_id, "Network queries complete");
            self.publish(SessionEvent::QueriesComplete {
                home_id: notification.home_id,
            });
        }
    }

    /// Publish a tree change and keep the registry in step with it
    fn apply(&mut self, change: TreeChange) {
        match &change {
            TreeChange::NodeAdded {
                path,
                home_id,
                node_id,
            } => {
                let binding = CommandBinding::for_node(path.clone(), *home_id, *node_id);
                self.publish(change.clone().into());
                self.register(binding);
            }
            TreeChange::ValueAdded { path, value } => {
                let binding = CommandBinding::for_value(path.clone(), value);
                self.publish(change.clone().into());
                self.register(binding);
            }
            TreeChange::NodeRemoved { path, values } => {
                let paths: Vec<TreePath> = values.iter().chain([path]).cloned().collect();
                for binding in self.registry.remove_many(&paths) {
                    debug!(path = %binding.path, "Command unregistered");
                    self.publish(SessionEvent::CommandUnregistered { path: binding.path });
                }
                self.publish(change.into());
            }
            TreeChange::ValueRemoved { path, .. } => {
                self.unregister(path);
                self.publish(change.into());
            }
            TreeChange::NetworkAdded { .. } | TreeChange::ValueChanged { .. } => {
                self.publish(change.into());
            }
        }
    }

    fn register(&mut self, binding: CommandBinding) {
        debug!(path = %binding.path, "Command registered");
        self.registry.insert(binding.clone());
        self.publish(SessionEvent::CommandRegistered(binding));
    }

    fn unregister(&mut self, path: &TreePath) {
        if self.registry.remove(path).is_some() {
            debug!(path = %path, "Command unregistered");
            self.publish(SessionEvent::CommandUnregistered { path: path.clone() });
        }
    }

    fn publish(&self, event: SessionEvent) {
        // Err only means there are no subscribers
        let _ = self.events.send(event);
    }
}
