//! Axon Bridge - Synchronizing a Z-Wave driver with session subscribers
//!
//! This crate wires the device tree to the outside world:
//! - A coordinating thread owning the tree and emitting every event
//! - Command marshalling with capability and type checks
//! - A write worker with retry and backoff
//! - Start-up and shutdown of the whole bridge

pub mod commands;
pub mod coordinator;
pub mod events;
pub mod lifecycle;
pub mod registry;
pub mod worker;

pub use commands::{CommandError, CommandMarshaller};
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use events::SessionEvent;
pub use lifecycle::{Bridge, BridgeConfig, BridgeError};
pub use registry::{BindingTarget, CommandArgument, CommandBinding, CommandRegistry, NodeCommand};
pub use worker::{RetryPolicy, WriteCommand, WriteRequest, WriteWorker};
