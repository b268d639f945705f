//! Axon Core - Device tree, value typing, and notification routing
//!
//! This crate holds the synchronous heart of the Axon Z-Wave bridge:
//! - Driver notification records and the driver contract
//! - Semantic typing of driver values
//! - Functional group naming from command class codes
//! - The network/node/group/value tree and the router that keeps it
//!   in step with the driver

pub mod driver;
pub mod ids;
pub mod naming;
pub mod notification;
pub mod router;
pub mod tree;
pub mod value_type;

pub use driver::{Driver, DriverError, DriverOptions, OptionValue, OptionsError, Watcher};
pub use ids::{HomeId, NodeId, ValueId};
pub use naming::derive_group_name;
pub use notification::{Notification, NotificationCode, NotificationType, RawValueType, ValueRecord};
pub use router::{NotificationRouter, RouteError};
pub use tree::{DeviceTree, FunctionalGroup, Network, Node, TreeChange, TreeEntry, TreeError, TreePath, Value};
pub use value_type::{classify, MetadataSource, SemanticType, StateValue, ValidationError};
