//! Identifiers assigned by the Z-Wave driver

use serde::{Deserialize, Serialize};

/// Identifier of one Z-Wave network (the controller's home ID)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HomeId(pub u32);

impl HomeId {
    /// Home ID the driver reports when a notification is not tied to a network
    pub const NONE: HomeId = HomeId(0);

    /// Whether this ID addresses an actual network
    pub fn is_set(&self) -> bool {
        *self != Self::NONE
    }

    /// Tree name of the network with this home ID
    pub fn tree_name(&self) -> String {
        format!("network{}", self.0)
    }
}

impl std::fmt::Display for HomeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a node, unique within its network
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u8);

impl NodeId {
    /// No node
    pub const NONE: NodeId = NodeId(0);
    /// Broadcast address, used by the driver for controller-wide notifications
    pub const BROADCAST: NodeId = NodeId(255);

    /// Whether this ID addresses a single node
    pub fn is_addressable(&self) -> bool {
        *self != Self::NONE && *self != Self::BROADCAST
    }

    /// Tree name of the node with this ID
    pub fn tree_name(&self) -> String {
        format!("node{}", self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Driver-assigned value identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueId(pub u64);

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
