//! Description of a simulated network
//!
//! A network is described in TOML: one home ID and a list of nodes, each
//! with the values it reports.
//!
//! ```toml
//! home_id = 1
//!
//! [[node]]
//! node_id = 5
//!
//! [[node.value]]
//! id = 900
//! label = "Switch"
//! type = "Bool"
//! command_class = "COMMAND_CLASS_SWITCH_BINARY"
//! index = 0
//! value = false
//! ```

use axon_core::{HomeId, NodeId, RawValueType, StateValue, ValueId, ValueRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Failed to read network description: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse network description: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Duplicate value id {0}")]
    DuplicateValue(ValueId),
    #[error("Duplicate node id {0}")]
    DuplicateNode(NodeId),
    #[error("Node id {0} is reserved")]
    ReservedNode(NodeId),
}

/// Small network used when no description is configured
pub const DEMO_NETWORK: &str = r#"
home_id = 3735928559

[[node]]
node_id = 2

[[node.value]]
id = 72057594076463104
label = "Switch"
type = "Bool"
command_class = "COMMAND_CLASS_SWITCH_BINARY"
index = 0
value = false

[[node.value]]
id = 72057594093273218
label = "Power"
type = "Decimal"
command_class = "COMMAND_CLASS_METER"
index = 8
value = 0.0
units = "W"
read_only = true
precision = 1

[[node]]
node_id = 3

[[node.value]]
id = 72057594093060097
label = "Level"
type = "Byte"
command_class = "COMMAND_CLASS_SWITCH_MULTILEVEL"
index = 0
value = 0
min = 0
max = 99

[[node.value]]
id = 72057594093060100
label = "Mode"
type = "List"
command_class = "COMMAND_CLASS_THERMOSTAT_MODE"
index = 0
value = "Off"
items = ["Off", "Heat", "Cool", "Auto"]

[[node.value]]
id = 72057594093060101
label = "Reset Meter"
type = "Button"
command_class = "COMMAND_CLASS_METER"
instance = 2
index = 33
value = false
write_only = true
"#;

/// One simulated value and the metadata the driver answers for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimValue {
    pub id: ValueId,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub value_type: RawValueType,
    pub command_class: String,
    #[serde(default = "default_instance")]
    pub instance: u8,
    pub index: u8,
    pub value: StateValue,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub write_only: bool,
    /// Lower bound for integer values, defaults to the type width
    #[serde(default)]
    pub min: Option<i64>,
    /// Upper bound for integer values, defaults to the type width
    #[serde(default)]
    pub max: Option<i64>,
    /// Items of list values
    #[serde(default)]
    pub items: Vec<String>,
    /// Precision of decimal values
    #[serde(default)]
    pub precision: Option<u8>,
}

fn default_instance() -> u8 {
    1
}

impl SimValue {
    /// The record the driver reports for this value
    pub fn to_record(&self) -> ValueRecord {
        ValueRecord {
            id: self.id,
            label: self.label.clone(),
            value: self.value.clone(),
            units: self.units.clone(),
            read_only: self.read_only,
            write_only: self.write_only,
            value_type: self.value_type,
            index: self.index,
            command_class: self.command_class.clone(),
            instance: self.instance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimNode {
    pub node_id: NodeId,
    #[serde(default, rename = "value")]
    pub values: Vec<SimValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimNetwork {
    pub home_id: HomeId,
    #[serde(default, rename = "node")]
    pub nodes: Vec<SimNode>,
}

impl SimNetwork {
    /// Load a network description from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, NetworkError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a network description from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, NetworkError> {
        let network: SimNetwork = toml::from_str(content)?;
        network.validate()?;
        Ok(network)
    }

    /// The built-in demo network
    pub fn demo() -> Self {
        Self::from_toml(DEMO_NETWORK).unwrap_or_else(|_| Self {
            home_id: HomeId(1),
            nodes: Vec::new(),
        })
    }

    fn validate(&self) -> Result<(), NetworkError> {
        let mut nodes = HashSet::new();
        let mut values = HashSet::new();
        for node in &self.nodes {
            if !node.node_id.is_addressable() {
                return Err(NetworkError::ReservedNode(node.node_id));
            }
            if !nodes.insert(node.node_id) {
                return Err(NetworkError::DuplicateNode(node.node_id));
            }
            for value in &node.values {
                if !values.insert(value.id) {
                    return Err(NetworkError::DuplicateValue(value.id));
                }
            }
        }
        Ok(())
    }
}
