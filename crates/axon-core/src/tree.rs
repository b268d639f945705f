//! Device tree mirroring the Z-Wave network
//!
//! The tree has a fixed shape: networks own nodes, nodes own functional
//! groups, groups own values. Children are keyed by a name unique among
//! their siblings:
//!
//! ```text
//! network<homeId>/node<nodeId>/<group>/value<index>
//! ```
//!
//! Every mutation returns the [`TreeChange`]s it made so the owner can
//! publish them once the tree is consistent again.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ids::{HomeId, NodeId, ValueId};
use crate::naming::derive_group_name;
use crate::notification::ValueRecord;
use crate::value_type::{classify, MetadataSource, SemanticType, StateValue};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("No tree entry at '{0}'")]
    NotFound(TreePath),
    #[error("'{path}' is already bound to value {existing}")]
    Conflict { path: TreePath, existing: ValueId },
}

/// Slash-separated chain of names from the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TreePath(Vec<String>);

impl TreePath {
    /// The root of the tree
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a path, ignoring empty segments
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Path of a child with the given name
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for TreePath {
    fn from(path: String) -> Self {
        Self::parse(&path)
    }
}

impl From<&str> for TreePath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl From<TreePath> for String {
    fn from(path: TreePath) -> Self {
        path.to_string()
    }
}

impl std::fmt::Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    /// Driver-assigned identifier
    pub id: ValueId,
    /// Tree name (`value<index>`)
    pub name: String,
    pub label: String,
    pub units: String,
    /// Last state reported by the driver
    pub state: StateValue,
    pub state_type: SemanticType,
    /// Whether subscribers may read the value
    pub readable: bool,
    /// Whether subscribers may write the value
    pub writable: bool,
}

impl Value {
    /// Build a value from a driver record, classifying it and resolving
    /// its capabilities against the driver
    pub fn from_record<M>(record: &ValueRecord, metadata: &M) -> Self
    where
        M: MetadataSource + ?Sized,
    {
        let read_only = record.read_only
            || metadata
                .is_value_read_only(record.id)
                .unwrap_or(record.read_only);
        let write_only = record.write_only
            || metadata
                .is_value_write_only(record.id)
                .unwrap_or(record.write_only);

        if read_only && write_only {
            warn!(value_id = %record.id, "Value reported both read-only and write-only, keeping it readable");
        }

        Self {
            id: record.id,
            name: record.tree_name(),
            label: record.label.clone(),
            units: record.units.clone(),
            state: record.value.clone(),
            state_type: classify(record.value_type, record.id, metadata),
            readable: !write_only || read_only,
            writable: !read_only,
        }
    }
}

/// Values sharing one command class instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalGroup {
    pub name: String,
    /// Command class code the group was derived from
    pub command_class: String,
    pub instance: u8,
    values: BTreeMap<String, Value>,
}

impl FunctionalGroup {
    fn new(name: String, command_class: &str, instance: u8) -> Self {
        Self {
            name,
            command_class: command_class.to_string(),
            instance,
            values: BTreeMap::new(),
        }
    }

    fn is_for(&self, command_class: &str, instance: u8) -> bool {
        self.command_class == command_class && self.instance == instance
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One device on a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub home_id: HomeId,
    pub node_id: NodeId,
    pub name: String,
    groups: BTreeMap<String, FunctionalGroup>,
}

impl Node {
    fn new(home_id: HomeId, node_id: NodeId) -> Self {
        Self {
            home_id,
            node_id,
            name: node_id.tree_name(),
            groups: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> TreePath {
        TreePath::root()
            .child(self.home_id.tree_name())
            .child(self.name.clone())
    }

    pub fn group(&self, name: &str) -> Option<&FunctionalGroup> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &FunctionalGroup> {
        self.groups.values()
    }

    pub fn has_children(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Paths of every value under this node
    pub fn value_paths(&self) -> Vec<TreePath> {
        let path = self.path();
        self.groups
            .values()
            .flat_map(|g| {
                let group_path = path.child(g.name.clone());
                g.values
                    .keys()
                    .map(move |name| group_path.child(name.clone()))
            })
            .collect()
    }

    /// Name of the existing group holding values of this command class instance
    fn find_group(&self, command_class: &str, instance: u8) -> Option<String> {
        self.groups
            .values()
            .find(|g| g.is_for(command_class, instance))
            .map(|g| g.name.clone())
    }

    /// Take a name for a new group of this command class instance
    ///
    /// The derived name belongs to the claimant with the lowest
    /// `(instance, command_class)`. If a lower ranked group holds it, that
    /// group moves to its fallback name and the move is returned as
    /// removals and additions. Either way the names only depend on which
    /// groups exist, not on the order they arrived in.
    fn claim_group_name(&mut self, command_class: &str, instance: u8) -> (String, Vec<TreeChange>) {
        let derived = derive_group_name(command_class, instance);
        let Some(holder) = self.groups.get(&derived) else {
            return (derived, Vec::new());
        };

        if (instance, command_class) < (holder.instance, holder.command_class.as_str()) {
            let moved = self.move_group(&derived);
            (derived, moved)
        } else {
            let name = self.fallback_group_name(&derived, instance);
            warn!(
                node = %self.path(),
                command_class,
                instance,
                taken = %derived,
                name = %name,
                "Group name collision resolved"
            );
            (name, Vec::new())
        }
    }

    /// Name a group gets when its derived name is held by a higher ranked one
    fn fallback_group_name(&self, derived: &str, instance: u8) -> String {
        let (first, mut counter) = if instance > 1 {
            (format!("{}_{}", derived, instance), 2)
        } else {
            (format!("{}_2", derived), 3)
        };

        let mut candidate = first.clone();
        while self.groups.contains_key(&candidate) {
            candidate = format!("{}_{}", first, counter);
            counter += 1;
        }
        candidate
    }

    /// Move a group to its fallback name
    fn move_group(&mut self, name: &str) -> Vec<TreeChange> {
        let Some(mut group) = self.groups.remove(name) else {
            return Vec::new();
        };
        let old_path = self.path().child(name);
        group.name = self.fallback_group_name(name, group.instance);
        let new_path = self.path().child(group.name.clone());

        warn!(
            node = %self.path(),
            command_class = %group.command_class,
            instance = group.instance,
            from = %name,
            to = %group.name,
            "Group moved to resolve a name collision"
        );

        let count = group.values.len();
        let mut changes: Vec<TreeChange> = group
            .values
            .keys()
            .enumerate()
            .map(|(i, value_name)| TreeChange::ValueRemoved {
                path: old_path.child(value_name.clone()),
                group_removed: i + 1 == count,
            })
            .collect();
        changes.extend(group.values.values().map(|value| TreeChange::ValueAdded {
            path: new_path.child(value.name.clone()),
            value: value.clone(),
        }));

        self.groups.insert(group.name.clone(), group);
        changes
    }

    /// Path a value record maps to, even if its group does not exist
    fn record_path(&self, record: &ValueRecord) -> TreePath {
        let group = self
            .find_group(&record.command_class, record.instance)
            .unwrap_or_else(|| derive_group_name(&record.command_class, record.instance));
        self.path().child(group).child(record.tree_name())
    }

    /// Add a value, creating its group if needed
    ///
    /// Re-adding a value with the same ID replaces it. A different ID at
    /// the same name is a conflict and leaves the tree untouched. The
    /// returned changes end with the addition; any group moved out of the
    /// way comes first.
    pub fn add_value<M>(&mut self, record: &ValueRecord, metadata: &M) -> Result<Vec<TreeChange>, TreeError>
    where
        M: MetadataSource + ?Sized,
    {
        let (group_name, mut changes) = match self.find_group(&record.command_class, record.instance) {
            Some(name) => {
                let path = self.path().child(name.clone()).child(record.tree_name());
                if let Some(existing) = self
                    .groups
                    .get(&name)
                    .and_then(|g| g.values.get(&record.tree_name()))
                {
                    if existing.id != record.id {
                        return Err(TreeError::Conflict {
                            path,
                            existing: existing.id,
                        });
                    }
                    debug!(path = %path, "Value added again, replacing");
                }
                (name, Vec::new())
            }
            None => self.claim_group_name(&record.command_class, record.instance),
        };
        let path = self.path().child(group_name.clone()).child(record.tree_name());

        let value = Value::from_record(record, metadata);
        let group = self.groups.entry(group_name.clone()).or_insert_with(|| {
            FunctionalGroup::new(group_name, &record.command_class, record.instance)
        });
        group.values.insert(value.name.clone(), value.clone());

        debug!(path = %path, state_type = value.state_type.name(), "Value added");
        changes.push(TreeChange::ValueAdded { path, value });
        Ok(changes)
    }

    /// Remove a value, and its group if it was the last one
    pub fn remove_value(&mut self, record: &ValueRecord) -> Result<TreeChange, TreeError> {
        let path = self.record_path(record);
        let group_name = self
            .find_group(&record.command_class, record.instance)
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;

        let group = self
            .groups
            .get_mut(&group_name)
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;
        group
            .values
            .remove(&record.tree_name())
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;

        let group_removed = group.is_empty();
        if group_removed {
            self.groups.remove(&group_name);
        }

        debug!(path = %path, group_removed, "Value removed");
        Ok(TreeChange::ValueRemoved {
            path,
            group_removed,
        })
    }

    /// Overwrite the cached state of a value
    pub fn update_value(&mut self, record: &ValueRecord) -> Result<TreeChange, TreeError> {
        let path = self.record_path(record);
        let value = self
            .find_group(&record.command_class, record.instance)
            .and_then(|name| self.groups.get_mut(&name))
            .and_then(|g| g.values.get_mut(&record.tree_name()))
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;

        value.state = record.value.clone();

        debug!(path = %path, state = %value.state, "Value changed");
        Ok(TreeChange::ValueChanged {
            path,
            state: record.value.clone(),
        })
    }
}

/// One Z-Wave network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub home_id: HomeId,
    pub name: String,
    nodes: BTreeMap<String, Node>,
}

impl Network {
    fn new(home_id: HomeId) -> Self {
        Self {
            home_id,
            name: home_id.tree_name(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> TreePath {
        TreePath::root().child(self.name.clone())
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id.tree_name())
    }

    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id.tree_name())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Add a node; a node that already exists is left as it is
    pub fn add_node(&mut self, node_id: NodeId) -> Option<TreeChange> {
        let name = node_id.tree_name();
        if self.nodes.contains_key(&name) {
            debug!(home_id = %self.home_id, node_id = %node_id, "Node already present");
            return None;
        }

        let node = Node::new(self.home_id, node_id);
        let path = node.path();
        self.nodes.insert(name, node);
        Some(TreeChange::NodeAdded {
            path,
            home_id: self.home_id,
            node_id,
        })
    }

    /// Remove a node together with everything below it
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<TreeChange, TreeError> {
        let node = self
            .nodes
            .remove(&node_id.tree_name())
            .ok_or_else(|| TreeError::NotFound(self.path().child(node_id.tree_name())))?;

        Ok(TreeChange::NodeRemoved {
            values: node.value_paths(),
            path: node.path(),
        })
    }
}

/// Something found by [`DeviceTree::lookup`]
#[derive(Debug, Clone, Copy)]
pub enum TreeEntry<'a> {
    Root(&'a DeviceTree),
    Network(&'a Network),
    Node(&'a Node),
    Group(&'a FunctionalGroup),
    Value(&'a Value),
}

/// Root of the tree, owning every network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceTree {
    networks: BTreeMap<String, Network>,
}

impl DeviceTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a network; a network that already exists is left as it is
    pub fn add_network(&mut self, home_id: HomeId) -> Option<TreeChange> {
        let name = home_id.tree_name();
        if self.networks.contains_key(&name) {
            debug!(home_id = %home_id, "Network already present");
            return None;
        }

        let network = Network::new(home_id);
        let path = network.path();
        self.networks.insert(name, network);
        Some(TreeChange::NetworkAdded { path, home_id })
    }

    pub fn network(&self, home_id: HomeId) -> Option<&Network> {
        self.networks.get(&home_id.tree_name())
    }

    pub fn network_mut(&mut self, home_id: HomeId) -> Option<&mut Network> {
        self.networks.get_mut(&home_id.tree_name())
    }

    pub fn networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// Home IDs of every known network
    pub fn home_ids(&self) -> Vec<HomeId> {
        self.networks.values().map(|n| n.home_id).collect()
    }

    fn network_or_not_found(&mut self, home_id: HomeId) -> Result<&mut Network, TreeError> {
        self.networks
            .get_mut(&home_id.tree_name())
            .ok_or_else(|| TreeError::NotFound(TreePath::root().child(home_id.tree_name())))
    }

    fn node_or_not_found(&mut self, home_id: HomeId, node_id: NodeId) -> Result<&mut Node, TreeError> {
        let network = self.network_or_not_found(home_id)?;
        let path = network.path().child(node_id.tree_name());
        network.node_mut(node_id).ok_or(TreeError::NotFound(path))
    }

    pub fn add_node(&mut self, home_id: HomeId, node_id: NodeId) -> Result<Option<TreeChange>, TreeError> {
        Ok(self.network_or_not_found(home_id)?.add_node(node_id))
    }

    pub fn remove_node(&mut self, home_id: HomeId, node_id: NodeId) -> Result<TreeChange, TreeError> {
        self.network_or_not_found(home_id)?.remove_node(node_id)
    }

    pub fn add_value<M>(
        &mut self,
        home_id: HomeId,
        node_id: NodeId,
        record: &ValueRecord,
        metadata: &M,
    ) -> Result<Vec<TreeChange>, TreeError>
    where
        M: MetadataSource + ?Sized,
    {
        self.node_or_not_found(home_id, node_id)?
            .add_value(record, metadata)
    }

    pub fn remove_value(
        &mut self,
        home_id: HomeId,
        node_id: NodeId,
        record: &ValueRecord,
    ) -> Result<TreeChange, TreeError> {
        self.node_or_not_found(home_id, node_id)?.remove_value(record)
    }

    pub fn update_value(
        &mut self,
        home_id: HomeId,
        node_id: NodeId,
        record: &ValueRecord,
    ) -> Result<TreeChange, TreeError> {
        self.node_or_not_found(home_id, node_id)?.update_value(record)
    }

    /// Walk the tree along a path
    pub fn lookup(&self, path: &TreePath) -> Result<TreeEntry<'_>, TreeError> {
        let not_found = || TreeError::NotFound(path.clone());
        let segments = path.segments();

        let Some(network_name) = segments.first() else {
            return Ok(TreeEntry::Root(self));
        };
        let network = self.networks.get(network_name).ok_or_else(not_found)?;

        let Some(node_name) = segments.get(1) else {
            return Ok(TreeEntry::Network(network));
        };
        let node = network.nodes.get(node_name).ok_or_else(not_found)?;

        let Some(group_name) = segments.get(2) else {
            return Ok(TreeEntry::Node(node));
        };
        let group = node.groups.get(group_name).ok_or_else(not_found)?;

        let Some(value_name) = segments.get(3) else {
            return Ok(TreeEntry::Group(group));
        };
        let value = group.values.get(value_name).ok_or_else(not_found)?;

        if segments.len() > 4 {
            return Err(not_found());
        }
        Ok(TreeEntry::Value(value))
    }

    /// Look up a path that must name a value
    pub fn value(&self, path: &TreePath) -> Result<&Value, TreeError> {
        match self.lookup(path)? {
            TreeEntry::Value(value) => Ok(value),
            _ => Err(TreeError::NotFound(path.clone())),
        }
    }

    /// Every value in the tree with its path
    pub fn values(&self) -> Vec<(TreePath, &Value)> {
        let mut out = Vec::new();
        for network in self.networks.values() {
            for node in network.nodes.values() {
                let node_path = node.path();
                for group in node.groups.values() {
                    let group_path = node_path.child(group.name.clone());
                    for value in group.values.values() {
                        out.push((group_path.child(value.name.clone()), value));
                    }
                }
            }
        }
        out
    }
}

/// A mutation applied to the tree
#[derive(Debug, Clone, PartialEq)]
pub enum TreeChange {
    NetworkAdded {
        path: TreePath,
        home_id: HomeId,
    },
    NodeAdded {
        path: TreePath,
        home_id: HomeId,
        node_id: NodeId,
    },
    /// A node and every value below it were removed
    NodeRemoved {
        path: TreePath,
        values: Vec<TreePath>,
    },
    ValueAdded {
        path: TreePath,
        value: Value,
    },
    ValueChanged {
        path: TreePath,
        state: StateValue,
    },
    ValueRemoved {
        path: TreePath,
        group_removed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use crate::notification::RawValueType;

    struct NoMetadata;

    impl MetadataSource for NoMetadata {
        fn value_min(&self, _id: ValueId) -> Result<i64, DriverError> {
            Ok(0)
        }
        fn value_max(&self, _id: ValueId) -> Result<i64, DriverError> {
            Ok(99)
        }
        fn value_list_items(&self, id: ValueId) -> Result<Vec<String>, DriverError> {
            Err(DriverError::UnknownValue(id))
        }
        fn value_float_precision(&self, _id: ValueId) -> Result<u8, DriverError> {
            Ok(1)
        }
        fn is_value_read_only(&self, _id: ValueId) -> Result<bool, DriverError> {
            Ok(false)
        }
        fn is_value_write_only(&self, _id: ValueId) -> Result<bool, DriverError> {
            Ok(false)
        }
    }

    fn record(id: u64, command_class: &str, instance: u8, index: u8) -> ValueRecord {
        ValueRecord {
            id: ValueId(id),
            label: "Level".to_string(),
            value: StateValue::Int(0),
            units: String::new(),
            read_only: false,
            write_only: false,
            value_type: RawValueType::Byte,
            index,
            command_class: command_class.to_string(),
            instance,
        }
    }

    fn tree_with_node() -> DeviceTree {
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));
        tree.add_node(HomeId(1), NodeId(5)).unwrap();
        tree
    }

    #[test]
    fn test_path_parse_and_display() {
        let path = TreePath::parse("/network1//node5/switchBinary/value0/");
        assert_eq!(path.segments().len(), 4);
        assert_eq!(path.to_string(), "network1/node5/switchBinary/value0");
        assert_eq!(path.name(), Some("value0"));
        assert!(TreePath::parse("").is_root());
    }

    #[test]
    fn test_add_network_idempotent() {
        let mut tree = DeviceTree::new();
        assert!(tree.add_network(HomeId(1)).is_some());
        assert!(tree.add_network(HomeId(1)).is_none());
        assert_eq!(tree.home_ids(), vec![HomeId(1)]);
    }

    #[test]
    fn test_add_and_remove_value_restores_shape() {
        let mut tree = tree_with_node();
        let before = tree.clone();

        let r = record(10, "COMMAND_CLASS_SWITCH_MULTILEVEL", 1, 0);
        let mut changes = tree.add_value(HomeId(1), NodeId(5), &r, &NoMetadata).unwrap();
        assert_eq!(changes.len(), 1);
        match changes.remove(0) {
            TreeChange::ValueAdded { path, value } => {
                assert_eq!(path.to_string(), "network1/node5/switchMultilevel/value0");
                assert_eq!(value.state_type, SemanticType::BoundedInteger { min: 0, max: 99 });
            }
            other => panic!("unexpected change {:?}", other),
        }

        let change = tree.remove_value(HomeId(1), NodeId(5), &r).unwrap();
        assert_eq!(
            change,
            TreeChange::ValueRemoved {
                path: TreePath::parse("network1/node5/switchMultilevel/value0"),
                group_removed: true,
            }
        );
        assert_eq!(tree, before);
    }

    #[test]
    fn test_group_kept_while_values_remain() {
        let mut tree = tree_with_node();
        let a = record(10, "COMMAND_CLASS_METER", 1, 0);
        let b = record(11, "COMMAND_CLASS_METER", 1, 1);
        tree.add_value(HomeId(1), NodeId(5), &a, &NoMetadata).unwrap();
        tree.add_value(HomeId(1), NodeId(5), &b, &NoMetadata).unwrap();

        let change = tree.remove_value(HomeId(1), NodeId(5), &a).unwrap();
        assert!(matches!(change, TreeChange::ValueRemoved { group_removed: false, .. }));
        assert!(tree.lookup(&TreePath::parse("network1/node5/meter/value1")).is_ok());
    }

    #[test]
    fn test_instances_get_separate_groups() {
        let mut tree = tree_with_node();
        tree.add_value(HomeId(1), NodeId(5), &record(1, "COMMAND_CLASS_SWITCH_BINARY", 1, 0), &NoMetadata)
            .unwrap();
        tree.add_value(HomeId(1), NodeId(5), &record(2, "COMMAND_CLASS_SWITCH_BINARY", 2, 0), &NoMetadata)
            .unwrap();

        assert!(tree.value(&TreePath::parse("network1/node5/switchBinary/value0")).is_ok());
        assert!(tree.value(&TreePath::parse("network1/node5/switchBinary2/value0")).is_ok());
    }

    #[test]
    fn test_group_name_collision_not_overwritten() {
        let mut tree = tree_with_node();
        // Both derive to "meter2"
        let first = record(1, "COMMAND_CLASS_METER", 2, 0);
        let second = record(2, "COMMAND_CLASS_METER2", 1, 0);
        tree.add_value(HomeId(1), NodeId(5), &first, &NoMetadata).unwrap();
        let changes = tree.add_value(HomeId(1), NodeId(5), &second, &NoMetadata).unwrap();

        // The instance 2 group moves out of the way
        assert_eq!(
            changes,
            vec![
                TreeChange::ValueRemoved {
                    path: TreePath::parse("network1/node5/meter2/value0"),
                    group_removed: true,
                },
                TreeChange::ValueAdded {
                    path: TreePath::parse("network1/node5/meter2_2/value0"),
                    value: tree
                        .value(&TreePath::parse("network1/node5/meter2_2/value0"))
                        .unwrap()
                        .clone(),
                },
                TreeChange::ValueAdded {
                    path: TreePath::parse("network1/node5/meter2/value0"),
                    value: tree
                        .value(&TreePath::parse("network1/node5/meter2/value0"))
                        .unwrap()
                        .clone(),
                },
            ]
        );
        assert_eq!(
            tree.value(&TreePath::parse("network1/node5/meter2/value0")).unwrap().id,
            ValueId(2)
        );
        assert_eq!(
            tree.value(&TreePath::parse("network1/node5/meter2_2/value0")).unwrap().id,
            ValueId(1)
        );

        // Removal finds the moved group through its command class
        let change = tree.remove_value(HomeId(1), NodeId(5), &first).unwrap();
        assert_eq!(
            change,
            TreeChange::ValueRemoved {
                path: TreePath::parse("network1/node5/meter2_2/value0"),
                group_removed: true,
            }
        );
        assert!(tree.value(&TreePath::parse("network1/node5/meter2/value0")).is_ok());
    }

    #[test]
    fn test_group_name_collision_independent_of_order() {
        let security = record(1, "COMMAND_CLASS_SECURITY", 2, 0);
        let security_2 = record(2, "COMMAND_CLASS_SECURITY_2", 1, 0);

        let names = |records: [&ValueRecord; 2]| {
            let mut tree = tree_with_node();
            for r in records {
                tree.add_value(HomeId(1), NodeId(5), r, &NoMetadata).unwrap();
            }
            let resolved: Vec<(String, ValueId)> = tree
                .values()
                .into_iter()
                .map(|(path, value)| (path.to_string(), value.id))
                .collect();
            resolved
        };

        let forward = names([&security, &security_2]);
        let backward = names([&security_2, &security]);
        assert_eq!(forward, backward);
        assert_eq!(
            forward,
            vec![
                ("network1/node5/security2/value0".to_string(), ValueId(2)),
                ("network1/node5/security2_2/value0".to_string(), ValueId(1)),
            ]
        );
    }

    #[test]
    fn test_instance_one_collision_ranked_by_code() {
        let mut tree = tree_with_node();
        // Prefix stripped or not, both derive to "basic"
        tree.add_value(HomeId(1), NodeId(5), &record(1, "COMMAND_CLASS_BASIC", 1, 0), &NoMetadata)
            .unwrap();
        tree.add_value(HomeId(1), NodeId(5), &record(2, "BASIC", 1, 0), &NoMetadata)
            .unwrap();

        assert_eq!(
            tree.value(&TreePath::parse("network1/node5/basic/value0")).unwrap().id,
            ValueId(2)
        );
        assert_eq!(
            tree.value(&TreePath::parse("network1/node5/basic_2/value0")).unwrap().id,
            ValueId(1)
        );
    }

    #[test]
    fn test_value_conflict() {
        let mut tree = tree_with_node();
        tree.add_value(HomeId(1), NodeId(5), &record(1, "COMMAND_CLASS_BASIC", 1, 0), &NoMetadata)
            .unwrap();
        let err = tree
            .add_value(HomeId(1), NodeId(5), &record(2, "COMMAND_CLASS_BASIC", 1, 0), &NoMetadata)
            .unwrap_err();
        assert!(matches!(err, TreeError::Conflict { existing: ValueId(1), .. }));
    }

    #[test]
    fn test_update_value() {
        let mut tree = tree_with_node();
        let mut r = record(1, "COMMAND_CLASS_BASIC", 1, 0);
        tree.add_value(HomeId(1), NodeId(5), &r, &NoMetadata).unwrap();

        r.value = StateValue::Int(42);
        tree.update_value(HomeId(1), NodeId(5), &r).unwrap();
        let value = tree.value(&TreePath::parse("network1/node5/basic/value0")).unwrap();
        assert_eq!(value.state, StateValue::Int(42));
    }

    #[test]
    fn test_missing_targets_are_not_found() {
        let mut tree = tree_with_node();
        let r = record(1, "COMMAND_CLASS_BASIC", 1, 0);

        assert_eq!(
            tree.remove_value(HomeId(1), NodeId(5), &r),
            Err(TreeError::NotFound(TreePath::parse("network1/node5/basic/value0")))
        );
        assert!(tree.update_value(HomeId(1), NodeId(5), &r).is_err());
        assert_eq!(
            tree.remove_node(HomeId(1), NodeId(9)),
            Err(TreeError::NotFound(TreePath::parse("network1/node9")))
        );
        assert_eq!(
            tree.add_node(HomeId(2), NodeId(1)),
            Err(TreeError::NotFound(TreePath::parse("network2")))
        );
        assert!(tree.lookup(&TreePath::parse("network1/node5/basic")).is_err());
        assert!(tree.lookup(&TreePath::parse("network1/node5/a/b/c")).is_err());
    }

    #[test]
    fn test_remove_node_drops_subtree() {
        let mut tree = tree_with_node();
        tree.add_value(HomeId(1), NodeId(5), &record(1, "COMMAND_CLASS_BASIC", 1, 0), &NoMetadata)
            .unwrap();
        tree.add_value(HomeId(1), NodeId(5), &record(2, "COMMAND_CLASS_METER", 1, 3), &NoMetadata)
            .unwrap();

        let change = tree.remove_node(HomeId(1), NodeId(5)).unwrap();
        match change {
            TreeChange::NodeRemoved { path, values } => {
                assert_eq!(path.to_string(), "network1/node5");
                assert_eq!(values.len(), 2);
            }
            other => panic!("unexpected change {:?}", other),
        }
        assert!(tree.values().is_empty());
        assert!(matches!(
            tree.lookup(&TreePath::parse("network1")),
            Ok(TreeEntry::Network(n)) if n.nodes().count() == 0
        ));
    }

    #[test]
    fn test_capabilities() {
        let mut r = record(1, "COMMAND_CLASS_BASIC", 1, 0);
        let value = Value::from_record(&r, &NoMetadata);
        assert!(value.readable && value.writable);

        r.read_only = true;
        let value = Value::from_record(&r, &NoMetadata);
        assert!(value.readable && !value.writable);

        r.read_only = false;
        r.write_only = true;
        let value = Value::from_record(&r, &NoMetadata);
        assert!(!value.readable && value.writable);
    }
}
