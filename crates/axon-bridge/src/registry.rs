//! Commands visible to subscribers
//!
//! Every value is bound at its tree path with the accessors its
//! capabilities allow; every node is bound with its parameterized
//! commands. Only the coordinating thread writes the registry.

use axon_core::{HomeId, NodeId, SemanticType, TreePath, Value, ValueId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name of the node command setting the basic level
pub const SET_LEVEL: &str = "set_level";
/// Name of the node command writing a configuration parameter
pub const SET_CONFIG_PARAM: &str = "set_config_param";

/// Argument type of `set_level`
pub fn level_type() -> SemanticType {
    SemanticType::BoundedInteger { min: 0, max: 255 }
}

/// Type of the parameter number of `set_config_param`
pub fn config_param_type() -> SemanticType {
    SemanticType::BoundedInteger { min: 0, max: 255 }
}

/// Type of the value of `set_config_param`
pub fn config_value_type() -> SemanticType {
    SemanticType::BoundedInteger {
        min: i32::MIN as i64,
        max: i32::MAX as i64,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub argument_type: SemanticType,
}

impl CommandArgument {
    fn new(name: &str, argument_type: SemanticType) -> Self {
        Self {
            name: name.to_string(),
            argument_type,
        }
    }
}

/// A parameterized command with its declared argument types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCommand {
    pub name: String,
    pub arguments: Vec<CommandArgument>,
}

/// What a binding addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingTarget {
    /// Read and write accessors of one value
    Value {
        value_id: ValueId,
        state_type: SemanticType,
        get: bool,
        set: bool,
    },
    /// Commands addressed to a whole node
    Node {
        home_id: HomeId,
        node_id: NodeId,
        commands: Vec<NodeCommand>,
    },
}

/// A command bound at a tree path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandBinding {
    pub path: TreePath,
    #[serde(flatten)]
    pub target: BindingTarget,
}

impl CommandBinding {
    /// Accessors of a value, as its capabilities allow
    pub fn for_value(path: TreePath, value: &Value) -> Self {
        Self {
            path,
            target: BindingTarget::Value {
                value_id: value.id,
                state_type: value.state_type.clone(),
                get: value.readable,
                set: value.writable,
            },
        }
    }

    /// `set_level` and `set_config_param` of a node
    pub fn for_node(path: TreePath, home_id: HomeId, node_id: NodeId) -> Self {
        Self {
            path,
            target: BindingTarget::Node {
                home_id,
                node_id,
                commands: vec![
                    NodeCommand {
                        name: SET_LEVEL.to_string(),
                        arguments: vec![CommandArgument::new("level", level_type())],
                    },
                    NodeCommand {
                        name: SET_CONFIG_PARAM.to_string(),
                        arguments: vec![
                            CommandArgument::new("param", config_param_type()),
                            CommandArgument::new("value", config_value_type()),
                        ],
                    },
                ],
            },
        }
    }
}

/// Shared, read-mostly map from path to binding
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    bindings: Arc<RwLock<BTreeMap<TreePath, CommandBinding>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means a reader panicked; the map is still whole.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<TreePath, CommandBinding>> {
        match self.bindings.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<TreePath, CommandBinding>> {
        match self.bindings.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, path: &TreePath) -> Option<CommandBinding> {
        self.read().get(path).cloned()
    }

    /// Every binding, ordered by path
    pub fn list(&self) -> Vec<CommandBinding> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Bind a command, replacing any binding at the same path
    pub(crate) fn insert(&self, binding: CommandBinding) {
        self.write().insert(binding.path.clone(), binding);
    }

    pub(crate) fn remove(&self, path: &TreePath) -> Option<CommandBinding> {
        self.write().remove(path)
    }

    /// Remove several bindings under one lock, returning those that existed
    pub(crate) fn remove_many(&self, paths: &[TreePath]) -> Vec<CommandBinding> {
        let mut bindings = self.write();
        paths.iter().filter_map(|path| bindings.remove(path)).collect()
    }
}
