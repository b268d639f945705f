//! Events published to subscribers

use axon_core::{HomeId, NodeId, StateValue, TreeChange, TreePath, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::CommandBinding;

/// Session event, emitted only from the coordinating thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    NetworkReady {
        path: TreePath,
        home_id: HomeId,
    },
    /// The driver finished its initial queries of a network
    QueriesComplete {
        home_id: HomeId,
    },
    NodeAdded {
        path: TreePath,
        home_id: HomeId,
        node_id: NodeId,
    },
    NodeRemoved {
        path: TreePath,
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
    CommandRegistered(CommandBinding),
    CommandUnregistered {
        path: TreePath,
    },
    /// A queued write gave up
    WriteFailed {
        request_id: Uuid,
        path: TreePath,
        error: String,
        attempts: u32,
        failed_at: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Tree path the event concerns, if any
    pub fn path(&self) -> Option<&TreePath> {
        match self {
            Self::NetworkReady { path, .. }
            | Self::NodeAdded { path, .. }
            | Self::NodeRemoved { path }
            | Self::ValueAdded { path, .. }
            | Self::ValueChanged { path, .. }
            | Self::ValueRemoved { path, .. }
            | Self::CommandUnregistered { path }
            | Self::WriteFailed { path, .. } => Some(path),
            Self::CommandRegistered(binding) => Some(&binding.path),
            Self::QueriesComplete { .. } => None,
        }
    }
}

impl From<TreeChange> for SessionEvent {
    fn from(change: TreeChange) -> Self {
        match change {
            TreeChange::NetworkAdded { path, home_id } => Self::NetworkReady { path, home_id },
            TreeChange::NodeAdded {
                path,
                home_id,
                node_id,
            } => Self::NodeAdded {
                path,
                home_id,
                node_id,
            },
            TreeChange::NodeRemoved { path, .. } => Self::NodeRemoved { path },
            TreeChange::ValueAdded { path, value } => Self::ValueAdded { path, value },
            TreeChange::ValueChanged { path, state } => Self::ValueChanged { path, state },
            TreeChange::ValueRemoved {
                path,
                group_removed,
            } => Self::ValueRemoved {
                path,
                group_removed,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = SessionEvent::ValueChanged {
            path: TreePath::parse("network1/node5/switchBinary/value0"),
            state: StateValue::Bool(true),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "value_changed");
        assert_eq!(json["data"]["path"], "network1/node5/switchBinary/value0");
        assert_eq!(json["data"]["state"], true);
    }

    #[test]
    fn test_from_tree_change() {
        let event = SessionEvent::from(TreeChange::NodeRemoved {
            path: TreePath::parse("network1/node5"),
            values: vec![TreePath::parse("network1/node5/basic/value0")],
        });
        assert_eq!(
            event,
            SessionEvent::NodeRemoved {
                path: TreePath::parse("network1/node5")
            }
        );
        assert_eq!(event.path().map(|p| p.to_string()), Some("network1/node5".to_string()));
    }
}
