//! Notification routing into the device tree
//!
//! Each tree level (manager, network, node) has a table from notification
//! type to handler, built once. A notification is offered to the manager
//! table first. Without a handler there it is delegated to the network
//! named by its home ID, then to the node named by its node ID. A
//! notification no level handles is unroutable.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ids::{HomeId, NodeId};
use crate::notification::{Notification, NotificationCode, NotificationType, ValueRecord};
use crate::tree::{DeviceTree, Network, Node, TreeChange, TreeError, TreePath};
use crate::value_type::MetadataSource;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("No handler for {kind} (home {home_id}, node {node_id})")]
    Unroutable {
        kind: NotificationType,
        home_id: HomeId,
        node_id: NodeId,
    },
    #[error("{0} notification carries no value record")]
    MissingValue(NotificationType),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

type Handler<T> =
    fn(&mut T, &Notification, &dyn MetadataSource) -> Result<Vec<TreeChange>, RouteError>;

/// Dispatches notifications to the tree level that handles them
pub struct NotificationRouter {
    manager: HashMap<NotificationType, Handler<DeviceTree>>,
    network: HashMap<NotificationType, Handler<Network>>,
    node: HashMap<NotificationType, Handler<Node>>,
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRouter {
    pub fn new() -> Self {
        let mut manager: HashMap<NotificationType, Handler<DeviceTree>> = HashMap::new();
        manager.insert(NotificationType::DriverReady, on_driver_ready);

        let mut network: HashMap<NotificationType, Handler<Network>> = HashMap::new();
        network.insert(NotificationType::NodeAdded, on_node_added);
        network.insert(NotificationType::NodeRemoved, on_node_removed);
        for kind in [
            NotificationType::NodeNew,
            NotificationType::AwakeNodesQueried,
            NotificationType::AllNodesQueried,
            NotificationType::AllNodesQueriedSomeDead,
        ] {
            network.insert(kind, informational::<Network>);
        }

        let mut node: HashMap<NotificationType, Handler<Node>> = HashMap::new();
        node.insert(NotificationType::ValueAdded, on_value_added);
        node.insert(NotificationType::ValueRemoved, on_value_removed);
        node.insert(NotificationType::ValueChanged, on_value_changed);
        node.insert(NotificationType::Notification, on_notification);
        for kind in [
            NotificationType::NodeProtocolInfo,
            NotificationType::Group,
            NotificationType::NodeNaming,
            NotificationType::EssentialNodeQueriesComplete,
        ] {
            node.insert(kind, informational::<Node>);
        }

        Self {
            manager,
            network,
            node,
        }
    }

    /// Apply one notification to the tree
    ///
    /// Returns the changes made, empty for informational notifications.
    pub fn route(
        &self,
        tree: &mut DeviceTree,
        notification: &Notification,
        metadata: &dyn MetadataSource,
    ) -> Result<Vec<TreeChange>, RouteError> {
        let kind = &notification.kind;

        if let Some(handler) = self.manager.get(kind) {
            return handler(tree, notification, metadata);
        }
        if !notification.home_id.is_set() {
            return Err(unroutable(notification));
        }

        let network = tree
            .network_mut(notification.home_id)
            .ok_or_else(|| TreeError::NotFound(TreePath::root().child(notification.home_id.tree_name())))?;
        if let Some(handler) = self.network.get(kind) {
            return handler(network, notification, metadata);
        }
        if !notification.node_id.is_addressable() {
            return Err(unroutable(notification));
        }

        let network_path = network.path();
        let node = network.node_mut(notification.node_id).ok_or_else(|| {
            TreeError::NotFound(network_path.child(notification.node_id.tree_name()))
        })?;
        if let Some(handler) = self.node.get(kind) {
            return handler(node, notification, metadata);
        }

        Err(unroutable(notification))
    }
}

fn unroutable(notification: &Notification) -> RouteError {
    RouteError::Unroutable {
        kind: notification.kind.clone(),
        home_id: notification.home_id,
        node_id: notification.node_id,
    }
}

fn value_record(notification: &Notification) -> Result<&ValueRecord, RouteError> {
    notification
        .value
        .as_ref()
        .ok_or_else(|| RouteError::MissingValue(notification.kind.clone()))
}

fn informational<T>(
    _target: &mut T,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    debug!(
        kind = %notification.kind,
        home_id = %notification.home_id,
        node_id = %notification.node_id,
        "Informational notification"
    );
    Ok(Vec::new())
}

fn on_driver_ready(
    tree: &mut DeviceTree,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    let change = tree.add_network(notification.home_id);
    if change.is_some() {
        info!(home_id = %notification.home_id, "Network ready");
    }
    Ok(change.into_iter().collect())
}

fn on_node_added(
    network: &mut Network,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    if !notification.node_id.is_addressable() {
        debug!(home_id = %network.home_id, node_id = %notification.node_id, "Ignoring node addition for a reserved node ID");
        return Ok(Vec::new());
    }
    let change = network.add_node(notification.node_id);
    if change.is_some() {
        info!(home_id = %network.home_id, node_id = %notification.node_id, "Node added");
    }
    Ok(change.into_iter().collect())
}

fn on_node_removed(
    network: &mut Network,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    if !notification.node_id.is_addressable() {
        debug!(home_id = %network.home_id, node_id = %notification.node_id, "Ignoring node removal for a reserved node ID");
        return Ok(Vec::new());
    }
    let change = network.remove_node(notification.node_id)?;
    info!(home_id = %network.home_id, node_id = %notification.node_id, "Node removed");
    Ok(vec![change])
}

fn on_value_added(
    node: &mut Node,
    notification: &Notification,
    metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    let record = value_record(notification)?;
    Ok(node.add_value(record, metadata)?)
}

fn on_value_removed(
    node: &mut Node,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    let record = value_record(notification)?;
    Ok(vec![node.remove_value(record)?])
}

fn on_value_changed(
    node: &mut Node,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    let record = value_record(notification)?;
    Ok(vec![node.update_value(record)?])
}

fn on_notification(
    node: &mut Node,
    notification: &Notification,
    _metadata: &dyn MetadataSource,
) -> Result<Vec<TreeChange>, RouteError> {
    let code = notification
        .notification_code
        .and_then(NotificationCode::from_code);
    match code {
        Some(code) if code.is_fault() => {
            warn!(node = %node.path(), code = ?code, "Node reported a fault");
        }
        Some(code) => {
            debug!(node = %node.path(), code = ?code, "Node notification");
        }
        None => {
            debug!(
                node = %node.path(),
                raw_code = ?notification.notification_code,
                "Node notification with unknown code"
            );
        }
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use crate::ids::ValueId;
    use crate::notification::RawValueType;
    use crate::tree::TreeEntry;
    use crate::value_type::{SemanticType, StateValue};

    struct Meta;

    impl MetadataSource for Meta {
        fn value_min(&self, _id: ValueId) -> Result<i64, DriverError> {
            Ok(0)
        }
        fn value_max(&self, _id: ValueId) -> Result<i64, DriverError> {
            Ok(255)
        }
        fn value_list_items(&self, _id: ValueId) -> Result<Vec<String>, DriverError> {
            Ok(vec!["A".into()])
        }
        fn value_float_precision(&self, _id: ValueId) -> Result<u8, DriverError> {
            Ok(2)
        }
        fn is_value_read_only(&self, _id: ValueId) -> Result<bool, DriverError> {
            Ok(false)
        }
        fn is_value_write_only(&self, _id: ValueId) -> Result<bool, DriverError> {
            Ok(false)
        }
    }

    fn switch_record(value: bool) -> ValueRecord {
        ValueRecord {
            id: ValueId(900),
            label: "Switch".into(),
            value: StateValue::Bool(value),
            units: String::new(),
            read_only: false,
            write_only: false,
            value_type: RawValueType::Bool,
            index: 0,
            command_class: "COMMAND_CLASS_SWITCH_BINARY".into(),
            instance: 1,
        }
    }

    fn route(
        router: &NotificationRouter,
        tree: &mut DeviceTree,
        n: Notification,
    ) -> Result<Vec<TreeChange>, RouteError> {
        router.route(tree, &n, &Meta)
    }

    #[test]
    fn test_switch_scenario() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        let home = HomeId(1);
        let node = NodeId(5);

        route(&router, &mut tree, Notification::new("DriverReady", home, NodeId::BROADCAST)).unwrap();
        route(&router, &mut tree, Notification::new("NodeAdded", home, node)).unwrap();
        match tree.lookup(&TreePath::parse("network1/node5")).unwrap() {
            TreeEntry::Node(n) => assert!(!n.has_children()),
            other => panic!("unexpected entry {:?}", other),
        }

        route(
            &router,
            &mut tree,
            Notification::new("ValueAdded", home, node).with_value(switch_record(false)),
        )
        .unwrap();
        let path = TreePath::parse("network1/node5/switchBinary/value0");
        let value = tree.value(&path).unwrap();
        assert_eq!(value.state_type, SemanticType::Boolean);
        assert_eq!(value.state, StateValue::Bool(false));

        let changes = route(
            &router,
            &mut tree,
            Notification::new("ValueChanged", home, node).with_value(switch_record(true)),
        )
        .unwrap();
        assert_eq!(
            changes,
            vec![TreeChange::ValueChanged {
                path: path.clone(),
                state: StateValue::Bool(true)
            }]
        );
        assert_eq!(tree.value(&path).unwrap().state, StateValue::Bool(true));
        assert_eq!(tree.values().len(), 1);

        route(
            &router,
            &mut tree,
            Notification::new("ValueRemoved", home, node).with_value(switch_record(true)),
        )
        .unwrap();
        assert!(tree.lookup(&TreePath::parse("network1/node5/switchBinary")).is_err());
        match tree.lookup(&TreePath::parse("network1/node5")).unwrap() {
            TreeEntry::Node(n) => assert!(!n.has_children()),
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_driver_ready() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        let first = route(&router, &mut tree, Notification::new("DriverReady", HomeId(7), NodeId(1)));
        let second = route(&router, &mut tree, Notification::new("DriverReady", HomeId(7), NodeId(1)));
        assert_eq!(first.unwrap().len(), 1);
        assert!(second.unwrap().is_empty());
        assert_eq!(tree.home_ids(), vec![HomeId(7)]);
    }

    #[test]
    fn test_unknown_type_for_missing_node_is_not_found() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));

        let err = route(&router, &mut tree, Notification::new("SceneEvent", HomeId(1), NodeId(9)))
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::Tree(TreeError::NotFound(TreePath::parse("network1/node9")))
        );
    }

    #[test]
    fn test_unroutable() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));
        tree.add_node(HomeId(1), NodeId(2)).unwrap();

        // No node addressed
        let err = route(&router, &mut tree, Notification::new("DriverReset", HomeId(1), NodeId::BROADCAST))
            .unwrap_err();
        assert!(matches!(err, RouteError::Unroutable { .. }));

        // Node exists but has no handler
        let err = route(&router, &mut tree, Notification::new("PollingEnabled", HomeId(1), NodeId(2)))
            .unwrap_err();
        assert!(matches!(err, RouteError::Unroutable { .. }));

        // No network addressed
        let err = route(&router, &mut tree, Notification::new("NodeEvent", HomeId::NONE, NodeId(2)))
            .unwrap_err();
        assert!(matches!(err, RouteError::Unroutable { .. }));
    }

    #[test]
    fn test_informational_notifications_change_nothing() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));
        tree.add_node(HomeId(1), NodeId(2)).unwrap();
        let before = tree.clone();

        for kind in ["NodeNew", "AllNodesQueried", "AwakeNodesQueried", "AllNodesQueriedSomeDead"] {
            let changes = route(&router, &mut tree, Notification::new(kind, HomeId(1), NodeId::BROADCAST));
            assert_eq!(changes, Ok(Vec::new()));
        }
        for kind in ["NodeProtocolInfo", "Group", "NodeNaming", "EssentialNodeQueriesComplete"] {
            let changes = route(&router, &mut tree, Notification::new(kind, HomeId(1), NodeId(2)));
            assert_eq!(changes, Ok(Vec::new()));
        }
        let changes = route(
            &router,
            &mut tree,
            Notification::new("Notification", HomeId(1), NodeId(2)).with_code(5),
        );
        assert_eq!(changes, Ok(Vec::new()));
        assert_eq!(tree, before);
    }

    #[test]
    fn test_value_notification_without_record() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));
        tree.add_node(HomeId(1), NodeId(2)).unwrap();

        let err = route(&router, &mut tree, Notification::new("ValueAdded", HomeId(1), NodeId(2)))
            .unwrap_err();
        assert_eq!(err, RouteError::MissingValue(NotificationType::ValueAdded));
    }

    #[test]
    fn test_node_removed_twice() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));
        tree.add_node(HomeId(1), NodeId(2)).unwrap();

        assert!(route(&router, &mut tree, Notification::new("NodeRemoved", HomeId(1), NodeId(2))).is_ok());
        let err = route(&router, &mut tree, Notification::new("NodeRemoved", HomeId(1), NodeId(2)))
            .unwrap_err();
        assert!(matches!(err, RouteError::Tree(TreeError::NotFound(_))));
    }

    #[test]
    fn test_reserved_node_ids_not_added() {
        let router = NotificationRouter::new();
        let mut tree = DeviceTree::new();
        tree.add_network(HomeId(1));
        let before = tree.clone();

        for node in [NodeId::NONE, NodeId::BROADCAST] {
            let added = route(&router, &mut tree, Notification::new("NodeAdded", HomeId(1), node));
            assert_eq!(added, Ok(Vec::new()));
            let removed = route(&router, &mut tree, Notification::new("NodeRemoved", HomeId(1), node));
            assert_eq!(removed, Ok(Vec::new()));
        }
        assert_eq!(tree, before);
        assert!(tree.lookup(&TreePath::parse("network1/node255")).is_err());
    }
}
