//! Notification records delivered by the Z-Wave driver
//!
//! The driver reports everything that happens on the network as a flat
//! record: a type tag, the addressed network and node, and for value
//! notifications a description of the value. Records arrive unordered
//! across driver threads and carry loosely-typed payloads.

use serde::{Deserialize, Serialize};

use crate::ids::{HomeId, NodeId, ValueId};
use crate::value_type::StateValue;

/// Notification type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    ValueAdded,
    ValueRemoved,
    ValueChanged,
    ValueRefreshed,
    Group,
    NodeNew,
    NodeAdded,
    NodeRemoved,
    NodeProtocolInfo,
    NodeNaming,
    NodeEvent,
    PollingDisabled,
    PollingEnabled,
    DriverReady,
    DriverFailed,
    DriverReset,
    DriverRemoved,
    EssentialNodeQueriesComplete,
    NodeQueriesComplete,
    AwakeNodesQueried,
    AllNodesQueriedSomeDead,
    AllNodesQueried,
    Notification,
    /// A tag this bridge does not know about
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::ValueAdded => "ValueAdded",
            Self::ValueRemoved => "ValueRemoved",
            Self::ValueChanged => "ValueChanged",
            Self::ValueRefreshed => "ValueRefreshed",
            Self::Group => "Group",
            Self::NodeNew => "NodeNew",
            Self::NodeAdded => "NodeAdded",
            Self::NodeRemoved => "NodeRemoved",
            Self::NodeProtocolInfo => "NodeProtocolInfo",
            Self::NodeNaming => "NodeNaming",
            Self::NodeEvent => "NodeEvent",
            Self::PollingDisabled => "PollingDisabled",
            Self::PollingEnabled => "PollingEnabled",
            Self::DriverReady => "DriverReady",
            Self::DriverFailed => "DriverFailed",
            Self::DriverReset => "DriverReset",
            Self::DriverRemoved => "DriverRemoved",
            Self::EssentialNodeQueriesComplete => "EssentialNodeQueriesComplete",
            Self::NodeQueriesComplete => "NodeQueriesComplete",
            Self::AwakeNodesQueried => "AwakeNodesQueried",
            Self::AllNodesQueriedSomeDead => "AllNodesQueriedSomeDead",
            Self::AllNodesQueried => "AllNodesQueried",
            Self::Notification => "Notification",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for NotificationType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "ValueAdded" => Self::ValueAdded,
            "ValueRemoved" => Self::ValueRemoved,
            "ValueChanged" => Self::ValueChanged,
            "ValueRefreshed" => Self::ValueRefreshed,
            "Group" => Self::Group,
            "NodeNew" => Self::NodeNew,
            "NodeAdded" => Self::NodeAdded,
            "NodeRemoved" => Self::NodeRemoved,
            "NodeProtocolInfo" => Self::NodeProtocolInfo,
            "NodeNaming" => Self::NodeNaming,
            "NodeEvent" => Self::NodeEvent,
            "PollingDisabled" => Self::PollingDisabled,
            "PollingEnabled" => Self::PollingEnabled,
            "DriverReady" => Self::DriverReady,
            "DriverFailed" => Self::DriverFailed,
            "DriverReset" => Self::DriverReset,
            "DriverRemoved" => Self::DriverRemoved,
            "EssentialNodeQueriesComplete" => Self::EssentialNodeQueriesComplete,
            "NodeQueriesComplete" => Self::NodeQueriesComplete,
            "AwakeNodesQueried" => Self::AwakeNodesQueried,
            "AllNodesQueriedSomeDead" => Self::AllNodesQueriedSomeDead,
            "AllNodesQueried" => Self::AllNodesQueried,
            "Notification" => Self::Notification,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for NotificationType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<NotificationType> for String {
    fn from(kind: NotificationType) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw value type tag reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawValueType {
    Bool,
    Byte,
    Short,
    Int,
    Decimal,
    List,
    String,
    Schedule,
    Button,
    Raw,
    #[serde(other)]
    Unknown,
}

impl RawValueType {
    /// Range representable by an integer raw type, if it is one
    pub fn integer_range(&self) -> Option<(i64, i64)> {
        match self {
            Self::Byte => Some((u8::MIN as i64, u8::MAX as i64)),
            Self::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            _ => None,
        }
    }
}

/// Value description carried by value notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRecord {
    /// Driver-assigned value identifier
    pub id: ValueId,
    /// Human-readable label
    #[serde(default)]
    pub label: String,
    /// Current value as reported by the driver
    #[serde(default)]
    pub value: StateValue,
    /// Measurement units, empty when unitless
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub write_only: bool,
    /// Raw type tag
    #[serde(rename = "type")]
    pub value_type: RawValueType,
    /// Index of the value within its command class instance
    pub index: u8,
    /// Classification code, e.g. `COMMAND_CLASS_SWITCH_BINARY`
    pub command_class: String,
    /// Command class instance, starting at 1
    #[serde(default = "default_instance")]
    pub instance: u8,
}

fn default_instance() -> u8 {
    1
}

impl ValueRecord {
    /// Tree name of the value
    pub fn tree_name(&self) -> String {
        format!("value{}", self.index)
    }
}

/// Codes carried by `Notification` records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationCode {
    MsgComplete,
    Timeout,
    NoOperation,
    Awake,
    Sleep,
    Dead,
    Alive,
}

impl NotificationCode {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::MsgComplete),
            1 => Some(Self::Timeout),
            2 => Some(Self::NoOperation),
            3 => Some(Self::Awake),
            4 => Some(Self::Sleep),
            5 => Some(Self::Dead),
            6 => Some(Self::Alive),
            _ => None,
        }
    }

    /// Whether the code signals a node that stopped responding
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Timeout | Self::Dead)
    }
}

/// One driver notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Type tag
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Addressed network, [`HomeId::NONE`] if none
    #[serde(default)]
    pub home_id: HomeId,
    /// Addressed node, [`NodeId::NONE`] or [`NodeId::BROADCAST`] if none
    #[serde(default)]
    pub node_id: NodeId,
    /// Value description for value notifications
    #[serde(default, rename = "valueId", skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueRecord>,
    /// Code for `Notification` records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_code: Option<u8>,
}

impl Notification {
    /// Create a notification without a value record
    pub fn new(kind: impl Into<NotificationType>, home_id: HomeId, node_id: NodeId) -> Self {
        Self {
            kind: kind.into(),
            home_id,
            node_id,
            value: None,
            notification_code: None,
        }
    }

    /// Attach a value record
    pub fn with_value(mut self, value: ValueRecord) -> Self {
        self.value = Some(value);
        self
    }

    /// Attach a notification code
    pub fn with_code(mut self, code: u8) -> Self {
        self.notification_code = Some(code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_added() {
        let json = r#"{
            "type": "ValueAdded",
            "homeId": 1,
            "nodeId": 5,
            "valueId": {
                "id": 900,
                "index": 0,
                "instance": 1,
                "commandClass": "COMMAND_CLASS_SWITCH_BINARY",
                "type": "Bool",
                "label": "Switch",
                "value": false,
                "readOnly": false,
                "writeOnly": false
            }
        }"#;

        let notification: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.kind, NotificationType::ValueAdded);
        assert_eq!(notification.home_id, HomeId(1));
        assert_eq!(notification.node_id, NodeId(5));

        let value = notification.value.unwrap();
        assert_eq!(value.id, ValueId(900));
        assert_eq!(value.value_type, RawValueType::Bool);
        assert_eq!(value.value, StateValue::Bool(false));
        assert_eq!(value.tree_name(), "value0");
    }

    #[test]
    fn test_unknown_tags_are_kept() {
        let json = r#"{"type": "SceneEvent", "homeId": 1, "nodeId": 3}"#;
        let notification: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(
            notification.kind,
            NotificationType::Other("SceneEvent".to_string())
        );
        assert_eq!(notification.kind.to_string(), "SceneEvent");
    }

    #[test]
    fn test_unknown_raw_type() {
        let raw: RawValueType = serde_json::from_str(r#""Color""#).unwrap();
        assert_eq!(raw, RawValueType::Unknown);
    }

    #[test]
    fn test_notification_codes() {
        assert_eq!(NotificationCode::from_code(5), Some(NotificationCode::Dead));
        assert!(NotificationCode::Dead.is_fault());
        assert!(!NotificationCode::Awake.is_fault());
        assert_eq!(NotificationCode::from_code(42), None);
    }
}
