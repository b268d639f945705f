//! Simulated driver
//!
//! Notifications are queued to a dedicated driver thread which invokes
//! every watcher in order, so watchers run outside the caller's context
//! exactly as they do with a hardware driver.

use axon_core::{
    Driver, DriverError, DriverOptions, HomeId, MetadataSource, NodeId, Notification,
    NotificationType, OptionsError, RawValueType, StateValue, ValueId, Watcher,
};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::network::{SimNetwork, SimValue};

/// Controller node reported with network-wide notifications
const CONTROLLER_NODE: NodeId = NodeId(1);

/// Command class whose level value follows `set_node_level`
const LEVEL_COMMAND_CLASS: &str = "COMMAND_CLASS_SWITCH_MULTILEVEL";

/// A write the driver accepted
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCall {
    Value { id: ValueId, value: StateValue },
    NodeLevel { home_id: HomeId, node_id: NodeId, level: u8 },
    ConfigParam { home_id: HomeId, node_id: NodeId, param: u8, value: i32 },
}

#[derive(Default)]
struct SimState {
    opened: bool,
    nodes: HashMap<NodeId, Vec<ValueId>>,
    values: HashMap<ValueId, (NodeId, SimValue)>,
    injected_failures: VecDeque<DriverError>,
    write_delay: Option<Duration>,
    writes: Vec<WriteCall>,
    config_writes: Vec<HomeId>,
}

/// In-process driver serving one simulated network
pub struct SimDriver {
    home_id: HomeId,
    network: SimNetwork,
    log_notifications: bool,
    state: Mutex<SimState>,
    watchers: Arc<RwLock<Vec<Watcher>>>,
    queue: Mutex<mpsc::Sender<Notification>>,
}

impl SimDriver {
    /// Create a driver for a network; the options must already be locked
    pub fn new(options: &DriverOptions, network: SimNetwork) -> Result<Self, OptionsError> {
        options.ensure_locked()?;

        let watchers: Arc<RwLock<Vec<Watcher>>> = Arc::new(RwLock::new(Vec::new()));
        let (queue, rx) = mpsc::channel::<Notification>();
        let delivery = watchers.clone();
        thread::spawn(move || {
            while let Ok(notification) = rx.recv() {
                let watchers = match delivery.read() {
                    Ok(w) => w,
                    Err(poisoned) => poisoned.into_inner(),
                };
                for watcher in watchers.iter() {
                    watcher(notification.clone());
                }
            }
        });

        let mut state = SimState::default();
        for node in &network.nodes {
            state
                .nodes
                .insert(node.node_id, node.values.iter().map(|v| v.id).collect());
            for value in &node.values {
                state.values.insert(value.id, (node.node_id, value.clone()));
            }
        }

        info!(
            config_dir = %options.config_dir().display(),
            user_dir = %options.user_dir().display(),
            home_id = %network.home_id,
            nodes = network.nodes.len(),
            "Simulated driver created"
        );

        Ok(Self {
            home_id: network.home_id,
            network,
            log_notifications: options.get_bool("Logging").unwrap_or(false),
            state: Mutex::new(state),
            watchers,
            queue: Mutex::new(queue),
        })
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a notification for delivery on the driver thread
    pub fn emit(&self, notification: Notification) {
        if self.log_notifications {
            debug!(kind = %notification.kind, node_id = %notification.node_id, "Driver notification");
        }
        let queue = match self.queue.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        if queue.send(notification).is_err() {
            warn!("Driver thread has stopped, notification dropped");
        }
    }

    /// Fail the next write with `error`, `count` times
    pub fn fail_next_writes(&self, error: DriverError, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.injected_failures.push_back(error.clone());
        }
    }

    /// Make every write take at least `delay`
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.state().write_delay = delay;
    }

    /// Writes accepted so far
    pub fn writes(&self) -> Vec<WriteCall> {
        self.state().writes.clone()
    }

    /// Networks whose configuration was written
    pub fn config_writes(&self) -> Vec<HomeId> {
        self.state().config_writes.clone()
    }

    /// Simulate a node leaving the network
    pub fn remove_node(&self, node_id: NodeId) -> Result<(), DriverError> {
        let removed: Vec<SimValue> = {
            let mut state = self.state();
            let ids = state.nodes.remove(&node_id).ok_or(DriverError::UnknownNode {
                home_id: self.home_id,
                node_id,
            })?;
            ids.iter()
                .filter_map(|id| state.values.remove(id).map(|(_, v)| v))
                .collect()
        };

        for value in removed {
            self.emit(
                Notification::new(NotificationType::ValueRemoved, self.home_id, node_id)
                    .with_value(value.to_record()),
            );
        }
        self.emit(Notification::new(NotificationType::NodeRemoved, self.home_id, node_id));
        Ok(())
    }

    /// Simulate a device reporting a new value on its own
    pub fn report_value(&self, id: ValueId, value: StateValue) -> Result<(), DriverError> {
        let (node_id, sim) = {
            let mut state = self.state();
            let (node_id, sim) = state.values.get_mut(&id).ok_or(DriverError::UnknownValue(id))?;
            sim.value = value;
            (*node_id, sim.clone())
        };
        self.emit(
            Notification::new(NotificationType::ValueChanged, self.home_id, node_id)
                .with_value(sim.to_record()),
        );
        Ok(())
    }

    /// Take the next injected failure and apply the write delay
    fn begin_write(&self) -> Result<(), DriverError> {
        let (failure, delay) = {
            let mut state = self.state();
            (state.injected_failures.pop_front(), state.write_delay)
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn with_value<T>(&self, id: ValueId, f: impl FnOnce(&SimValue) -> T) -> Result<T, DriverError> {
        self.state()
            .values
            .get(&id)
            .map(|(_, v)| f(v))
            .ok_or(DriverError::UnknownValue(id))
    }

    fn check_node(&self, home_id: HomeId, node_id: NodeId) -> Result<(), DriverError> {
        if home_id == self.home_id && self.state().nodes.contains_key(&node_id) {
            Ok(())
        } else {
            Err(DriverError::UnknownNode { home_id, node_id })
        }
    }
}

impl MetadataSource for SimDriver {
    fn value_min(&self, id: ValueId) -> Result<i64, DriverError> {
        self.with_value(id, |v| {
            v.min
                .or_else(|| v.value_type.integer_range().map(|(min, _)| min))
        })?
        .ok_or_else(|| DriverError::Unsupported(format!("minimum of value {}", id)))
    }

    fn value_max(&self, id: ValueId) -> Result<i64, DriverError> {
        self.with_value(id, |v| {
            v.max
                .or_else(|| v.value_type.integer_range().map(|(_, max)| max))
        })?
        .ok_or_else(|| DriverError::Unsupported(format!("maximum of value {}", id)))
    }

    fn value_list_items(&self, id: ValueId) -> Result<Vec<String>, DriverError> {
        let (value_type, items) = self.with_value(id, |v| (v.value_type, v.items.clone()))?;
        if value_type != RawValueType::List {
            return Err(DriverError::Unsupported(format!("list items of value {}", id)));
        }
        Ok(items)
    }

    fn value_float_precision(&self, id: ValueId) -> Result<u8, DriverError> {
        self.with_value(id, |v| v.precision)?
            .ok_or_else(|| DriverError::Unsupported(format!("precision of value {}", id)))
    }

    fn is_value_read_only(&self, id: ValueId) -> Result<bool, DriverError> {
        self.with_value(id, |v| v.read_only)
    }

    fn is_value_write_only(&self, id: ValueId) -> Result<bool, DriverError> {
        self.with_value(id, |v| v.write_only)
    }
}

impl Driver for SimDriver {
    fn add_driver(&self, device_path: &str) -> Result<(), DriverError> {
        {
            let mut state = self.state();
            if state.opened {
                return Err(DriverError::Rejected(format!(
                    "controller {} is already open",
                    device_path
                )));
            }
            state.opened = true;
        }

        info!(device = %device_path, home_id = %self.home_id, "Simulated controller opened");

        let home_id = self.home_id;
        self.emit(Notification::new(NotificationType::DriverReady, home_id, CONTROLLER_NODE));
        for node in &self.network.nodes {
            self.emit(Notification::new(NotificationType::NodeAdded, home_id, node.node_id));
            self.emit(Notification::new(NotificationType::NodeProtocolInfo, home_id, node.node_id));
            for value in &node.values {
                self.emit(
                    Notification::new(NotificationType::ValueAdded, home_id, node.node_id)
                        .with_value(value.to_record()),
                );
            }
            self.emit(Notification::new(
                NotificationType::EssentialNodeQueriesComplete,
                home_id,
                node.node_id,
            ));
        }
        self.emit(Notification::new(NotificationType::AllNodesQueried, home_id, NodeId::BROADCAST));
        Ok(())
    }

    fn add_watcher(&self, watcher: Watcher) -> Result<(), DriverError> {
        match self.watchers.write() {
            Ok(mut watchers) => watchers.push(watcher),
            Err(poisoned) => poisoned.into_inner().push(watcher),
        }
        Ok(())
    }

    fn write_config(&self, home_id: HomeId) -> Result<(), DriverError> {
        if home_id != self.home_id {
            return Err(DriverError::Rejected(format!("unknown network {}", home_id)));
        }
        self.state().config_writes.push(home_id);
        info!(home_id = %home_id, "Configuration written");
        Ok(())
    }

    fn get_value(&self, id: ValueId) -> Result<StateValue, DriverError> {
        self.with_value(id, |v| v.value.clone())
    }

    fn set_value(&self, id: ValueId, value: StateValue) -> Result<(), DriverError> {
        self.begin_write()?;

        let (node_id, sim) = {
            let mut state = self.state();
            let (node_id, sim) = state.values.get_mut(&id).ok_or(DriverError::UnknownValue(id))?;
            if sim.read_only {
                return Err(DriverError::Rejected(format!("value {} is read-only", id)));
            }
            sim.value = value.clone();
            let reported = (*node_id, sim.clone());
            state.writes.push(WriteCall::Value { id, value });
            reported
        };

        trace!(value_id = %id, "Value written");
        // Write-only values (buttons) have no state to report back
        if !sim.write_only {
            self.emit(
                Notification::new(NotificationType::ValueChanged, self.home_id, node_id)
                    .with_value(sim.to_record()),
            );
        }
        Ok(())
    }

    fn set_node_level(&self, home_id: HomeId, node_id: NodeId, level: u8) -> Result<(), DriverError> {
        self.check_node(home_id, node_id)?;
        self.begin_write()?;

        let level_value = {
            let mut state = self.state();
            state.writes.push(WriteCall::NodeLevel { home_id, node_id, level });
            let ids = state.nodes.get(&node_id).cloned().unwrap_or_default();
            ids.into_iter().find_map(|id| {
                let (_, sim) = state.values.get_mut(&id)?;
                if sim.command_class == LEVEL_COMMAND_CLASS && sim.index == 0 {
                    sim.value = StateValue::Int(level as i64);
                    Some(sim.clone())
                } else {
                    None
                }
            })
        };

        if let Some(sim) = level_value {
            self.emit(
                Notification::new(NotificationType::ValueChanged, home_id, node_id)
                    .with_value(sim.to_record()),
            );
        }
        Ok(())
    }

    fn set_config_param(
        &self,
        home_id: HomeId,
        node_id: NodeId,
        param: u8,
        value: i32,
    ) -> Result<(), DriverError> {
        self.check_node(home_id, node_id)?;
        self.begin_write()?;
        self.state().writes.push(WriteCall::ConfigParam {
            home_id,
            node_id,
            param,
            value,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::DEMO_NETWORK;
    use std::sync::mpsc::Receiver;

    fn locked_options() -> DriverOptions {
        let mut options = DriverOptions::create("/etc/openzwave/", "/tmp/axon/", "");
        options.add_option_bool("Logging", false).unwrap();
        options.lock();
        options
    }

    fn driver_with_channel() -> (SimDriver, Receiver<Notification>) {
        let driver = SimDriver::new(&locked_options(), SimNetwork::from_toml(DEMO_NETWORK).unwrap())
            .unwrap();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        driver
            .add_watcher(Box::new(move |n| {
                let _ = tx.lock().unwrap().send(n);
            }))
            .unwrap();
        (driver, rx)
    }

    fn recv(rx: &Receiver<Notification>) -> Notification {
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_requires_locked_options() {
        let options = DriverOptions::create("/etc/openzwave/", "/tmp/axon/", "");
        assert!(matches!(
            SimDriver::new(&options, SimNetwork::demo()),
            Err(OptionsError::NotLocked)
        ));
    }

    #[test]
    fn test_startup_sequence() {
        let (driver, rx) = driver_with_channel();
        driver.add_driver("/dev/usbzwave").unwrap();

        let first = recv(&rx);
        assert_eq!(first.kind, NotificationType::DriverReady);
        assert_eq!(first.home_id, HomeId(0xdeadbeef));

        let second = recv(&rx);
        assert_eq!(second.kind, NotificationType::NodeAdded);
        assert_eq!(second.node_id, NodeId(2));

        let mut last = second;
        while last.kind != NotificationType::AllNodesQueried {
            last = recv(&rx);
        }
        assert_eq!(last.node_id, NodeId::BROADCAST);

        assert!(driver.add_driver("/dev/usbzwave").is_err());
    }

    #[test]
    fn test_metadata() {
        let (driver, _rx) = driver_with_channel();
        let level = ValueId(72057594093060097);
        assert_eq!(driver.value_min(level), Ok(0));
        assert_eq!(driver.value_max(level), Ok(99));
        assert_eq!(
            driver.value_list_items(ValueId(72057594093060100)).unwrap().len(),
            4
        );
        assert_eq!(driver.value_float_precision(ValueId(72057594093273218)), Ok(1));
        assert!(driver.value_list_items(level).is_err());
        assert_eq!(driver.is_value_write_only(ValueId(72057594093060101)), Ok(true));
        assert_eq!(
            driver.value_min(ValueId(1)),
            Err(DriverError::UnknownValue(ValueId(1)))
        );
    }

    #[test]
    fn test_set_value_reports_back() {
        let (driver, rx) = driver_with_channel();
        let switch = ValueId(72057594076463104);
        driver.set_value(switch, StateValue::Bool(true)).unwrap();

        let n = recv(&rx);
        assert_eq!(n.kind, NotificationType::ValueChanged);
        assert_eq!(n.value.unwrap().value, StateValue::Bool(true));
        assert_eq!(driver.get_value(switch), Ok(StateValue::Bool(true)));
        assert_eq!(
            driver.writes(),
            vec![WriteCall::Value {
                id: switch,
                value: StateValue::Bool(true)
            }]
        );
    }

    #[test]
    fn test_injected_failures() {
        let (driver, _rx) = driver_with_channel();
        let switch = ValueId(72057594076463104);
        driver.fail_next_writes(DriverError::Busy, 2);

        assert_eq!(driver.set_value(switch, StateValue::Bool(true)), Err(DriverError::Busy));
        assert_eq!(driver.set_value(switch, StateValue::Bool(true)), Err(DriverError::Busy));
        assert!(driver.set_value(switch, StateValue::Bool(true)).is_ok());
        assert!(matches!(
            driver.set_value(ValueId(72057594093273218), StateValue::Decimal(1.0)),
            Err(DriverError::Rejected(_))
        ));
    }

    #[test]
    fn test_node_level_updates_level_value() {
        let (driver, rx) = driver_with_channel();
        let home = HomeId(0xdeadbeef);
        driver.set_node_level(home, NodeId(3), 42).unwrap();

        let n = recv(&rx);
        assert_eq!(n.node_id, NodeId(3));
        assert_eq!(n.value.unwrap().value, StateValue::Int(42));
        assert!(matches!(
            driver.set_node_level(home, NodeId(9), 1),
            Err(DriverError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_remove_node_reports_values_first() {
        let (driver, rx) = driver_with_channel();
        driver.remove_node(NodeId(2)).unwrap();

        assert_eq!(recv(&rx).kind, NotificationType::ValueRemoved);
        assert_eq!(recv(&rx).kind, NotificationType::ValueRemoved);
        assert_eq!(recv(&rx).kind, NotificationType::NodeRemoved);
        assert!(driver.remove_node(NodeId(2)).is_err());
    }

    #[test]
    fn test_write_config() {
        let (driver, _rx) = driver_with_channel();
        driver.write_config(HomeId(0xdeadbeef)).unwrap();
        assert!(driver.write_config(HomeId(1)).is_err());
        assert_eq!(driver.config_writes(), vec![HomeId(0xdeadbeef)]);
    }
}
