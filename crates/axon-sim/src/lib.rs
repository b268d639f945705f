//! Axon Sim - Simulated Z-Wave driver
//!
//! An in-process implementation of the driver contract, driven by a TOML
//! description of one network. It reports through watchers from its own
//! thread, like a real driver, and reacts to writes by reporting the new
//! values back. Test hooks allow injecting failures and inspecting calls.

pub mod driver;
pub mod network;

pub use driver::{SimDriver, WriteCall};
pub use network::{NetworkError, SimNetwork, SimNode, SimValue, DEMO_NETWORK};
