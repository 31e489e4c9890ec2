//! Client side of the duplex stream

pub mod command;
pub mod engine;
pub mod mute;
pub mod stats;
pub mod switcher;
pub mod transport;
pub mod wire;

pub use command::Command;
pub use engine::{describe_devices, ClientEngine};
pub use mute::MuteGate;
pub use stats::{RateReporter, TransportStats};
pub use switcher::DeviceSwitcher;
pub use transport::{ConnectionState, TransportSession};
pub use wire::{TcpWire, Wire};
