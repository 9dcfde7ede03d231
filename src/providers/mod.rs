//! Datagram sources: the console socket and the built-in simulator

pub mod simulator;
pub mod udp;

pub use simulator::{SimulatorConfig, SimulatorProvider};
pub use udp::UdpProvider;
