//! OBD-II Protocol Implementation
//!
//! This crate provides async serial communication with ELM327-compatible
//! OBD-II adapters, the Mode 01 PID catalogue with its decoding formulas,
//! and the [`Reading`] model that one poll cycle produces.
//!
//! The collector talks to adapters only through the [`Connector`] and
//! [`ObdTransport`] traits, so a [`SimulatedConnector`] can stand in for
//! real hardware.

mod client;
mod elm327;
mod error;
mod pid;
mod protocol;
mod reading;
mod simulator;
mod transport;

pub use client::ObdClient;
pub use elm327::{parse_pid_payload, parse_supported_bitmap, parse_vin};
pub use error::ObdError;
pub use pid::{FuelSystemStatus, Pid, PidResponse};
pub use protocol::ObdProtocol;
pub use reading::Reading;
pub use simulator::{SimulatedAdapter, SimulatedConnector};
pub use transport::{Connector, ObdTransport, SerialConnector};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
    /// Vehicle information
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Offset added to the mode byte in a positive response
    pub const RESPONSE_OFFSET: u8 = 0x40;
}
