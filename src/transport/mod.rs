//! Line-oriented transports feeding the meter.
//!
//! A transport hands back raw text lines; tokenising them is the ingestor's job.

mod catalog;
mod replay;
mod serial;
mod simulated;

use std::time::Duration;

use serde::Serialize;

use crate::error::MeterResult;

pub use catalog::{PortCatalog, REPLAY_PORT, SIMULATED_PORT};
pub use replay::ReplayTransport;
pub use serial::{SerialTransport, DEFAULT_BAUD_RATE};
pub use simulated::SimulatedBoard;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

pub trait Transport: Send {
    fn name(&self) -> &str;

    /// Block for at most `timeout` waiting for one complete line.
    ///
    /// Returns `MeterError::TransportTimeout` when nothing arrived in time.
    fn read_line(&mut self, timeout: Duration) -> MeterResult<String>;

    /// Flush and release the underlying resource.
    fn close(&mut self) -> MeterResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortEntry {
    /// e.g. "COM7" or "/dev/ttyUSB0"
    pub port_name: String,
    /// e.g. "COM7: USB Serial ..."
    pub display: String,
}

impl std::fmt::Display for PortEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display)
    }
}

/// Enumerates and opens ports.
pub trait PortProvider: Send {
    fn available_ports(&self) -> Vec<PortEntry>;

    fn open(&self, port_name: &str) -> MeterResult<Box<dyn Transport>>;
}
