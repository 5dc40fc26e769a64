use std::{path::PathBuf, time::Duration};

use log::warn;

use crate::error::{MeterError, MeterResult};

use super::{
    serial::{describe, SerialTransport},
    PortEntry, PortProvider, ReplayTransport, SimulatedBoard, Transport,
};

pub const SIMULATED_PORT: &str = "sim";
pub const REPLAY_PORT: &str = "replay";

/// System serial ports, plus the simulated board and a replay file when enabled.
pub struct PortCatalog {
    baud_rate: u32,
    read_timeout: Duration,
    simulate: bool,
    replay: Option<PathBuf>,
}

impl PortCatalog {
    pub fn new(baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            baud_rate,
            read_timeout,
            simulate: false,
            replay: None,
        }
    }

    pub fn with_simulator(mut self, enabled: bool) -> Self {
        self.simulate = enabled;
        self
    }

    pub fn with_replay(mut self, path: Option<PathBuf>) -> Self {
        self.replay = path;
        self
    }
}

impl PortProvider for PortCatalog {
    fn available_ports(&self) -> Vec<PortEntry> {
        let mut out: Vec<PortEntry> = match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(describe).collect(),
            Err(err) => {
                warn!("Serial port enumeration failed: {err}");
                Vec::new()
            }
        };
        out.sort_by(|a, b| a.display.cmp(&b.display));

        if self.simulate {
            out.push(PortEntry {
                port_name: SIMULATED_PORT.to_string(),
                display: format!("{SIMULATED_PORT}: Simulated sensor board"),
            });
        }
        if let Some(path) = &self.replay {
            out.push(PortEntry {
                port_name: REPLAY_PORT.to_string(),
                display: format!("{REPLAY_PORT}: {}", path.display()),
            });
        }
        out
    }

    fn open(&self, port_name: &str) -> MeterResult<Box<dyn Transport>> {
        match port_name {
            SIMULATED_PORT if self.simulate => Ok(Box::new(SimulatedBoard::new())),
            REPLAY_PORT => {
                let path = self.replay.as_ref().ok_or_else(|| {
                    MeterError::TransportUnavailable("no replay file configured".into())
                })?;
                Ok(Box::new(ReplayTransport::from_file(path)?))
            }
            _ => Ok(Box::new(SerialTransport::open(
                port_name,
                self.baud_rate,
                self.read_timeout,
            )?)),
        }
    }
}
