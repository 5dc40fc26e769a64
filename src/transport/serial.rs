use std::{
    io::{ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use log::warn;
use serialport::SerialPort;

use crate::error::{MeterError, MeterResult};

use super::Transport;

pub const DEFAULT_BAUD_RATE: u32 = 9600;

// Longest unterminated line kept before it is discarded.
const MAX_PENDING_BYTES: usize = 4096;

pub struct SerialTransport {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`, 8N1, no flow control.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> MeterResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|err| MeterError::TransportUnavailable(format!("open {port_name}: {err}")))?;

        Ok(Self {
            name: port.name().unwrap_or_else(|| port_name.to_string()),
            port: Some(port),
            pending: Vec::with_capacity(256),
        })
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_line(&mut self, timeout: Duration) -> MeterResult<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(line) = self.take_line() {
                return Ok(line);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MeterError::TransportTimeout);
            }

            let port = self
                .port
                .as_mut()
                .ok_or_else(|| MeterError::TransportUnavailable(format!("{} is closed", self.name)))?;
            port.set_timeout(remaining)
                .map_err(|err| MeterError::TransportUnavailable(err.to_string()))?;

            let mut buf = [0u8; 256];
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    if self.pending.len() > MAX_PENDING_BYTES {
                        warn!(
                            "{}: {} bytes without a line break, discarding",
                            self.name,
                            self.pending.len()
                        );
                        self.pending.clear();
                    }
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    return Err(MeterError::TransportTimeout);
                }
                Err(err) => {
                    return Err(MeterError::TransportUnavailable(format!(
                        "{} read error: {err}",
                        self.name
                    )));
                }
            }
        }
    }

    fn close(&mut self) -> MeterResult<()> {
        self.pending.clear();
        if let Some(mut port) = self.port.take() {
            port.flush()
                .map_err(|err| MeterError::TransportUnavailable(format!("{} flush: {err}", self.name)))?;
        }
        Ok(())
    }
}

/// Label a port the way the board shows up to the operator.
pub(super) fn describe(info: serialport::SerialPortInfo) -> super::PortEntry {
    let display = match info.port_type {
        serialport::SerialPortType::UsbPort(usb) => {
            let parts: Vec<String> = [usb.manufacturer, usb.product].into_iter().flatten().collect();
            if parts.is_empty() {
                format!("{}: USB Serial", info.port_name)
            } else {
                format!("{}: {}", info.port_name, parts.join(" "))
            }
        }
        serialport::SerialPortType::BluetoothPort => format!("{}: Bluetooth", info.port_name),
        serialport::SerialPortType::PciPort => format!("{}: PCI", info.port_name),
        serialport::SerialPortType::Unknown => info.port_name.clone(),
    };

    super::PortEntry {
        port_name: info.port_name,
        display,
    }
}
