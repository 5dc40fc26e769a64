use serde::Serialize;

use crate::calibration::{CalibrationConstants, CalibrationSummary};
use crate::recorder::SessionInfo;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected {
        port: String,
    },
}

impl ConnectionState {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            ConnectionState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionState::Connected { .. } => ConnectionStatus::Connected,
        }
    }

    pub fn port(&self) -> Option<&str> {
        match self {
            ConnectionState::Disconnected => None,
            ConnectionState::Connected { port } => Some(port),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Per-session line counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub accepted: u64,
    /// Lines that were not exactly four numbers.
    pub dropped: u64,
    /// Accepted samples whose pH could not be evaluated.
    pub ph_failures: u64,
    /// Accepted samples that could not be appended to the session log.
    pub record_failures: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSnapshot {
    pub status: ConnectionStatus,
    pub port: Option<String>,
    pub session: Option<SessionInfo>,
    pub calibration: CalibrationConstants,
    pub calibration_summary: CalibrationSummary,
    pub calibration_revision: u64,
    pub unsaved_calibration: bool,
    pub stats: IngestStats,
    pub last_ph: Option<f64>,
    pub recent_voltage: Vec<f64>,
    pub recent_temperature: Vec<f64>,
    pub trend_len: usize,
}
