//! Observers notified by the meter after each accepted sample and on status changes.
//!
//! Rendering, widgets and plots live behind this trait; the meter only hands
//! over numbers and window contents.

mod console;
mod events;

pub use console::{ConsoleObserver, OutputFormat};
pub use events::{CalibrationEvent, SampleEvent, StatusEvent};

use crate::calibration::CalibrationSummary;
use crate::sampling::{RawSample, SampleWindow, TrendBuffer};

/// Everything a dashboard needs to redraw after one accepted sample.
pub struct SampleUpdate<'a> {
    pub sample: &'a RawSample,
    pub voltage_diff_mv: f64,
    /// `None` when the calibration could not produce a pH this tick.
    pub ph: Option<f64>,
    pub recent_voltage: &'a SampleWindow,
    pub recent_temperature: &'a SampleWindow,
    pub trend: &'a TrendBuffer,
    pub calibration: &'a CalibrationSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusNotice {
    Ready,
    Connected { port: String },
    Disconnected,
    TransportError(String),
    PersistenceError(String),
    CalibrationError(String),
}

impl StatusNotice {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StatusNotice::TransportError(_)
                | StatusNotice::PersistenceError(_)
                | StatusNotice::CalibrationError(_)
        )
    }
}

impl std::fmt::Display for StatusNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusNotice::Ready => write!(f, "Ready"),
            StatusNotice::Connected { port } => write!(f, "Connected.   {port}"),
            StatusNotice::Disconnected => write!(f, "Disconnected."),
            StatusNotice::TransportError(msg) => write!(f, "Transport error: {msg}"),
            StatusNotice::PersistenceError(msg) => write!(f, "Save failed: {msg}"),
            StatusNotice::CalibrationError(msg) => write!(f, "Calibration error: {msg}"),
        }
    }
}

pub trait MeterObserver: Send {
    fn on_sample(&mut self, update: &SampleUpdate<'_>);

    fn on_status(&mut self, notice: &StatusNotice);

    fn on_calibration(&mut self, _summary: &CalibrationSummary) {}
}
