use serde::Serialize;

use crate::calibration::CalibrationSummary;
use crate::sampling::{RawSample, TrendPoint};

use super::{SampleUpdate, StatusNotice};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleEvent {
    pub sample: RawSample,
    pub voltage_diff_mv: f64,
    pub ph: Option<f64>,
    pub recent_voltage: Vec<f64>,
    pub recent_temperature: Vec<f64>,
    /// Only the newest trend point; consumers accumulate the history.
    pub trend_point: Option<TrendPoint>,
    pub calibration: CalibrationSummary,
}

impl From<&SampleUpdate<'_>> for SampleEvent {
    fn from(update: &SampleUpdate<'_>) -> Self {
        Self {
            sample: *update.sample,
            voltage_diff_mv: update.voltage_diff_mv,
            ph: update.ph,
            recent_voltage: update.recent_voltage.to_vec(),
            recent_temperature: update.recent_temperature.to_vec(),
            trend_point: update.trend.last().copied(),
            calibration: update.calibration.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub message: String,
    pub is_error: bool,
}

impl From<&StatusNotice> for StatusEvent {
    fn from(notice: &StatusNotice) -> Self {
        Self {
            message: notice.to_string(),
            is_error: notice.is_error(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationEvent {
    pub calibration: CalibrationSummary,
}
