use serde::{Deserialize, Serialize};

use crate::conversion::round_to;

pub const CALIBRATION_EQUATION: &str = "E = k1*T - k2*T*(pH - pH7)";
pub const KELVIN_OFFSET: f64 = 273.15;

/// Reference voltages at pH 7, 4 and 10, and the temperature they were captured at.
///
/// Values are replaced wholesale by each capture; nothing mutates a field in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConstants {
    /// mV, k1*T
    #[serde(rename = "ph7_cal")]
    pub offset_mv: f64,
    /// mV, k1*T + k2a*T*3
    #[serde(rename = "ph4_cal")]
    pub acid_mv: f64,
    /// mV, k1*T - k2b*T*3
    #[serde(rename = "ph10_cal")]
    pub alkaline_mv: f64,
    /// Kelvin
    #[serde(rename = "T")]
    pub temperature_k: f64,
}

impl Default for CalibrationConstants {
    fn default() -> Self {
        Self {
            offset_mv: 0.0,
            acid_mv: 180.0,
            alkaline_mv: -180.0,
            temperature_k: 300.0,
        }
    }
}

impl CalibrationConstants {
    /// k2*T on the acid side, mV per pH unit.
    pub fn acid_slope_mv(&self) -> f64 {
        (self.acid_mv - self.offset_mv) / 3.0
    }

    /// k2*T on the alkaline side, mV per pH unit.
    pub fn alkaline_slope_mv(&self) -> f64 {
        (self.offset_mv - self.alkaline_mv) / 3.0
    }

    pub fn with_neutral(self, offset_mv: f64, temperature_celsius: f64) -> Self {
        Self {
            offset_mv: round_to(offset_mv, 2),
            temperature_k: round_to(temperature_celsius + KELVIN_OFFSET, 2),
            ..self
        }
    }

    pub fn with_acid(self, acid_mv: f64) -> Self {
        Self {
            acid_mv: round_to(acid_mv, 2),
            ..self
        }
    }

    pub fn with_alkaline(self, alkaline_mv: f64) -> Self {
        Self {
            alkaline_mv: round_to(alkaline_mv, 2),
            ..self
        }
    }

    pub fn summary(&self) -> CalibrationSummary {
        CalibrationSummary::from(self)
    }
}

/// Human-readable calibration labels shown next to the live readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationSummary {
    pub equation: String,
    pub offset: String,
    pub acid_slope: String,
    pub alkaline_slope: String,
}

impl From<&CalibrationConstants> for CalibrationSummary {
    fn from(constants: &CalibrationConstants) -> Self {
        Self {
            equation: format!("Calibration: {CALIBRATION_EQUATION}"),
            offset: format!("E_offset (k1*T): {:.1}, mV", constants.offset_mv),
            acid_slope: format!("k2*T @ acid: {:.1}, mV/pH", constants.acid_slope_mv()),
            alkaline_slope: format!(
                "k2*T @ alkaline: {:.1}, mV/pH",
                constants.alkaline_slope_mv()
            ),
        }
    }
}

/// Buffer solution the electrode sits in during a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationPoint {
    Neutral,
    Acid,
    Alkaline,
}

impl CalibrationPoint {
    pub fn nominal_ph(&self) -> u8 {
        match self {
            CalibrationPoint::Neutral => 7,
            CalibrationPoint::Acid => 4,
            CalibrationPoint::Alkaline => 10,
        }
    }

    pub fn from_nominal_ph(ph: u8) -> Option<Self> {
        match ph {
            7 => Some(CalibrationPoint::Neutral),
            4 => Some(CalibrationPoint::Acid),
            10 => Some(CalibrationPoint::Alkaline),
            _ => None,
        }
    }
}

impl std::fmt::Display for CalibrationPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pH {}", self.nominal_ph())
    }
}
