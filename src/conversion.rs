//! Voltage-to-pH conversion against a three-point calibration.
//!
//! The electrode follows `E = k1*T - k2*T*(pH - pH7)`: the neutral offset and
//! both slopes were captured at the calibration temperature and are rescaled
//! linearly to the temperature of the reading.

use crate::calibration::{CalibrationConstants, KELVIN_OFFSET};
use crate::error::{CalibrationError, SlopeBranch};

pub const PH_NEUTRAL: f64 = 7.0;
pub const PH_MIN: f64 = 0.0;
pub const PH_MAX: f64 = 14.0;

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Evaluate the pH of a single reading.
///
/// The result is rounded to 2 decimals and clamped to `[0, 14]`. A zero slope
/// on the branch selected by the reading is reported instead of dividing by it.
pub fn evaluate(
    voltage_diff_mv: f64,
    temperature_celsius: f64,
    constants: &CalibrationConstants,
) -> Result<f64, CalibrationError> {
    let cal_t = constants.temperature_k;
    if !cal_t.is_finite() || cal_t == 0.0 {
        return Err(CalibrationError::InvalidCalibrationTemperature(cal_t));
    }

    let t_k = temperature_celsius + KELVIN_OFFSET;
    let delta_mv = voltage_diff_mv - constants.offset_mv / cal_t * t_k;

    let (branch, slope_mv) = if delta_mv >= 0.0 {
        (SlopeBranch::Acid, constants.acid_slope_mv())
    } else {
        (SlopeBranch::Alkaline, constants.alkaline_slope_mv())
    };

    let scaled_slope = slope_mv / cal_t * t_k;
    if scaled_slope == 0.0 {
        return Err(CalibrationError::DegenerateSlope { branch });
    }

    let ph = round_to(PH_NEUTRAL - delta_mv / scaled_slope, 2);
    if ph.is_nan() {
        return Err(CalibrationError::NonFinite);
    }
    // also folds a rounded -0.0 into 0.0
    if ph <= PH_MIN {
        return Ok(PH_MIN);
    }

    Ok(ph.min(PH_MAX))
}
