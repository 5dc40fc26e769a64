mod constants;
mod store;

pub use constants::{
    CalibrationConstants, CalibrationPoint, CalibrationSummary, CALIBRATION_EQUATION,
    KELVIN_OFFSET,
};
pub use store::CalibrationStore;
