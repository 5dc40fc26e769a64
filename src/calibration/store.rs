use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{MeterError, MeterResult};
use crate::sampling::SampleWindow;

use super::{CalibrationConstants, CalibrationPoint, CALIBRATION_EQUATION};

/// On-disk layout of the calibration file.
#[derive(Debug, Serialize, Deserialize)]
struct CalibrationFile {
    #[serde(rename = "Equations", default = "default_equation")]
    equations: String,
    #[serde(flatten)]
    constants: CalibrationConstants,
}

fn default_equation() -> String {
    CALIBRATION_EQUATION.to_string()
}

/// Owns the current calibration and its JSON file.
///
/// Captures only touch memory; `persist` rewrites the whole file.
pub struct CalibrationStore {
    path: PathBuf,
    current: CalibrationConstants,
    revision: u64,
    persisted_revision: u64,
}

impl CalibrationStore {
    /// Load constants from `path`, creating the file with defaults if it does not exist.
    pub fn load(path: PathBuf) -> MeterResult<Self> {
        let current = match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: CalibrationFile = serde_json::from_str(&contents)?;
                info!("Loaded calibration from {}", path.display());
                file.constants
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "No calibration at {}; creating defaults",
                    path.display()
                );
                let defaults = CalibrationConstants::default();
                write_calibration(&path, &defaults)?;
                defaults
            }
            Err(err) => return Err(MeterError::persistence(&path, err)),
        };

        Ok(Self {
            path,
            current,
            revision: 0,
            persisted_revision: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn constants(&self) -> CalibrationConstants {
        self.current
    }

    /// Bumped once per capture.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.revision != self.persisted_revision
    }

    /// Probe in pH 7 buffer: offset from the voltage window, calibration
    /// temperature from the temperature window.
    pub fn capture_neutral(
        &mut self,
        recent_voltage_diffs: &SampleWindow,
        recent_temperatures_celsius: &SampleWindow,
    ) -> MeterResult<CalibrationConstants> {
        let offset_mv = recent_voltage_diffs.mean()?;
        let temperature_c = recent_temperatures_celsius.mean()?;
        Ok(self.replace(self.current.with_neutral(offset_mv, temperature_c)))
    }

    pub fn capture_acid(
        &mut self,
        recent_voltage_diffs: &SampleWindow,
    ) -> MeterResult<CalibrationConstants> {
        let acid_mv = recent_voltage_diffs.mean()?;
        Ok(self.replace(self.current.with_acid(acid_mv)))
    }

    pub fn capture_alkaline(
        &mut self,
        recent_voltage_diffs: &SampleWindow,
    ) -> MeterResult<CalibrationConstants> {
        let alkaline_mv = recent_voltage_diffs.mean()?;
        Ok(self.replace(self.current.with_alkaline(alkaline_mv)))
    }

    pub fn capture(
        &mut self,
        point: CalibrationPoint,
        recent_voltage_diffs: &SampleWindow,
        recent_temperatures_celsius: &SampleWindow,
    ) -> MeterResult<CalibrationConstants> {
        match point {
            CalibrationPoint::Neutral => {
                self.capture_neutral(recent_voltage_diffs, recent_temperatures_celsius)
            }
            CalibrationPoint::Acid => self.capture_acid(recent_voltage_diffs),
            CalibrationPoint::Alkaline => self.capture_alkaline(recent_voltage_diffs),
        }
    }

    pub fn persist(&mut self) -> MeterResult<()> {
        write_calibration(&self.path, &self.current)?;
        self.persisted_revision = self.revision;
        info!("Calibration saved to {}", self.path.display());
        Ok(())
    }

    fn replace(&mut self, next: CalibrationConstants) -> CalibrationConstants {
        self.current = next;
        self.revision += 1;
        next
    }
}

fn write_calibration(path: &Path, constants: &CalibrationConstants) -> MeterResult<()> {
    let file = CalibrationFile {
        equations: default_equation(),
        constants: *constants,
    };

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    file.serialize(&mut serializer)?;
    buf.push(b'\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| MeterError::persistence(parent, err))?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &buf).map_err(|err| MeterError::persistence(&tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| MeterError::persistence(path, err))
}
