use serde::Serialize;

use crate::error::{MeterError, MeterResult};

/// Temperature, humidity, reference voltage, pH-electrode voltage.
pub const SAMPLE_FIELD_COUNT: usize = 4;

/// One reading from the sensor board, in the order the board sends it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    /// ℃
    pub temperature_c: f64,
    /// %
    pub humidity_pct: f64,
    /// mV at the Ag/AgCl reference electrode
    pub reference_mv: f64,
    /// mV at the pH electrode
    pub ph_electrode_mv: f64,
}

impl RawSample {
    /// Parse a whitespace-delimited line of exactly four finite numbers.
    ///
    /// Anything else is rejected as a whole; no partial sample is produced.
    pub fn parse(line: &str) -> MeterResult<Self> {
        let malformed = || MeterError::MalformedSampleLine(line.trim_end().to_string());

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != SAMPLE_FIELD_COUNT {
            return Err(malformed());
        }

        let mut values = [0.0f64; SAMPLE_FIELD_COUNT];
        for (slot, token) in values.iter_mut().zip(&tokens) {
            let value: f64 = token.parse().map_err(|_| malformed())?;
            if !value.is_finite() {
                return Err(malformed());
            }
            *slot = value;
        }

        let [temperature_c, humidity_pct, reference_mv, ph_electrode_mv] = values;
        Ok(Self {
            temperature_c,
            humidity_pct,
            reference_mv,
            ph_electrode_mv,
        })
    }

    /// Galvanic voltage: pH electrode minus reference electrode.
    pub fn voltage_diff_mv(&self) -> f64 {
        self.ph_electrode_mv - self.reference_mv
    }
}
