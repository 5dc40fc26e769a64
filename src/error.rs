//! Error taxonomy for the meter pipeline.
//!
//! Malformed lines are recovered locally by the ingestor, transport and
//! persistence failures are surfaced to observers as status notices, and
//! calibration failures only cost the pH value of a single tick.

use std::path::PathBuf;

use thiserror::Error;

/// Which side of the neutral point a reading fell on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeBranch {
    Acid,
    Alkaline,
}

impl std::fmt::Display for SlopeBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlopeBranch::Acid => write!(f, "acid"),
            SlopeBranch::Alkaline => write!(f, "alkaline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    /// The mV-per-pH slope for the selected branch evaluated to zero.
    #[error("degenerate {branch} slope: calibration points coincide, pH is undefined")]
    DegenerateSlope { branch: SlopeBranch },

    /// Calibration temperature must be a finite, non-zero kelvin value.
    #[error("invalid calibration temperature {0} K")]
    InvalidCalibrationTemperature(f64),

    #[error("pH evaluation produced a non-finite value")]
    NonFinite,
}

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("malformed sample line: {0:?}")]
    MalformedSampleLine(String),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("sample window is empty")]
    EmptyWindow,

    #[error("transport read timed out")]
    TransportTimeout,

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("failed to access {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid calibration data: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("session is closed")]
    SessionClosed,

    #[error("not connected")]
    NotConnected,

    #[error("already connected to {0}")]
    AlreadyConnected(String),
}

impl MeterError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MeterError::Persistence {
            path: path.into(),
            source,
        }
    }
}

pub type MeterResult<T> = Result<T, MeterError>;
