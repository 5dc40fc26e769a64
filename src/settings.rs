use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::sampling::DEFAULT_WINDOW_CAPACITY;
use crate::transport::DEFAULT_BAUD_RATE;

pub const DEFAULT_SETTINGS_FILE: &str = "phmeter.json";
const DEBUG_TICK_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeterSettings {
    pub data_dir: PathBuf,
    pub calibration_file: PathBuf,
    pub baud_rate: u32,
    pub tick_interval_ms: u64,
    pub read_timeout_ms: u64,
    pub window_capacity: usize,
    /// Last port that connected successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_port: Option<String>,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            calibration_file: PathBuf::from("ph.json"),
            baud_rate: DEFAULT_BAUD_RATE,
            tick_interval_ms: 1000,
            read_timeout_ms: 1000,
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            default_port: None,
        }
    }
}

/// Values given on the command line; they win over the file but are never saved.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub data_dir: Option<PathBuf>,
    pub calibration_file: Option<PathBuf>,
    pub debug: bool,
}

impl MeterSettings {
    pub fn with_overrides(mut self, overrides: &SettingsOverrides) -> Self {
        if let Some(port) = &overrides.port {
            self.default_port = Some(port.clone());
        }
        if let Some(baud) = overrides.baud_rate {
            self.baud_rate = baud;
        }
        if let Some(dir) = &overrides.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(file) = &overrides.calibration_file {
            self.calibration_file = file.clone();
        }
        if overrides.debug {
            self.tick_interval_ms = DEBUG_TICK_INTERVAL.as_millis() as u64;
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// `PHMETER_DEBUG=1` (or `true`) shortens the tick for bench work.
pub fn debug_mode_from_env() -> bool {
    std::env::var("PHMETER_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub struct SettingsStore {
    path: PathBuf,
    data: MeterSettings,
}

impl SettingsStore {
    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or cannot be parsed.
    pub fn load(path: PathBuf) -> Self {
        let data = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(
                    "Ignoring unreadable settings in {}: {err}",
                    path.display()
                );
                MeterSettings::default()
            }),
            Err(_) => MeterSettings::default(),
        };

        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &MeterSettings {
        &self.data
    }

    /// Remember `port` for the next start. Writes only when it changed.
    pub fn set_default_port(&mut self, port: &str) -> Result<()> {
        if self.data.default_port.as_deref() == Some(port) {
            return Ok(());
        }
        self.data.default_port = Some(port.to_string());
        self.persist()?;
        info!("Default port set to {port}");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let serialized = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("phmeter.json"));
        let s = store.settings();
        assert_eq!(s.data_dir, PathBuf::from("data"));
        assert_eq!(s.calibration_file, PathBuf::from("ph.json"));
        assert_eq!(s.baud_rate, 9600);
        assert_eq!(s.tick_interval(), Duration::from_secs(1));
        assert_eq!(s.read_timeout(), Duration::from_secs(1));
        assert_eq!(s.window_capacity, 10);
        assert_eq!(s.default_port, None);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phmeter.json");
        fs::write(&path, r#"{"baudRate": 115200, "defaultPort": "COM7"}"#).unwrap();

        let store = SettingsStore::load(path);
        assert_eq!(store.settings().baud_rate, 115200);
        assert_eq!(store.settings().default_port.as_deref(), Some("COM7"));
        assert_eq!(store.settings().window_capacity, 10);
    }

    #[test]
    fn corrupt_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phmeter.json");
        fs::write(&path, "baudRate = 9600").unwrap();
        assert_eq!(*SettingsStore::load(path).settings(), MeterSettings::default());
    }

    #[test]
    fn default_port_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phmeter.json");
        let mut store = SettingsStore::load(path.clone());
        store.set_default_port("/dev/ttyUSB0").unwrap();

        let reloaded = SettingsStore::load(path);
        assert_eq!(
            reloaded.settings().default_port.as_deref(),
            Some("/dev/ttyUSB0")
        );
    }

    #[test]
    fn overrides_win_over_file() {
        let overrides = SettingsOverrides {
            port: Some("COM4".into()),
            baud_rate: Some(19200),
            data_dir: Some(PathBuf::from("/tmp/logs")),
            calibration_file: None,
            debug: true,
        };
        let s = MeterSettings::default().with_overrides(&overrides);
        assert_eq!(s.default_port.as_deref(), Some("COM4"));
        assert_eq!(s.baud_rate, 19200);
        assert_eq!(s.data_dir, PathBuf::from("/tmp/logs"));
        assert_eq!(s.calibration_file, PathBuf::from("ph.json"));
        assert_eq!(s.tick_interval(), Duration::from_millis(250));
    }
}
