use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use log::{info, warn};
use uuid::Uuid;

use crate::error::{MeterError, MeterResult};
use crate::sampling::RawSample;

use super::{SessionInfo, SessionStatus};

/// Timestamp used in the log file name and header, taken at connect time.
pub const SESSION_STAMP_FORMAT: &str = "%Y%m%d_%H_%M_%S";

const FIELD_SEPARATOR: &str = "    ";
const MAX_NAME_ATTEMPTS: u32 = 100;

struct ActiveSession {
    info: SessionInfo,
    file: File,
}

/// Append-only text log of accepted samples, one file per session.
///
/// Every record is written and flushed before `record` returns.
pub struct SessionRecorder {
    data_dir: PathBuf,
    active: Option<ActiveSession>,
}

impl SessionRecorder {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            active: None,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<&SessionInfo> {
        self.active.as_ref().map(|session| &session.info)
    }

    /// Create `data_<timestamp>.txt` with its header block.
    pub fn open_session(&mut self, timestamp: DateTime<Local>) -> MeterResult<SessionInfo> {
        if let Some(previous) = self.current() {
            warn!(
                "Session {} still open while opening a new one; closing it",
                previous.id
            );
            self.close_session()?;
        }

        fs::create_dir_all(&self.data_dir)
            .map_err(|err| MeterError::persistence(&self.data_dir, err))?;

        let stamp = timestamp.format(SESSION_STAMP_FORMAT).to_string();
        let (path, mut file) = create_log_file(&self.data_dir, &stamp)?;

        file.write_all(header(&stamp).as_bytes())
            .and_then(|_| file.flush())
            .map_err(|err| MeterError::persistence(&path, err))?;

        let info = SessionInfo {
            id: Uuid::new_v4().to_string(),
            path,
            started_at: timestamp,
            stopped_at: None,
            status: SessionStatus::Recording,
            rows: 0,
        };
        info!("Session {} logging to {}", info.id, info.path.display());

        self.active = Some(ActiveSession {
            info: info.clone(),
            file,
        });
        Ok(info)
    }

    /// Append one line: the four raw values, the voltage difference and the pH.
    ///
    /// A missing pH (degenerate calibration) is written as `nan`.
    pub fn record(
        &mut self,
        sample: &RawSample,
        voltage_diff_mv: f64,
        ph: Option<f64>,
    ) -> MeterResult<()> {
        let session = self.active.as_mut().ok_or(MeterError::SessionClosed)?;

        let line = format_record(sample, voltage_diff_mv, ph);
        session
            .file
            .write_all(line.as_bytes())
            .and_then(|_| session.file.flush())
            .map_err(|err| MeterError::persistence(&session.info.path, err))?;

        session.info.rows += 1;
        Ok(())
    }

    /// Deactivate the session. A file that never got a data row is removed.
    pub fn close_session(&mut self) -> MeterResult<Option<SessionInfo>> {
        let Some(ActiveSession { mut info, file }) = self.active.take() else {
            return Ok(None);
        };

        let synced = file.sync_all();
        drop(file);
        info.stopped_at = Some(Local::now());

        if info.rows == 0 {
            fs::remove_file(&info.path)
                .map_err(|err| MeterError::persistence(&info.path, err))?;
            info.status = SessionStatus::Discarded;
            info!("Session {} ended with no samples; removed its log", info.id);
        } else {
            synced.map_err(|err| MeterError::persistence(&info.path, err))?;
            info.status = SessionStatus::Closed;
            info!(
                "Session {} closed with {} rows in {}",
                info.id,
                info.rows,
                info.path.display()
            );
        }

        Ok(Some(info))
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if let Err(err) = self.close_session() {
            warn!("Failed to close session log on drop: {err}");
        }
    }
}

pub fn format_record(sample: &RawSample, voltage_diff_mv: f64, ph: Option<f64>) -> String {
    let fields = [
        format_value(sample.temperature_c),
        format_value(sample.humidity_pct),
        format_value(sample.reference_mv),
        format_value(sample.ph_electrode_mv),
        format_value(voltage_diff_mv),
        ph.map(format_value).unwrap_or_else(|| "nan".to_string()),
    ];
    let mut line = fields.join(FIELD_SEPARATOR);
    line.push('\n');
    line
}

/// Shortest round-trip decimal, keeping `.0` on whole numbers.
fn format_value(value: f64) -> String {
    format!("{value:?}")
}

fn header(stamp: &str) -> String {
    format!(
        "# wireless pH sensor data log\n\
         # Date: {stamp}\n\
         # Temperature (℃), Relative Humidity (%), Voltage of Ag/AgCl electrode (mV), \
         Voltage of pH electrode (mV), Voltage difference (mV), Evaluated pH Value\n\
         # \n"
    )
}

fn create_log_file(dir: &Path, stamp: &str) -> MeterResult<(PathBuf, File)> {
    let mut attempt = 0;
    loop {
        let name = if attempt == 0 {
            format!("data_{stamp}.txt")
        } else {
            format!("data_{stamp}_{attempt}.txt")
        };
        let path = dir.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                attempt += 1;
            }
            Err(err) => return Err(MeterError::persistence(path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2017, 9, 1, 14, 5, 9).unwrap()
    }

    fn sample() -> RawSample {
        RawSample {
            temperature_c: 25.0,
            humidity_pct: 60.0,
            reference_mv: 100.0,
            ph_electrode_mv: 150.0,
        }
    }

    #[test]
    fn open_writes_header_named_by_timestamp() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(dir.path().join("data"));

        let info = recorder.open_session(stamp()).unwrap();
        assert_eq!(
            info.path.file_name().unwrap().to_str().unwrap(),
            "data_20170901_14_05_09.txt"
        );
        let text = fs::read_to_string(&info.path).unwrap();
        assert!(text.starts_with("# wireless pH sensor data log\n# Date: 20170901_14_05_09\n"));
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().all(|l| l.starts_with('#')));
    }

    #[test]
    fn records_append_in_order() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(dir.path().to_path_buf());
        let info = recorder.open_session(stamp()).unwrap();

        recorder.record(&sample(), 50.0, Some(6.16)).unwrap();
        let second = RawSample {
            temperature_c: 25.5,
            ..sample()
        };
        recorder.record(&second, 50.0, None).unwrap();

        // flushed before close
        let text = fs::read_to_string(&info.path).unwrap();
        let rows: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(
            rows,
            vec![
                "25.0    60.0    100.0    150.0    50.0    6.16",
                "25.5    60.0    100.0    150.0    50.0    nan",
            ]
        );

        let closed = recorder.close_session().unwrap().unwrap();
        assert_eq!(closed.rows, 2);
        assert_eq!(closed.status, SessionStatus::Closed);
        assert!(closed.path.exists());
    }

    #[test]
    fn record_after_close_fails() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(dir.path().to_path_buf());
        recorder.open_session(stamp()).unwrap();
        recorder.record(&sample(), 50.0, Some(7.0)).unwrap();
        recorder.close_session().unwrap();

        assert!(matches!(
            recorder.record(&sample(), 50.0, Some(7.0)),
            Err(MeterError::SessionClosed)
        ));
    }

    #[test]
    fn empty_session_leaves_no_file() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(dir.path().to_path_buf());
        let info = recorder.open_session(stamp()).unwrap();

        let closed = recorder.close_session().unwrap().unwrap();
        assert_eq!(closed.status, SessionStatus::Discarded);
        assert!(!info.path.exists());
        assert!(recorder.close_session().unwrap().is_none());
    }

    #[test]
    fn same_second_reconnect_gets_a_fresh_file() {
        let dir = tempdir().unwrap();
        let mut recorder = SessionRecorder::new(dir.path().to_path_buf());

        let first = recorder.open_session(stamp()).unwrap();
        recorder.record(&sample(), 50.0, Some(7.0)).unwrap();
        recorder.close_session().unwrap();

        let second = recorder.open_session(stamp()).unwrap();
        assert_ne!(first.path, second.path);
        assert!(second
            .path
            .to_string_lossy()
            .ends_with("data_20170901_14_05_09_1.txt"));
    }

    #[test]
    fn unwritable_directory_is_reported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let mut recorder = SessionRecorder::new(blocker.join("data"));
        assert!(matches!(
            recorder.open_session(stamp()),
            Err(MeterError::Persistence { .. })
        ));
        assert!(!recorder.is_active());
    }
}
