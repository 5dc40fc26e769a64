use chrono::{DateTime, Local};

use crate::calibration::{CalibrationConstants, CalibrationPoint, CalibrationStore, CalibrationSummary};
use crate::conversion;
use crate::error::{MeterError, MeterResult};
use crate::presentation::{MeterObserver, SampleUpdate, StatusNotice};
use crate::recorder::{SessionInfo, SessionRecorder};
use crate::sampling::{RawSample, SampleWindow, TrendBuffer};

use super::state::{ConnectionState, IngestStats, MeterSnapshot};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// First index of the full-session trend.
const TREND_SEED: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedSample {
    pub sample: RawSample,
    pub voltage_diff_mv: f64,
    pub ph: Option<f64>,
    pub trend_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    Accepted(AcceptedSample),
    /// The line was not exactly four numbers; nothing changed.
    Dropped,
}

/// Per-tick pipeline: parse, window, convert, record, notify.
///
/// Owns every piece of mutable meter state; callers drive it from a single task.
pub struct SampleIngestor {
    state: ConnectionState,
    calibration: CalibrationStore,
    summary: CalibrationSummary,
    recorder: SessionRecorder,
    voltage_window: SampleWindow,
    temperature_window: SampleWindow,
    trend: TrendBuffer,
    stats: IngestStats,
    last_ph: Option<f64>,
    ph_failing: bool,
    observers: Vec<Box<dyn MeterObserver>>,
}

impl SampleIngestor {
    pub fn new(calibration: CalibrationStore, recorder: SessionRecorder, window_capacity: usize) -> Self {
        let summary = calibration.constants().summary();
        Self {
            state: ConnectionState::Disconnected,
            calibration,
            summary,
            recorder,
            voltage_window: SampleWindow::new(window_capacity),
            temperature_window: SampleWindow::new(window_capacity),
            trend: TrendBuffer::with_seed(TREND_SEED),
            stats: IngestStats::default(),
            last_ph: None,
            ph_failing: false,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn MeterObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn calibration(&self) -> CalibrationConstants {
        self.calibration.constants()
    }

    pub fn voltage_window(&self) -> &SampleWindow {
        &self.voltage_window
    }

    pub fn temperature_window(&self) -> &SampleWindow {
        &self.temperature_window
    }

    pub fn trend(&self) -> &TrendBuffer {
        &self.trend
    }

    pub fn session(&self) -> Option<&SessionInfo> {
        self.recorder.current()
    }

    /// Start a session on `port`: a fresh log file and empty windows.
    pub fn connect(&mut self, port: &str, timestamp: DateTime<Local>) -> MeterResult<SessionInfo> {
        if let ConnectionState::Connected { port: current } = &self.state {
            return Err(MeterError::AlreadyConnected(current.clone()));
        }

        let session = match self.recorder.open_session(timestamp) {
            Ok(session) => session,
            Err(err) => {
                log_error!("Could not open session log: {err}");
                self.notify_status(StatusNotice::PersistenceError(err.to_string()));
                return Err(err);
            }
        };

        self.voltage_window.clear();
        self.temperature_window.clear();
        self.trend = TrendBuffer::with_seed(TREND_SEED);
        self.stats = IngestStats::default();
        self.last_ph = None;
        self.ph_failing = false;
        self.state = ConnectionState::Connected {
            port: port.to_string(),
        };

        log_info!("Connected to {port}, session {}", session.id);
        self.notify_status(StatusNotice::Connected {
            port: port.to_string(),
        });
        Ok(session)
    }

    /// End the current session. Does nothing when already disconnected.
    pub fn disconnect(&mut self) -> MeterResult<Option<SessionInfo>> {
        let ConnectionState::Connected { port } = std::mem::take(&mut self.state) else {
            return Ok(None);
        };

        let closed = self.recorder.close_session();
        log_info!(
            "Disconnected from {port} ({} accepted, {} dropped)",
            self.stats.accepted,
            self.stats.dropped
        );
        self.notify_status(StatusNotice::Disconnected);

        closed.map_err(|err| {
            self.notify_status(StatusNotice::PersistenceError(err.to_string()));
            err
        })
    }

    /// Process one raw transport line.
    pub fn ingest_line(&mut self, line: &str) -> MeterResult<TickOutcome> {
        if !self.is_connected() {
            return Err(MeterError::NotConnected);
        }

        let sample = match RawSample::parse(line) {
            Ok(sample) => sample,
            Err(err) => {
                self.stats.dropped += 1;
                log_debug!("Dropping line ({} so far): {err}", self.stats.dropped);
                return Ok(TickOutcome::Dropped);
            }
        };

        let voltage_diff_mv = sample.voltage_diff_mv();
        self.voltage_window.push(voltage_diff_mv);
        self.temperature_window.push(sample.temperature_c);
        let trend_index = self.trend.push_unbounded(voltage_diff_mv);
        self.stats.accepted += 1;

        let ph = self.evaluate_ph();

        if let Err(err) = self.recorder.record(&sample, voltage_diff_mv, ph) {
            self.stats.record_failures += 1;
            log_error!("Failed to log sample {trend_index}: {err}");
            self.notify_status(StatusNotice::PersistenceError(err.to_string()));
        }

        let update = SampleUpdate {
            sample: &sample,
            voltage_diff_mv,
            ph,
            recent_voltage: &self.voltage_window,
            recent_temperature: &self.temperature_window,
            trend: &self.trend,
            calibration: &self.summary,
        };
        for observer in self.observers.iter_mut() {
            observer.on_sample(&update);
        }

        Ok(TickOutcome::Accepted(AcceptedSample {
            sample,
            voltage_diff_mv,
            ph,
            trend_index,
        }))
    }

    /// Capture one calibration point from the current windows.
    pub fn capture(&mut self, point: CalibrationPoint) -> MeterResult<CalibrationConstants> {
        let constants = self
            .calibration
            .capture(point, &self.voltage_window, &self.temperature_window)
            .map_err(|err| {
                log_warn!("{point} calibration skipped: {err}");
                err
            })?;

        log_info!(
            "{point} calibration captured: offset {} mV, acid {} mV, alkaline {} mV, T {} K",
            constants.offset_mv,
            constants.acid_mv,
            constants.alkaline_mv,
            constants.temperature_k
        );
        self.summary = constants.summary();
        self.ph_failing = false;

        let summary = self.summary.clone();
        for observer in self.observers.iter_mut() {
            observer.on_calibration(&summary);
        }
        Ok(constants)
    }

    pub fn persist_calibration(&mut self) -> MeterResult<()> {
        self.calibration.persist().map_err(|err| {
            log_error!("Failed to save calibration: {err}");
            self.notify_status(StatusNotice::PersistenceError(err.to_string()));
            err
        })
    }

    /// Close any session and save the calibration.
    pub fn shutdown(&mut self) -> MeterResult<()> {
        let closed = self.disconnect();
        let saved = self.persist_calibration();
        closed.and(saved)
    }

    pub fn notify_status(&mut self, notice: StatusNotice) {
        for observer in self.observers.iter_mut() {
            observer.on_status(&notice);
        }
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            status: self.state.status(),
            port: self.state.port().map(str::to_string),
            session: self.recorder.current().cloned(),
            calibration: self.calibration.constants(),
            calibration_summary: self.summary.clone(),
            calibration_revision: self.calibration.revision(),
            unsaved_calibration: self.calibration.has_unsaved_changes(),
            stats: self.stats,
            last_ph: self.last_ph,
            recent_voltage: self.voltage_window.to_vec(),
            recent_temperature: self.temperature_window.to_vec(),
            trend_len: self.trend.len(),
        }
    }

    /// pH of the smoothed reading: means of both rolling windows.
    fn evaluate_ph(&mut self) -> Option<f64> {
        let constants = self.calibration.constants();
        let evaluated = self.voltage_window.mean().and_then(|voltage_mv| {
            let temperature_c = self.temperature_window.mean()?;
            Ok(conversion::evaluate(voltage_mv, temperature_c, &constants)?)
        });
        match evaluated {
            Ok(ph) => {
                self.ph_failing = false;
                self.last_ph = Some(ph);
                Some(ph)
            }
            Err(err) => {
                self.stats.ph_failures += 1;
                // report once per run of failures, not every tick
                if !self.ph_failing {
                    self.ph_failing = true;
                    log_warn!("pH unavailable: {err}");
                    self.notify_status(StatusNotice::CalibrationError(err.to_string()));
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct Seen {
        samples: Vec<(Option<f64>, Vec<f64>, usize)>,
        notices: Vec<StatusNotice>,
        calibrations: usize,
    }

    struct Recording(Arc<Mutex<Seen>>);

    impl MeterObserver for Recording {
        fn on_sample(&mut self, update: &SampleUpdate<'_>) {
            self.0.lock().unwrap().samples.push((
                update.ph,
                update.recent_voltage.to_vec(),
                update.trend.len(),
            ));
        }

        fn on_status(&mut self, notice: &StatusNotice) {
            self.0.lock().unwrap().notices.push(notice.clone());
        }

        fn on_calibration(&mut self, _summary: &CalibrationSummary) {
            self.0.lock().unwrap().calibrations += 1;
        }
    }

    fn stamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 4, 9, 30, 0).unwrap()
    }

    fn ingestor(dir: &TempDir) -> (SampleIngestor, Arc<Mutex<Seen>>) {
        let store = CalibrationStore::load(dir.path().join("ph.json")).unwrap();
        let recorder = SessionRecorder::new(dir.path().join("data"));
        let mut ingestor = SampleIngestor::new(store, recorder, 10);
        let seen = Arc::new(Mutex::new(Seen::default()));
        ingestor.add_observer(Box::new(Recording(seen.clone())));
        (ingestor, seen)
    }

    fn data_rows(session: &SessionInfo) -> Vec<String> {
        fs::read_to_string(&session.path)
            .unwrap()
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn valid_line_updates_everything_once() {
        let dir = tempdir().unwrap();
        let (mut ingestor, seen) = ingestor(&dir);
        let session = ingestor.connect("COM3", stamp()).unwrap();

        let outcome = ingestor.ingest_line("25.0 60.0 100.0 150.0\n").unwrap();
        let TickOutcome::Accepted(accepted) = outcome else {
            panic!("expected an accepted sample, got {outcome:?}");
        };
        assert_eq!(accepted.voltage_diff_mv, 50.0);
        assert_eq!(accepted.ph, Some(6.16));
        assert_eq!(accepted.trend_index, 0);

        assert_eq!(ingestor.voltage_window().to_vec(), vec![50.0]);
        assert_eq!(ingestor.temperature_window().to_vec(), vec![25.0]);
        assert_eq!(data_rows(&session), vec!["25.0    60.0    100.0    150.0    50.0    6.16"]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.samples.len(), 1);
        assert_eq!(seen.samples[0], (Some(6.16), vec![50.0], 1));
    }

    #[test]
    fn malformed_line_changes_nothing() {
        let dir = tempdir().unwrap();
        let (mut ingestor, seen) = ingestor(&dir);
        let session = ingestor.connect("COM3", stamp()).unwrap();
        ingestor.ingest_line("25.0 60.0 100.0 150.0").unwrap();

        for line in ["25.0 60.0 abc 100.0", "25.0 60.0", "", "1 2 3 4 5"] {
            assert_eq!(ingestor.ingest_line(line).unwrap(), TickOutcome::Dropped);
        }

        assert_eq!(ingestor.voltage_window().len(), 1);
        assert_eq!(ingestor.trend().len(), 1);
        assert_eq!(data_rows(&session).len(), 1);
        assert_eq!(seen.lock().unwrap().samples.len(), 1);
        assert_eq!(ingestor.stats().dropped, 4);
        assert_eq!(ingestor.stats().accepted, 1);
    }

    #[test]
    fn ph_follows_the_window_means() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        let session = ingestor.connect("COM3", stamp()).unwrap();

        ingestor.ingest_line("26.85 50.0 100.0 100.0").unwrap();
        let outcome = ingestor.ingest_line("26.85 50.0 100.0 220.0").unwrap();
        let TickOutcome::Accepted(accepted) = outcome else {
            panic!("expected an accepted sample, got {outcome:?}");
        };

        // instant 120 mV would read 5.0; the 60 mV window mean reads 6.0
        assert_eq!(accepted.voltage_diff_mv, 120.0);
        assert_eq!(accepted.ph, Some(6.0));
        assert_eq!(ingestor.snapshot().last_ph, Some(6.0));
        assert!(data_rows(&session)[1].ends_with("    120.0    6.0"));
    }

    #[test]
    fn log_failure_is_reported_and_tick_continues() {
        let dir = tempdir().unwrap();
        let (mut ingestor, seen) = ingestor(&dir);
        ingestor.connect("COM3", stamp()).unwrap();
        ingestor.recorder.close_session().unwrap();

        let outcome = ingestor.ingest_line("25.0 60.0 100.0 150.0").unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Accepted(AcceptedSample { ph: Some(_), .. })
        ));
        ingestor.ingest_line("25.0 60.0 100.0 151.0").unwrap();

        let stats = ingestor.stats();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.record_failures, 2);
        assert_eq!(ingestor.voltage_window().len(), 2);
        assert_eq!(ingestor.trend().len(), 2);
        assert!(ingestor.is_connected());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.samples.len(), 2);
        let failures: Vec<&StatusNotice> = seen
            .notices
            .iter()
            .filter(|n| matches!(n, StatusNotice::PersistenceError(_)))
            .collect();
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0],
            &StatusNotice::PersistenceError(MeterError::SessionClosed.to_string())
        );
    }

    #[test]
    fn ingest_requires_connection() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        assert!(matches!(
            ingestor.ingest_line("25.0 60.0 100.0 150.0"),
            Err(MeterError::NotConnected)
        ));
    }

    #[test]
    fn windows_roll_and_trend_grows() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        ingestor.connect("COM3", stamp()).unwrap();

        for i in 0..25 {
            ingestor
                .ingest_line(&format!("25.0 50.0 100.0 {}", 100 + i))
                .unwrap();
        }
        assert_eq!(ingestor.voltage_window().len(), 10);
        assert_eq!(ingestor.voltage_window().latest(), Some(24.0));
        assert_eq!(ingestor.voltage_window().iter().next(), Some(15.0));
        assert_eq!(ingestor.trend().len(), 25);
        assert_eq!(ingestor.trend().last().map(|p| p.index), Some(24));
    }

    #[test]
    fn degenerate_slope_skips_ph_but_keeps_logging() {
        let dir = tempdir().unwrap();
        let (mut ingestor, seen) = ingestor(&dir);
        let session = ingestor.connect("COM3", stamp()).unwrap();

        // pH 4 capture at the neutral voltage collapses the acid slope
        ingestor.ingest_line("25.0 60.0 100.0 100.0").unwrap();
        ingestor.capture(CalibrationPoint::Acid).unwrap();

        let outcome = ingestor.ingest_line("25.0 60.0 100.0 130.0").unwrap();
        let TickOutcome::Accepted(accepted) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(accepted.ph, None);
        ingestor.ingest_line("25.0 60.0 100.0 131.0").unwrap();

        let rows = data_rows(&session);
        assert_eq!(rows.len(), 3);
        assert!(rows[1].ends_with("nan"));
        assert_eq!(ingestor.stats().ph_failures, 2);
        assert_eq!(ingestor.temperature_window().len(), 3);

        let seen = seen.lock().unwrap();
        let calibration_errors = seen
            .notices
            .iter()
            .filter(|n| matches!(n, StatusNotice::CalibrationError(_)))
            .count();
        assert_eq!(calibration_errors, 1);
        assert_eq!(seen.calibrations, 1);
    }

    #[test]
    fn capture_uses_window_means() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        ingestor.connect("COM3", stamp()).unwrap();
        for line in ["25.0 0 100.0 110.0", "25.0 0 100.0 112.0", "26.0 0 100.0 111.0"] {
            ingestor.ingest_line(line).unwrap();
        }

        let constants = ingestor.capture(CalibrationPoint::Neutral).unwrap();
        assert_eq!(constants.offset_mv, 11.0);
        assert_eq!(constants.temperature_k, 298.48);
        assert!(ingestor.snapshot().unsaved_calibration);
    }

    #[test]
    fn capture_before_any_sample_fails() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        ingestor.connect("COM3", stamp()).unwrap();
        assert!(matches!(
            ingestor.capture(CalibrationPoint::Alkaline),
            Err(MeterError::EmptyWindow)
        ));
        assert_eq!(ingestor.calibration(), CalibrationConstants::default());
    }

    #[test]
    fn immediate_disconnect_leaves_no_log() {
        let dir = tempdir().unwrap();
        let (mut ingestor, seen) = ingestor(&dir);
        let session = ingestor.connect("COM3", stamp()).unwrap();

        let closed = ingestor.disconnect().unwrap().unwrap();
        assert!(!session.path.exists());
        assert_eq!(closed.rows, 0);
        assert!(!ingestor.is_connected());
        assert!(ingestor.disconnect().unwrap().is_none());

        let notices = &seen.lock().unwrap().notices;
        assert_eq!(
            notices.as_slice(),
            &[
                StatusNotice::Connected {
                    port: "COM3".into()
                },
                StatusNotice::Disconnected
            ]
        );
    }

    #[test]
    fn second_connect_is_rejected() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        ingestor.connect("COM3", stamp()).unwrap();
        assert!(matches!(
            ingestor.connect("COM4", stamp()),
            Err(MeterError::AlreadyConnected(port)) if port == "COM3"
        ));
    }

    #[test]
    fn reconnect_starts_a_fresh_session() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        let first = ingestor.connect("COM3", stamp()).unwrap();
        ingestor.ingest_line("25.0 60.0 100.0 150.0").unwrap();
        ingestor.disconnect().unwrap();

        let second = ingestor.connect("COM3", stamp()).unwrap();
        assert_ne!(first.id, second.id);
        assert!(ingestor.voltage_window().is_empty());
        assert_eq!(ingestor.stats(), IngestStats::default());
        assert_eq!(data_rows(&first).len(), 1);
    }

    #[test]
    fn shutdown_persists_calibration() {
        let dir = tempdir().unwrap();
        let (mut ingestor, _) = ingestor(&dir);
        ingestor.connect("COM3", stamp()).unwrap();
        ingestor.ingest_line("25.0 60.0 100.0 280.0").unwrap();
        ingestor.capture(CalibrationPoint::Acid).unwrap();
        ingestor.shutdown().unwrap();

        let reloaded = CalibrationStore::load(dir.path().join("ph.json")).unwrap();
        assert_eq!(reloaded.constants().acid_mv, 180.0);
        assert!(!ingestor.is_connected());
    }
}
