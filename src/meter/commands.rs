//! Operator commands typed at the console, one per line.

use std::{fmt::Write as _, str::FromStr};

use thiserror::Error;

use crate::calibration::CalibrationPoint;

use super::{Connection, MeterController, MeterSnapshot};

pub const HELP: &str = "\
commands:
  ports | refresh        list serial ports
  connect [port]         open a port and start a session log
  disconnect             close the port and the session log
  cal7 | cal4 | cal10    capture a calibration point (also `calibrate 7|4|10`)
  status                 connection, counters and calibration
  save                   write the calibration file now
  help                   this text
  quit                   save and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeterCommand {
    Ports,
    Connect(Option<String>),
    Disconnect,
    Calibrate(CalibrationPoint),
    Status,
    Save,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown command: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for MeterCommand {
    type Err = UnknownCommand;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut words = input.split_whitespace();
        let head = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();
        let unknown = || UnknownCommand(input.trim().to_string());

        if words.next().is_some() {
            return Err(unknown());
        }

        let command = match (head.as_str(), arg) {
            ("ports" | "refresh", None) => MeterCommand::Ports,
            ("connect", port) => MeterCommand::Connect(port.map(str::to_string)),
            ("disconnect", None) => MeterCommand::Disconnect,
            ("cal7", None) => MeterCommand::Calibrate(CalibrationPoint::Neutral),
            ("cal4", None) => MeterCommand::Calibrate(CalibrationPoint::Acid),
            ("cal10", None) => MeterCommand::Calibrate(CalibrationPoint::Alkaline),
            ("calibrate", Some(ph)) => ph
                .parse::<u8>()
                .ok()
                .and_then(CalibrationPoint::from_nominal_ph)
                .map(MeterCommand::Calibrate)
                .ok_or_else(unknown)?,
            ("status", None) => MeterCommand::Status,
            ("save", None) => MeterCommand::Save,
            ("help" | "?", None) => MeterCommand::Help,
            ("quit" | "exit", None) => MeterCommand::Quit,
            _ => return Err(unknown()),
        };
        Ok(command)
    }
}

#[derive(Debug)]
pub enum Reply {
    Text(String),
    Connected(Connection),
    Quit,
}

pub async fn execute(controller: &MeterController, command: MeterCommand) -> Result<Reply, String> {
    match command {
        MeterCommand::Ports => {
            let ports = controller.list_ports().await.map_err(|e| e.to_string())?;
            if ports.is_empty() {
                return Ok(Reply::Text("no ports found".into()));
            }
            let listing = ports
                .iter()
                .map(|entry| format!("  {entry}"))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Reply::Text(listing))
        }
        MeterCommand::Connect(port) => controller
            .connect(port)
            .await
            .map(Reply::Connected)
            .map_err(|e| e.to_string()),
        MeterCommand::Disconnect => {
            let closed = controller.disconnect().await.map_err(|e| e.to_string())?;
            Ok(Reply::Text(match closed {
                Some(session) => format!(
                    "session {} {} ({} rows)",
                    session.id,
                    session.status.as_str().to_lowercase(),
                    session.rows
                ),
                None => "not connected".into(),
            }))
        }
        MeterCommand::Calibrate(point) => {
            let constants = controller.capture(point).await.map_err(|e| e.to_string())?;
            let summary = constants.summary();
            Ok(Reply::Text(format!(
                "{point} captured\n{}\n{}\n{}",
                summary.offset, summary.acid_slope, summary.alkaline_slope
            )))
        }
        MeterCommand::Status => {
            let snapshot = controller.snapshot().await.map_err(|e| e.to_string())?;
            Ok(Reply::Text(render_status(&snapshot)))
        }
        MeterCommand::Save => {
            controller
                .save_calibration()
                .await
                .map_err(|e| e.to_string())?;
            Ok(Reply::Text("calibration saved".into()))
        }
        MeterCommand::Help => Ok(Reply::Text(HELP.into())),
        MeterCommand::Quit => Ok(Reply::Quit),
    }
}

pub fn render_status(snapshot: &MeterSnapshot) -> String {
    let mut out = String::new();
    match &snapshot.port {
        Some(port) => {
            let _ = writeln!(out, "connected to {port}");
        }
        None => {
            let _ = writeln!(out, "disconnected");
        }
    }
    if let Some(session) = &snapshot.session {
        let _ = writeln!(out, "logging to {} ({} rows)", session.path.display(), session.rows);
    }
    let _ = writeln!(
        out,
        "accepted {}, dropped {}, pH unavailable {}, unlogged {}",
        snapshot.stats.accepted,
        snapshot.stats.dropped,
        snapshot.stats.ph_failures,
        snapshot.stats.record_failures
    );
    if let Some(ph) = snapshot.last_ph {
        let _ = writeln!(out, "last pH {ph:.2}");
    }

    let summary = &snapshot.calibration_summary;
    let _ = writeln!(out, "{}", summary.equation);
    let _ = writeln!(out, "{}", summary.offset);
    let _ = writeln!(out, "{}", summary.acid_slope);
    let _ = write!(out, "{}", summary.alkaline_slope);
    if snapshot.unsaved_calibration {
        out.push_str("\n(calibration not saved yet)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!("ports".parse::<MeterCommand>(), Ok(MeterCommand::Ports));
        assert_eq!("refresh".parse::<MeterCommand>(), Ok(MeterCommand::Ports));
        assert_eq!("connect".parse::<MeterCommand>(), Ok(MeterCommand::Connect(None)));
        assert_eq!(
            "connect /dev/ttyUSB0".parse::<MeterCommand>(),
            Ok(MeterCommand::Connect(Some("/dev/ttyUSB0".into())))
        );
        assert_eq!(
            " CAL4 ".parse::<MeterCommand>(),
            Ok(MeterCommand::Calibrate(CalibrationPoint::Acid))
        );
        assert_eq!(
            "calibrate 10".parse::<MeterCommand>(),
            Ok(MeterCommand::Calibrate(CalibrationPoint::Alkaline))
        );
        assert_eq!("quit".parse::<MeterCommand>(), Ok(MeterCommand::Quit));
    }

    #[test]
    fn rejects_unknown_input() {
        for input in ["", "calibrate 5", "calibrate", "status now", "cal7 x", "frobnicate"] {
            assert!(input.parse::<MeterCommand>().is_err(), "{input:?}");
        }
    }

    #[test]
    fn status_lists_counters_and_calibration() {
        use crate::calibration::CalibrationConstants;
        use crate::meter::{ConnectionStatus, IngestStats};

        let calibration = CalibrationConstants::default();
        let snapshot = MeterSnapshot {
            status: ConnectionStatus::Connected,
            port: Some("COM3".into()),
            session: None,
            calibration,
            calibration_summary: calibration.summary(),
            calibration_revision: 1,
            unsaved_calibration: true,
            stats: IngestStats {
                accepted: 12,
                dropped: 2,
                ph_failures: 0,
                record_failures: 0,
            },
            last_ph: Some(6.16),
            recent_voltage: vec![50.0],
            recent_temperature: vec![25.0],
            trend_len: 12,
        };

        let text = render_status(&snapshot);
        assert!(text.starts_with("connected to COM3\n"));
        assert!(text.contains("accepted 12, dropped 2"));
        assert!(text.contains("last pH 6.16"));
        assert!(text.contains("k2*T @ acid: 60.0, mV/pH"));
        assert!(text.ends_with("(calibration not saved yet)"));
    }
}
