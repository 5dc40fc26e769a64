use std::io::{self, Write};

use log::warn;
use serde::Serialize;

use crate::calibration::CalibrationSummary;

use super::{CalibrationEvent, MeterObserver, SampleEvent, SampleUpdate, StatusEvent, StatusNotice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    /// One `{"event": .., "payload": ..}` object per line.
    Json,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    event: &'a str,
    payload: T,
}

/// Writes readings and notices to a terminal or pipe.
pub struct ConsoleObserver {
    out: Box<dyn Write + Send>,
    format: OutputFormat,
}

impl ConsoleObserver {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(Box::new(io::stdout()), format)
    }

    pub fn new(out: Box<dyn Write + Send>, format: OutputFormat) -> Self {
        Self { out, format }
    }

    fn emit<T: Serialize>(&mut self, event: &str, payload: T) {
        let result = serde_json::to_string(&Envelope { event, payload })
            .map_err(io::Error::from)
            .and_then(|line| writeln!(self.out, "{line}"));
        if let Err(err) = result {
            warn!("Failed to emit {event}: {err}");
        }
    }

    fn write_text(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(err) = self.out.write_fmt(text).and_then(|_| self.out.flush()) {
            warn!("Console write failed: {err}");
        }
    }
}

impl MeterObserver for ConsoleObserver {
    fn on_sample(&mut self, update: &SampleUpdate<'_>) {
        match self.format {
            OutputFormat::Json => self.emit("sample-accepted", SampleEvent::from(update)),
            OutputFormat::Text => {
                let ph = update
                    .ph
                    .map(|ph| format!("{ph:>5.2}"))
                    .unwrap_or_else(|| "  --".to_string());
                let index = update.trend.last().map(|p| p.index).unwrap_or_default();
                self.write_text(format_args!(
                    "[{index:>5}] pH {ph}   T {:>6.2} ℃   RH {:>5.1} %   ΔE {:>8.2} mV\n",
                    update.sample.temperature_c,
                    update.sample.humidity_pct,
                    update.voltage_diff_mv,
                ));
            }
        }
    }

    fn on_status(&mut self, notice: &StatusNotice) {
        match self.format {
            OutputFormat::Json => self.emit("status-changed", StatusEvent::from(notice)),
            OutputFormat::Text => self.write_text(format_args!("{notice}\n")),
        }
    }

    fn on_calibration(&mut self, summary: &CalibrationSummary) {
        match self.format {
            OutputFormat::Json => self.emit(
                "calibration-updated",
                CalibrationEvent {
                    calibration: summary.clone(),
                },
            ),
            OutputFormat::Text => self.write_text(format_args!(
                "{}\n  {}\n  {}\n  {}\n",
                summary.equation, summary.offset, summary.acid_slope, summary.alkaline_slope
            )),
        }
    }
}
