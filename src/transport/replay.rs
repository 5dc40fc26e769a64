use std::{collections::VecDeque, fs, path::Path, time::Duration};

use crate::error::{MeterError, MeterResult};

use super::Transport;

/// Plays back pre-recorded lines, one per read; a drained replay behaves like a silent port.
pub struct ReplayTransport {
    name: String,
    lines: VecDeque<String>,
    closed: bool,
}

impl ReplayTransport {
    pub fn new<I, S>(name: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            lines: lines.into_iter().map(Into::into).collect(),
            closed: false,
        }
    }

    /// Load a capture file; `#` comment lines (such as a session log header) are skipped.
    pub fn from_file(path: &Path) -> MeterResult<Self> {
        let contents =
            fs::read_to_string(path).map_err(|err| MeterError::persistence(path, err))?;
        let lines = contents
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .map(|line| format!("{line}\n"));
        Ok(Self::new(path.display().to_string(), lines))
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl Transport for ReplayTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_line(&mut self, _timeout: Duration) -> MeterResult<String> {
        if self.closed {
            return Err(MeterError::TransportUnavailable(format!("{} is closed", self.name)));
        }
        self.lines.pop_front().ok_or(MeterError::TransportTimeout)
    }

    fn close(&mut self) -> MeterResult<()> {
        self.closed = true;
        Ok(())
    }
}
