use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::presentation::OutputFormat;
use crate::settings::{SettingsOverrides, DEFAULT_SETTINGS_FILE};

/// Serial pH meter: live readings, three-point calibration, session logs
#[derive(Parser, Debug)]
#[command(name = "phmeter")]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file
    #[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    /// Connect to this port on startup
    #[arg(long, global = true)]
    pub port: Option<String>,

    #[arg(long, global = true, value_name = "BAUD")]
    pub baud: Option<u32>,

    /// Directory for session logs
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Calibration file
    #[arg(long, global = true, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Offer a simulated sensor board as port `sim` and connect to it
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Play back a capture file as port `replay` and connect to it
    #[arg(long, global = true, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Read the meter interactively (default)
    Run,
    /// List serial ports and exit
    Ports,
    /// Print the stored calibration and exit
    Calibration,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }

    pub fn overrides(&self, debug: bool) -> SettingsOverrides {
        SettingsOverrides {
            port: self.port.clone(),
            baud_rate: self.baud,
            data_dir: self.data_dir.clone(),
            calibration_file: self.calibration.clone(),
            debug,
        }
    }
}
