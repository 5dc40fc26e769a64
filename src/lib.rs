pub mod calibration;
pub mod cli;
pub mod conversion;
pub mod error;
pub mod meter;
pub mod presentation;
pub mod recorder;
pub mod sampling;
pub mod settings;
pub mod transport;
mod utils;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use calibration::CalibrationStore;
use cli::{Cli, Commands};
use meter::{ControllerOptions, MeterCommand, MeterController, Reply, SampleIngestor};
use presentation::{ConsoleObserver, OutputFormat, StatusNotice};
use recorder::SessionRecorder;
use settings::{MeterSettings, SettingsStore};
use transport::{PortCatalog, PortProvider, REPLAY_PORT, SIMULATED_PORT};

struct AppState {
    settings: SettingsStore,
    effective: MeterSettings,
    format: OutputFormat,
}

impl AppState {
    fn port_catalog(&self, cli: &Cli) -> PortCatalog {
        PortCatalog::new(self.effective.baud_rate, self.effective.read_timeout())
            .with_simulator(cli.simulate)
            .with_replay(cli.replay.clone())
    }

    /// Command replies go to stderr in JSON mode so stdout stays one event per line.
    fn say(&self, text: &str) {
        match self.format {
            OutputFormat::Text => println!("{text}"),
            OutputFormat::Json => eprintln!("{text}"),
        }
    }
}

pub fn run() -> Result<()> {
    // RUST_LOG wins; info otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let debug = settings::debug_mode_from_env();

    let settings = SettingsStore::load(cli.settings.clone());
    let effective = settings.settings().clone().with_overrides(&cli.overrides(debug));
    let state = AppState {
        settings,
        effective,
        format: cli.format,
    };

    match cli.command() {
        Commands::Ports => list_ports(&state, &cli),
        Commands::Calibration => show_calibration(&state),
        Commands::Run => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start the async runtime")?;
            runtime.block_on(run_meter(state, cli))
        }
    }
}

fn list_ports(state: &AppState, cli: &Cli) -> Result<()> {
    let ports = state.port_catalog(cli).available_ports();
    match state.format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&ports)?),
        OutputFormat::Text if ports.is_empty() => println!("no ports found"),
        OutputFormat::Text => {
            for entry in ports {
                println!("{entry}");
            }
        }
    }
    Ok(())
}

fn show_calibration(state: &AppState) -> Result<()> {
    let path = &state.effective.calibration_file;
    let store = CalibrationStore::load(path.clone())
        .with_context(|| format!("Failed to load calibration from {}", path.display()))?;
    let constants = store.constants();
    let summary = constants.summary();

    match state.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "calibration": constants,
                "summary": summary,
            }))?
        ),
        OutputFormat::Text => {
            println!("{}", path.display());
            println!(
                "  ph7_cal {}  ph4_cal {}  ph10_cal {}  T {}",
                constants.offset_mv, constants.acid_mv, constants.alkaline_mv, constants.temperature_k
            );
            println!("{}", summary.equation);
            println!("{}", summary.offset);
            println!("{}", summary.acid_slope);
            println!("{}", summary.alkaline_slope);
        }
    }
    Ok(())
}

async fn run_meter(mut state: AppState, cli: Cli) -> Result<()> {
    info!("phmeter starting up...");
    let settings = state.effective.clone();

    fs::create_dir_all(&settings.data_dir).with_context(|| {
        format!("Failed to create data directory {}", settings.data_dir.display())
    })?;
    let calibration = CalibrationStore::load(settings.calibration_file.clone()).with_context(|| {
        format!(
            "Failed to load calibration from {}",
            settings.calibration_file.display()
        )
    })?;

    let mut ingestor = SampleIngestor::new(
        calibration,
        SessionRecorder::new(settings.data_dir.clone()),
        settings.window_capacity,
    );
    ingestor.add_observer(Box::new(ConsoleObserver::stdout(state.format)));

    let controller = MeterController::spawn(
        ingestor,
        Box::new(state.port_catalog(&cli)),
        ControllerOptions {
            tick_interval: settings.tick_interval(),
            read_timeout: settings.read_timeout(),
            default_port: settings.default_port.clone(),
        },
    );
    controller.notify(StatusNotice::Ready).await?;

    let startup_port = cli
        .port
        .clone()
        .or_else(|| cli.simulate.then(|| SIMULATED_PORT.to_string()))
        .or_else(|| cli.replay.as_ref().map(|_| REPLAY_PORT.to_string()));
    if let Some(port) = startup_port {
        dispatch(&mut state, &controller, MeterCommand::Connect(Some(port))).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<MeterCommand>() {
                    Ok(command) => {
                        if dispatch(&mut state, &controller, command).await {
                            break;
                        }
                    }
                    Err(err) => {
                        state.say(&err.to_string());
                        state.say(meter::commands::HELP);
                    }
                },
                Ok(None) => {
                    info!("stdin closed; press Ctrl-C to stop");
                    stdin_open = false;
                }
                Err(err) => {
                    warn!("Failed to read stdin: {err}");
                    stdin_open = false;
                }
            },
            signal = &mut ctrl_c => {
                if let Err(err) = signal {
                    warn!("Ctrl-C handler failed: {err}");
                }
                info!("Interrupted; shutting down");
                break;
            }
        }
    }

    controller.shutdown().await?;
    info!("phmeter stopped");
    Ok(())
}

/// Run one operator command. Returns true when the user asked to quit.
async fn dispatch(state: &mut AppState, controller: &MeterController, command: MeterCommand) -> bool {
    match meter::execute(controller, command).await {
        Ok(Reply::Text(text)) => state.say(&text),
        Ok(Reply::Connected(connection)) => {
            state.say(&format!(
                "logging to {}",
                connection.session.path.display()
            ));
            if connection.port != SIMULATED_PORT && connection.port != REPLAY_PORT {
                if let Err(err) = state.settings.set_default_port(&connection.port) {
                    warn!("Could not remember port {}: {err:#}", connection.port);
                }
            }
        }
        Ok(Reply::Quit) => return true,
        Err(message) => state.say(&format!("error: {message}")),
    }
    false
}
