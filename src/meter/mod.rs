pub mod commands;
pub mod controller;
pub mod ingestor;
pub mod state;

pub use commands::{execute, MeterCommand, Reply};
pub use controller::{Connection, ControllerOptions, MeterController};
pub use ingestor::{AcceptedSample, SampleIngestor, TickOutcome};
pub use state::{ConnectionState, ConnectionStatus, IngestStats, MeterSnapshot};
