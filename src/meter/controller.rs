use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use chrono::Local;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::calibration::{CalibrationConstants, CalibrationPoint};
use crate::error::{MeterError, MeterResult};
use crate::presentation::StatusNotice;
use crate::recorder::SessionInfo;
use crate::transport::{PortEntry, PortProvider, Transport, DEFAULT_READ_TIMEOUT};

use super::{MeterSnapshot, SampleIngestor, TickOutcome};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const REQUEST_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Period of the read-parse-record tick.
    pub tick_interval: Duration,
    /// How long a single tick may block waiting for a line.
    pub read_timeout: Duration,
    /// Used by `connect(None)` before falling back to the first listed port.
    pub default_port: Option<String>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            read_timeout: DEFAULT_READ_TIMEOUT,
            default_port: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub port: String,
    pub session: SessionInfo,
}

enum MeterRequest {
    ListPorts {
        reply: oneshot::Sender<Vec<PortEntry>>,
    },
    Connect {
        port: Option<String>,
        reply: oneshot::Sender<MeterResult<Connection>>,
    },
    Disconnect {
        reply: oneshot::Sender<MeterResult<Option<SessionInfo>>>,
    },
    Capture {
        point: CalibrationPoint,
        reply: oneshot::Sender<MeterResult<CalibrationConstants>>,
    },
    SaveCalibration {
        reply: oneshot::Sender<MeterResult<()>>,
    },
    Snapshot {
        reply: oneshot::Sender<MeterSnapshot>,
    },
    Notify {
        notice: StatusNotice,
    },
    Shutdown {
        reply: oneshot::Sender<MeterResult<()>>,
    },
}

/// Handle to the meter task.
///
/// The task owns the ingestor and the open transport; every operation is a
/// request on its queue, so user actions and ticks never interleave.
#[derive(Clone)]
pub struct MeterController {
    requests: mpsc::Sender<MeterRequest>,
    cancel_token: CancellationToken,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MeterController {
    /// Start the meter task on the current tokio runtime.
    pub fn spawn(
        ingestor: SampleIngestor,
        ports: Box<dyn PortProvider>,
        options: ControllerOptions,
    ) -> Self {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let cancel_token = CancellationToken::new();

        let worker = MeterWorker {
            ingestor,
            ports,
            transport: None,
            options,
        };
        let handle = tokio::spawn(worker.run(rx, cancel_token.clone()));

        Self {
            requests: tx,
            cancel_token,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub async fn list_ports(&self) -> Result<Vec<PortEntry>> {
        self.call(|reply| MeterRequest::ListPorts { reply }).await
    }

    pub async fn connect(&self, port: Option<String>) -> Result<Connection> {
        Ok(self
            .call(|reply| MeterRequest::Connect { port, reply })
            .await??)
    }

    pub async fn disconnect(&self) -> Result<Option<SessionInfo>> {
        Ok(self.call(|reply| MeterRequest::Disconnect { reply }).await??)
    }

    pub async fn capture(&self, point: CalibrationPoint) -> Result<CalibrationConstants> {
        Ok(self
            .call(|reply| MeterRequest::Capture { point, reply })
            .await??)
    }

    pub async fn save_calibration(&self) -> Result<()> {
        Ok(self
            .call(|reply| MeterRequest::SaveCalibration { reply })
            .await??)
    }

    pub async fn snapshot(&self) -> Result<MeterSnapshot> {
        self.call(|reply| MeterRequest::Snapshot { reply }).await
    }

    /// Forward a notice to every observer, in order with the meter's own.
    pub async fn notify(&self, notice: StatusNotice) -> Result<()> {
        self.requests
            .send(MeterRequest::Notify { notice })
            .await
            .map_err(|_| anyhow!("meter task has stopped"))
    }

    /// Close the port and the session, save the calibration and stop the task.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let outcome = match self.requests.send(MeterRequest::Shutdown { reply }).await {
            Ok(()) => rx.await.unwrap_or(Ok(())),
            Err(_) => Ok(()),
        };

        self.cancel_token.cancel();
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(err) = handle.await {
                log_error!("Meter task ended abnormally: {err}");
            }
        }

        outcome.map_err(Into::into)
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> MeterRequest) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(build(reply))
            .await
            .map_err(|_| anyhow!("meter task has stopped"))?;
        rx.await.map_err(|_| anyhow!("meter task dropped the request"))
    }
}

struct MeterWorker {
    ingestor: SampleIngestor,
    ports: Box<dyn PortProvider>,
    transport: Option<Box<dyn Transport>>,
    options: ControllerOptions,
}

impl MeterWorker {
    async fn run(mut self, mut requests: mpsc::Receiver<MeterRequest>, cancel_token: CancellationToken) {
        let mut ticker = time::interval(self.options.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let connected = self.transport.is_some();
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log_info!("Meter task cancelled");
                    self.stop();
                    break;
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        log_info!("All meter handles dropped; stopping");
                        self.stop();
                        break;
                    };
                    if self.handle(request) {
                        break;
                    }
                }
                _ = ticker.tick(), if connected => {
                    self.tick().await;
                }
            }
        }
    }

    /// Returns true once the task should exit.
    fn handle(&mut self, request: MeterRequest) -> bool {
        match request {
            MeterRequest::ListPorts { reply } => {
                let _ = reply.send(self.ports.available_ports());
            }
            MeterRequest::Connect { port, reply } => {
                let _ = reply.send(self.connect(port));
            }
            MeterRequest::Disconnect { reply } => {
                let _ = reply.send(self.disconnect());
            }
            MeterRequest::Capture { point, reply } => {
                let _ = reply.send(self.ingestor.capture(point));
            }
            MeterRequest::SaveCalibration { reply } => {
                let _ = reply.send(self.ingestor.persist_calibration());
            }
            MeterRequest::Snapshot { reply } => {
                let _ = reply.send(self.ingestor.snapshot());
            }
            MeterRequest::Notify { notice } => {
                self.ingestor.notify_status(notice);
            }
            MeterRequest::Shutdown { reply } => {
                let _ = reply.send(self.stop());
                return true;
            }
        }
        false
    }

    fn connect(&mut self, requested: Option<String>) -> MeterResult<Connection> {
        if let Some(port) = self.ingestor.state().port() {
            return Err(MeterError::AlreadyConnected(port.to_string()));
        }

        let port = requested
            .or_else(|| self.options.default_port.clone())
            .or_else(|| {
                self.ports
                    .available_ports()
                    .into_iter()
                    .next()
                    .map(|entry| entry.port_name)
            })
            .ok_or_else(|| MeterError::TransportUnavailable("no serial port available".into()))?;

        let mut transport = match self.ports.open(&port) {
            Ok(transport) => transport,
            Err(err) => {
                log_warn!("Could not open {port}: {err}");
                self.ingestor
                    .notify_status(StatusNotice::TransportError(err.to_string()));
                return Err(err);
            }
        };

        match self.ingestor.connect(&port, Local::now()) {
            Ok(session) => {
                self.transport = Some(transport);
                Ok(Connection { port, session })
            }
            Err(err) => {
                if let Err(close_err) = transport.close() {
                    log_warn!("Failed to release {port}: {close_err}");
                }
                Err(err)
            }
        }
    }

    fn disconnect(&mut self) -> MeterResult<Option<SessionInfo>> {
        self.release_transport();
        self.ingestor.disconnect()
    }

    fn stop(&mut self) -> MeterResult<()> {
        self.release_transport();
        self.ingestor.shutdown()
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(err) = transport.close() {
                log_warn!("Failed to close {}: {err}", transport.name());
            }
        }
    }

    async fn tick(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        let timeout = self.options.read_timeout;
        let joined = tokio::task::spawn_blocking(move || {
            let line = transport.read_line(timeout);
            (transport, line)
        })
        .await;

        let (transport, line) = match joined {
            Ok(result) => result,
            Err(err) => {
                log_error!("Transport reader failed: {err}");
                self.fail_transport(err.to_string());
                return;
            }
        };
        self.transport = Some(transport);

        match line {
            Ok(line) => match self.ingestor.ingest_line(&line) {
                Ok(TickOutcome::Accepted(_)) | Ok(TickOutcome::Dropped) => {}
                Err(err) => log_warn!("Tick skipped: {err}"),
            },
            Err(MeterError::TransportTimeout) => {
                log_debug!("No line within {timeout:?}");
            }
            Err(err) => {
                log_error!("Transport read failed: {err}");
                self.release_transport();
                self.fail_transport(err.to_string());
            }
        }
    }

    fn fail_transport(&mut self, message: String) {
        self.ingestor
            .notify_status(StatusNotice::TransportError(message));
        if let Err(err) = self.ingestor.disconnect() {
            log_error!("Failed to close session after transport loss: {err}");
        }
    }
}
