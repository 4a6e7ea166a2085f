//! Session management for the sensor
//!
//! A Session runs one [`ColorSensor`] inside a single tokio control task.
//! Every input reaches that task as a [`SessionCommand`] on one channel:
//! calls from the handle, chunks and link loss from the serial reader thread,
//! ticks from the poll timer. The sensor is therefore only ever touched by one task, and
//! events fan out to subscribers over a broadcast channel.

use bytes::Bytes;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::connection::{ConnectionManager, ConnectionState, LinkRoute};
use super::events::SensorEvent;
use super::locator::{CandidateDevice, DeviceLocator, PortEnumerator, SystemPorts};
use super::logger::{ActivityLog, DEFAULT_MAX_ENTRIES};
use super::poller::{PollSession, Poller, PollerState, Ticker};
use super::sensor::ColorSensor;
use super::simulator::SimulatedSensor;
use super::transport::{LinkCallback, LinkEvent, SerialBackend, SystemSerial};
use super::SensorError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Activity log capacity
    pub max_log_entries: usize,
    /// Timestamp activity log lines
    pub timestamps: bool,
    /// Mirror the activity log to this file
    pub log_file: Option<PathBuf>,
    /// Broadcast channel capacity
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_log_entries: DEFAULT_MAX_ENTRIES,
            timestamps: true,
            log_file: None,
            event_capacity: 1024,
        }
    }
}

/// Snapshot of the session state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Connection state
    pub connection: ConnectionState,
    /// Poller state
    pub polling: PollerState,
    /// Port of the open connection
    pub port: Option<String>,
    /// Buffered activity log entries
    pub log_entries: usize,
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug, Clone, Copy)]
enum CalibrationPoint {
    Black,
    White,
}

/// Internal commands for session control
enum SessionCommand {
    Scan(Reply<Result<Vec<CandidateDevice>, SensorError>>),
    Connect(Reply<Result<(), SensorError>>),
    Disconnect(Reply<()>),
    Calibrate(CalibrationPoint, Reply<Result<(), SensorError>>),
    RequestReading(Reply<Result<(), SensorError>>),
    StartPolling(Duration, Reply<Result<PollSession, SensorError>>),
    StopPolling(Reply<bool>),
    ClearLog(Reply<()>),
    Status(Reply<SessionStatus>),
    Data { generation: u64, data: Bytes },
    Lost { generation: u64, reason: String },
    Tick(u64),
    Shutdown,
}

/// Poll timer backed by a tokio interval task
struct TokioTicker {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    task: Option<JoinHandle<()>>,
}

impl Ticker for TokioTicker {
    fn subscribe(&mut self, poll_id: u64, interval: Duration) {
        self.unsubscribe();

        let tx = self.cmd_tx.clone();
        self.task = Some(tokio::spawn(async move {
            // First request goes out one interval after starting
            let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                timer.tick().await;
                if tx.send(SessionCommand::Tick(poll_id)).is_err() {
                    break;
                }
            }
        }));
    }

    fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TokioTicker {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Handle to a running sensor session
pub struct Session {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    event_tx: broadcast::Sender<SensorEvent>,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session against the real serial ports.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: SessionConfig) -> Self {
        Self::start_with(config, Box::new(SystemPorts), Box::new(SystemSerial::new()))
    }

    /// Start a session against a simulated sensor
    pub fn simulated(config: SessionConfig, sim: &SimulatedSensor) -> Self {
        Self::start_with(config, sim.enumerator(), sim.backend())
    }

    /// Start a session with explicit port enumeration and serial backend
    pub fn start_with(
        config: SessionConfig,
        enumerator: Box<dyn PortEnumerator>,
        backend: Box<dyn SerialBackend>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        // Reader threads feed chunks and link loss back into the control task
        let link_tx = cmd_tx.clone();
        let route: LinkRoute = Box::new(move |generation: u64| -> LinkCallback {
            let tx = link_tx.clone();
            Box::new(move |event: LinkEvent| {
                let cmd = match event {
                    LinkEvent::Data(data) => SessionCommand::Data { generation, data },
                    LinkEvent::Lost(reason) => SessionCommand::Lost { generation, reason },
                };
                let _ = tx.send(cmd);
            })
        });

        let ticker = TokioTicker {
            cmd_tx: cmd_tx.clone(),
            task: None,
        };

        let mut log = ActivityLog::new(config.max_log_entries);
        log.set_timestamps(config.timestamps);
        if let Some(ref path) = config.log_file {
            if let Err(e) = log.start_file(path) {
                tracing::warn!("Cannot mirror activity log to {}: {}", path.display(), e);
            }
        }

        let mut sensor = ColorSensor::new(
            DeviceLocator::new(enumerator),
            ConnectionManager::new(backend, route),
            Poller::new(Box::new(ticker)),
            log,
            Box::new(event_tx.clone()),
        );
        sensor.note("Started");

        let task = tokio::spawn(run(sensor, cmd_rx));
        tracing::debug!("Session started");

        Self {
            cmd_tx,
            event_tx,
            task: Some(task),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SensorEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SensorError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| SensorError::SessionClosed)?;
        rx.await.map_err(|_| SensorError::SessionClosed)
    }

    /// List serial ports, flagging sensor matches
    pub async fn scan(&self) -> Result<Vec<CandidateDevice>, SensorError> {
        self.request(SessionCommand::Scan).await?
    }

    /// Locate and open the sensor
    pub async fn connect(&self) -> Result<(), SensorError> {
        self.request(SessionCommand::Connect).await?
    }

    /// Stop polling and close the connection
    pub async fn disconnect(&self) -> Result<(), SensorError> {
        self.request(SessionCommand::Disconnect).await
    }

    /// Store the current reading as black
    pub async fn calibrate_black(&self) -> Result<(), SensorError> {
        self.request(|tx| SessionCommand::Calibrate(CalibrationPoint::Black, tx))
            .await?
    }

    /// Store the current reading as white
    pub async fn calibrate_white(&self) -> Result<(), SensorError> {
        self.request(|tx| SessionCommand::Calibrate(CalibrationPoint::White, tx))
            .await?
    }

    /// Ask for one reading; it arrives as a [`SensorEvent::Reading`]
    pub async fn request_reading(&self) -> Result<(), SensorError> {
        self.request(SessionCommand::RequestReading).await?
    }

    /// Request a reading every `interval`
    pub async fn start_polling(&self, interval: Duration) -> Result<PollSession, SensorError> {
        self.request(|tx| SessionCommand::StartPolling(interval, tx))
            .await?
    }

    /// Stop periodic polling. Returns false if it was not running.
    pub async fn stop_polling(&self) -> Result<bool, SensorError> {
        self.request(SessionCommand::StopPolling).await
    }

    /// Clear the activity log
    pub async fn clear_log(&self) -> Result<(), SensorError> {
        self.request(SessionCommand::ClearLog).await
    }

    /// Current state
    pub async fn status(&self) -> Result<SessionStatus, SensorError> {
        self.request(SessionCommand::Status).await
    }

    /// Disconnect and stop the control task
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The control task holds senders of its own, so it has to be told
        let _ = self.cmd_tx.send(SessionCommand::Shutdown);
    }
}

async fn run(mut sensor: ColorSensor, mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            SessionCommand::Scan(reply) => {
                let _ = reply.send(sensor.scan());
            }
            SessionCommand::Connect(reply) => {
                let _ = reply.send(sensor.connect());
            }
            SessionCommand::Disconnect(reply) => {
                sensor.disconnect();
                let _ = reply.send(());
            }
            SessionCommand::Calibrate(point, reply) => {
                let result = match point {
                    CalibrationPoint::Black => sensor.calibrate_black(),
                    CalibrationPoint::White => sensor.calibrate_white(),
                };
                let _ = reply.send(result);
            }
            SessionCommand::RequestReading(reply) => {
                let _ = reply.send(sensor.request_reading());
            }
            SessionCommand::StartPolling(interval, reply) => {
                let _ = reply.send(sensor.start_polling(interval));
            }
            SessionCommand::StopPolling(reply) => {
                let _ = reply.send(sensor.stop_polling());
            }
            SessionCommand::ClearLog(reply) => {
                sensor.clear_log();
                let _ = reply.send(());
            }
            SessionCommand::Status(reply) => {
                let _ = reply.send(SessionStatus {
                    connection: sensor.state(),
                    polling: sensor.poller_state(),
                    port: sensor.port_name().map(str::to_string),
                    log_entries: sensor.log().len(),
                });
            }
            SessionCommand::Data { generation, data } => {
                sensor.handle_data(generation, &data);
            }
            SessionCommand::Lost { generation, reason } => {
                sensor.handle_lost(generation, &reason);
            }
            SessionCommand::Tick(poll_id) => {
                sensor.handle_tick(poll_id);
            }
            SessionCommand::Shutdown => break,
        }
    }

    if sensor.state() == ConnectionState::Open {
        sensor.disconnect();
    }
    tracing::debug!("Session control task stopped");
}
