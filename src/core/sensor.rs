//! Color sensor facade
//!
//! [`ColorSensor`] wires the locator, connection manager, poller and
//! activity log together for one device and turns every outcome into
//! [`SensorEvent`]s. It is synchronous: whoever drives it delivers inbound
//! chunks through [`handle_data`](ColorSensor::handle_data), link loss
//! through [`handle_lost`](ColorSensor::handle_lost) and timer ticks
//! through [`handle_tick`](ColorSensor::handle_tick), one at a time.

use std::time::Duration;

use super::codec::{self, Command};
use super::connection::{ConnectionManager, ConnectionState};
use super::events::{EventSink, SensorEvent};
use super::locator::{CandidateDevice, DeviceLocator};
use super::logger::{ActivityLog, LogLevel};
use super::poller::{PollSession, Poller, PollerState};
use super::SensorError;

/// One sensor: discovery, connection, polling and logging
pub struct ColorSensor {
    locator: DeviceLocator,
    connection: ConnectionManager,
    poller: Poller,
    log: ActivityLog,
    sink: Box<dyn EventSink>,
}

impl ColorSensor {
    /// Assemble a sensor from its parts
    pub fn new(
        locator: DeviceLocator,
        connection: ConnectionManager,
        poller: Poller,
        log: ActivityLog,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            locator,
            connection,
            poller,
            log,
            sink,
        }
    }

    /// Connection state
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Poller state
    pub fn poller_state(&self) -> PollerState {
        self.poller.state()
    }

    /// Port of the open connection
    pub fn port_name(&self) -> Option<&str> {
        self.connection.port_name()
    }

    /// Generation of the current connection; tags inbound chunks
    pub fn generation(&self) -> u64 {
        self.connection.generation()
    }

    /// Activity log
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// Clear the activity log
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Record an informational message
    pub fn note(&mut self, message: impl Into<String>) {
        self.record(LogLevel::Info, message);
    }

    fn record(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = self.log.record(level, message);
        self.sink.emit(SensorEvent::Log(entry));
    }

    /// Log `err` and hand it back
    fn report(&mut self, context: &str, err: SensorError) -> SensorError {
        tracing::warn!("{}: {}", context, err);
        self.record(LogLevel::Warn, format!("{context}: {err}"));
        err
    }

    /// List every port, flagging the ones that look like the sensor
    pub fn scan(&mut self) -> Result<Vec<CandidateDevice>, SensorError> {
        self.locator
            .scan()
            .map_err(|e| self.report("Port scan failed", e))
    }

    /// Locate the sensor and open it.
    ///
    /// Already connected is reported in the log and is not an error.
    pub fn connect(&mut self) -> Result<(), SensorError> {
        if self.connection.is_open() {
            let port = self.connection.port_name().unwrap_or_default().to_string();
            self.note(format!("Already connected to {port}"));
            return Ok(());
        }

        let candidate = match self.locator.locate() {
            Ok(candidate) => candidate,
            Err(e) => return Err(self.report("Could not connect", e)),
        };
        if let Some(ref c) = candidate {
            self.note(format!("Found sensor on {}", c.port_name));
        }

        if let Err(e) = self.connection.open(candidate.as_ref()) {
            return Err(self.report("Could not connect", e));
        }

        let info = self.connection.connection_info().unwrap_or_default();
        tracing::info!("Connected: {}", info);
        self.note(format!("Connected: {info}"));
        self.sink
            .emit(SensorEvent::ConnectionChanged(ConnectionState::Open));
        Ok(())
    }

    /// Stop polling and close the connection.
    ///
    /// Not connected is reported in the log and is not an error.
    pub fn disconnect(&mut self) {
        if !self.connection.is_open() {
            self.note("Not connected");
            return;
        }

        self.stop_polling();
        self.connection.close();
        tracing::info!("Disconnected");
        self.note("Disconnected");
        self.sink
            .emit(SensorEvent::ConnectionChanged(ConnectionState::Closed));
    }

    /// Store the current reading as black
    pub fn calibrate_black(&mut self) -> Result<(), SensorError> {
        self.calibrate(Command::CalibrateBlack, "Calibrated black")
    }

    /// Store the current reading as white
    pub fn calibrate_white(&mut self) -> Result<(), SensorError> {
        self.calibrate(Command::CalibrateWhite, "Calibrated white")
    }

    fn calibrate(&mut self, command: Command, done: &str) -> Result<(), SensorError> {
        match self.connection.write(command) {
            Ok(()) => {
                self.record(LogLevel::Command, done);
                Ok(())
            }
            Err(SensorError::NotConnected) => {
                Err(self.report("Connect to the device first", SensorError::NotConnected))
            }
            Err(e) => Err(self.report("Calibration failed", e)),
        }
    }

    /// Ask for one reading now
    pub fn request_reading(&mut self) -> Result<(), SensorError> {
        self.poller
            .start_single(&mut self.connection)
            .map_err(|e| self.report("Reading request failed", e))
    }

    /// Request a reading every `interval` until stopped or disconnected
    pub fn start_polling(&mut self, interval: Duration) -> Result<PollSession, SensorError> {
        match self.poller.start_periodic(&self.connection, interval) {
            Ok(session) => {
                self.note(format!("Polling every {} ms", session.interval_ms()));
                self.sink
                    .emit(SensorEvent::PollingChanged(PollerState::Active));
                Ok(session)
            }
            Err(e) => Err(self.report("Could not start polling", e)),
        }
    }

    /// Stop periodic polling. Returns false if it was not running.
    pub fn stop_polling(&mut self) -> bool {
        if !self.poller.stop() {
            return false;
        }
        self.note("Polling stopped");
        self.sink
            .emit(SensorEvent::PollingChanged(PollerState::Idle));
        true
    }

    /// Deliver a timer tick for poll session `poll_id`
    pub fn handle_tick(&mut self, poll_id: u64) {
        if let Err(e) = self.poller.on_tick(poll_id, &mut self.connection) {
            self.report("Reading request failed", e);
        }
    }

    /// The link of connection `generation` failed underneath us.
    ///
    /// Stops polling, closes the connection and logs a warning. Ignored for
    /// an earlier connection or when already closed.
    pub fn handle_lost(&mut self, generation: u64, reason: &str) {
        if generation != self.connection.generation() || !self.connection.is_open() {
            tracing::debug!("Ignoring loss of stale connection {}", generation);
            return;
        }

        self.stop_polling();
        self.connection.close();
        tracing::warn!("Connection lost: {}", reason);
        self.record(LogLevel::Warn, format!("Connection lost: {reason}"));
        self.sink
            .emit(SensorEvent::ConnectionChanged(ConnectionState::Closed));
    }

    /// Deliver an inbound chunk from connection `generation`.
    ///
    /// Chunks from an earlier connection are dropped. Returns the number of
    /// readings emitted.
    pub fn handle_data(&mut self, generation: u64, chunk: &[u8]) -> usize {
        if generation != self.connection.generation() {
            tracing::debug!(
                "Dropping {} bytes from stale connection {}",
                chunk.len(),
                generation
            );
            return 0;
        }

        let mut readings = 0;
        for line in self.connection.on_data_received(chunk) {
            if line.is_empty() {
                continue;
            }
            match codec::decode(&line) {
                Some(reading) => {
                    self.record(LogLevel::Data, line);
                    self.sink.emit(SensorEvent::Reading(reading));
                    readings += 1;
                }
                None => {
                    tracing::debug!("Ignoring line {:?}", line);
                    self.record(LogLevel::Warn, format!("Ignored line: {line:?}"));
                }
            }
        }
        readings
    }
}

impl Drop for ColorSensor {
    fn drop(&mut self) {
        self.poller.stop();
        self.connection.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::ColorReading;
    use crate::core::connection::LinkRoute;
    use crate::core::events::SharedSink;
    use crate::core::poller::NoTicker;
    use crate::core::simulator::SimulatedSensor;
    use crate::core::transport::{LinkCallback, LinkEvent};

    fn sensor(sim: &SimulatedSensor) -> (ColorSensor, SharedSink) {
        let sink = SharedSink::new();
        let route: LinkRoute = Box::new(|_: u64| -> LinkCallback { Box::new(|_: LinkEvent| {}) });
        let sensor = ColorSensor::new(
            DeviceLocator::new(sim.enumerator()),
            ConnectionManager::new(sim.backend(), route),
            Poller::new(Box::new(NoTicker)),
            ActivityLog::default(),
            Box::new(sink.clone()),
        );
        (sensor, sink)
    }

    fn readings(events: &[SensorEvent]) -> Vec<ColorReading> {
        events
            .iter()
            .filter_map(|e| match e {
                SensorEvent::Reading(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_emits_open() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);

        sensor.connect().unwrap();
        assert_eq!(sensor.state(), ConnectionState::Open);
        assert!(sink
            .events()
            .contains(&SensorEvent::ConnectionChanged(ConnectionState::Open)));
    }

    #[test]
    fn test_connect_twice_keeps_connection() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);

        sensor.connect().unwrap();
        let generation = sensor.generation();
        sink.take();

        sensor.connect().unwrap();
        assert_eq!(sensor.state(), ConnectionState::Open);
        assert_eq!(sensor.generation(), generation);
        assert_eq!(sim.open_count(), 1);

        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SensorEvent::Log(e) if e.message.starts_with("Already connected")));
    }

    #[test]
    fn test_connect_without_device() {
        let sim = SimulatedSensor::new().unplugged();
        let (mut sensor, sink) = sensor(&sim);

        assert!(matches!(sensor.connect(), Err(SensorError::DeviceUnavailable(_))));
        assert_eq!(sensor.state(), ConnectionState::Closed);
        assert!(matches!(sink.events().last(), Some(SensorEvent::Log(e)) if e.level == LogLevel::Warn));
    }

    #[test]
    fn test_disconnect_when_closed_is_informational() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);

        sensor.disconnect();
        let events = sink.take();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SensorEvent::Log(e) if e.level == LogLevel::Info));
    }

    #[test]
    fn test_valid_line_emits_one_reading() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();
        sink.take();

        let generation = sensor.generation();
        assert_eq!(sensor.handle_data(generation, b"R 255 G 0 B 127\r"), 1);

        let events = sink.take();
        assert_eq!(readings(&events), vec![ColorReading::new(255, 0, 127)]);
        assert!(matches!(&events[0], SensorEvent::Log(e) if e.level == LogLevel::Data && e.message == "R 255 G 0 B 127"));
    }

    #[test]
    fn test_garbage_logs_once_without_reading() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();
        sink.take();
        let log_before = sensor.log().len();

        let generation = sensor.generation();
        assert_eq!(sensor.handle_data(generation, b"garbage\r"), 0);
        assert_eq!(sensor.handle_data(generation, b"R 1 G 2\r"), 0);

        let events = sink.take();
        assert!(readings(&events).is_empty());
        assert_eq!(events.len(), 2);
        assert_eq!(sensor.log().len(), log_before + 2);
    }

    #[test]
    fn test_stale_generation_dropped() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();
        let old = sensor.generation();
        sensor.disconnect();
        sensor.connect().unwrap();
        sink.take();

        assert_eq!(sensor.handle_data(old, b"R 1 G 2 B 3\r"), 0);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_digit_labels_use_first_three_runs() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();
        sink.take();

        let generation = sensor.generation();
        assert_eq!(sensor.handle_data(generation, b"1 2 3 4 5 6\r"), 1);
        assert_eq!(readings(&sink.take()), vec![ColorReading::new(1, 2, 3)]);
    }

    #[test]
    fn test_link_lost_closes_and_warns() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();
        let session = sensor.start_polling(Duration::from_millis(100)).unwrap();
        sink.take();

        sensor.handle_lost(sensor.generation(), "device removed");
        assert_eq!(sensor.state(), ConnectionState::Closed);
        assert_eq!(sensor.poller_state(), PollerState::Idle);

        let events = sink.take();
        assert!(events.contains(&SensorEvent::PollingChanged(PollerState::Idle)));
        assert_eq!(
            events.last(),
            Some(&SensorEvent::ConnectionChanged(ConnectionState::Closed))
        );
        assert!(events.iter().any(|e| matches!(
            e,
            SensorEvent::Log(entry)
                if entry.level == LogLevel::Warn && entry.message == "Connection lost: device removed"
        )));

        sensor.handle_tick(session.id);
        assert!(sim.written().is_empty());
    }

    #[test]
    fn test_link_lost_ignored_when_stale() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();
        let old = sensor.generation();
        sensor.disconnect();
        sensor.connect().unwrap();
        sink.take();

        sensor.handle_lost(old, "gone");
        assert_eq!(sensor.state(), ConnectionState::Open);
        assert!(sink.events().is_empty());

        sensor.disconnect();
        sink.take();
        sensor.handle_lost(sensor.generation(), "gone");
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_calibration_requires_connection() {
        let sim = SimulatedSensor::new();
        let (mut sensor, _) = sensor(&sim);

        assert!(matches!(sensor.calibrate_black(), Err(SensorError::NotConnected)));
        sensor.connect().unwrap();
        sensor.calibrate_black().unwrap();
        sensor.calibrate_white().unwrap();
        assert_eq!(sim.written(), b"01");
    }

    #[test]
    fn test_disconnect_stops_polling() {
        let sim = SimulatedSensor::new();
        let (mut sensor, sink) = sensor(&sim);
        sensor.connect().unwrap();

        let session = sensor.start_polling(Duration::from_millis(100)).unwrap();
        assert_eq!(sensor.poller_state(), PollerState::Active);

        sensor.disconnect();
        assert_eq!(sensor.poller_state(), PollerState::Idle);
        assert!(sink
            .events()
            .contains(&SensorEvent::PollingChanged(PollerState::Idle)));

        // A tick that was already queued must not reach the closed channel
        sensor.handle_tick(session.id);
        assert!(sim.written().is_empty());
    }

    #[test]
    fn test_polling_requires_connection() {
        let sim = SimulatedSensor::new();
        let (mut sensor, _) = sensor(&sim);
        assert!(matches!(
            sensor.start_polling(Duration::from_millis(100)),
            Err(SensorError::NotConnected)
        ));
        assert!(!sensor.stop_polling());
    }

    #[test]
    fn test_clear_log() {
        let sim = SimulatedSensor::new();
        let (mut sensor, _) = sensor(&sim);
        sensor.note("Started");
        assert_eq!(sensor.log().len(), 1);
        sensor.clear_log();
        assert!(sensor.log().is_empty());
    }
}
