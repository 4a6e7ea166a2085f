//! Simulated sensor
//!
//! An in-memory stand-in for the Arduino color sensor. It shows up in port
//! scans with the sensor's USB identity, opens like a serial port, and
//! answers the single-byte command set the way the firmware does: `2`
//! replies with one `R <r> G <g> B <b>\r\n` line, `0`/`1` are accepted
//! silently. Cloned handles share state, so a test can keep one handle
//! while the sensor owns the others.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

use super::codec::{ColorReading, Command};
use super::locator::{DeviceIdentity, PortDescriptor, PortEnumerator, SENSOR_IDENTITY};
use super::transport::{
    LinkCallback, LinkEvent, SerialBackend, SerialChannel, SerialConfig, TransportError,
};

/// Default simulated port name
pub const SIMULATED_PORT: &str = "/dev/ttySIM0";

struct SimState {
    port_name: String,
    identity: DeviceIdentity,
    present: bool,
    refuse_open: bool,
    auto_reply: bool,
    reading: ColorReading,
    black: Option<ColorReading>,
    white: Option<ColorReading>,
    /// Callback of the open channel, None while closed
    on_event: Option<LinkCallback>,
    /// Bumped per open; a channel handle only acts while it matches
    channel_id: u64,
    opens: usize,
    written: Vec<u8>,
}

/// Cloneable handle to a simulated sensor
#[derive(Clone)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSensor {
    /// A plugged-in sensor on [`SIMULATED_PORT`] that answers reading requests
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                port_name: SIMULATED_PORT.to_string(),
                identity: SENSOR_IDENTITY,
                present: true,
                refuse_open: false,
                auto_reply: true,
                reading: ColorReading::new(255, 128, 64),
                black: None,
                white: None,
                on_event: None,
                channel_id: 0,
                opens: 0,
                written: Vec::new(),
            })),
        }
    }

    /// Use a different port name
    pub fn with_port(self, port_name: &str) -> Self {
        self.state.lock().port_name = port_name.to_string();
        self
    }

    /// Advertise a different USB identity
    pub fn with_identity(self, identity: DeviceIdentity) -> Self {
        self.state.lock().identity = identity;
        self
    }

    /// Not plugged in: missing from scans and cannot be opened
    pub fn unplugged(self) -> Self {
        self.state.lock().present = false;
        self
    }

    /// Listed in scans, but the OS refuses to open it
    pub fn busy(self) -> Self {
        self.state.lock().refuse_open = true;
        self
    }

    /// Plug in or pull the device.
    ///
    /// Pulling it while a channel is open reports the link as lost.
    pub fn set_present(&self, present: bool) {
        let callback = {
            let mut state = self.state.lock();
            state.present = present;
            if present {
                None
            } else {
                state.on_event.take()
            }
        };
        if let Some(mut callback) = callback {
            callback(LinkEvent::Lost("device removed".to_string()));
        }
    }

    /// Reply to reading requests or stay silent
    pub fn set_auto_reply(&self, auto_reply: bool) {
        self.state.lock().auto_reply = auto_reply;
    }

    /// Color reported by the next reading requests
    pub fn set_reading(&self, reading: ColorReading) {
        self.state.lock().reading = reading;
    }

    /// Reading stored by the last black calibration
    pub fn black_point(&self) -> Option<ColorReading> {
        self.state.lock().black
    }

    /// Reading stored by the last white calibration
    pub fn white_point(&self) -> Option<ColorReading> {
        self.state.lock().white
    }

    /// Push raw bytes to the host as if the device sent them.
    ///
    /// Returns false if no channel is open.
    pub fn inject(&self, data: &[u8]) -> bool {
        let (callback, channel_id) = {
            let mut state = self.state.lock();
            (state.on_event.take(), state.channel_id)
        };
        let Some(mut callback) = callback else {
            return false;
        };
        callback(LinkEvent::Data(Bytes::copy_from_slice(data)));

        let mut state = self.state.lock();
        // The channel may have been closed from inside the callback
        if state.channel_id == channel_id && state.present && state.on_event.is_none() {
            state.on_event = Some(callback);
        }
        true
    }

    /// Every byte the host has written, across all connections
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Check if a channel is open
    pub fn is_open(&self) -> bool {
        self.state.lock().channel_id_open()
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.state.lock().opens
    }

    /// Port enumerator that lists this device
    pub fn enumerator(&self) -> Box<dyn PortEnumerator> {
        Box::new(self.clone())
    }

    /// Serial backend that opens this device
    pub fn backend(&self) -> Box<dyn SerialBackend> {
        Box::new(self.clone())
    }

    fn handle_write(&self, channel_id: u64, data: &[u8]) -> Result<(), TransportError> {
        let reply = {
            let mut state = self.state.lock();
            if state.channel_id != channel_id || !state.channel_id_open() {
                return Err(TransportError::Disconnected);
            }
            if !state.present {
                return Err(TransportError::Disconnected);
            }
            state.written.extend_from_slice(data);

            let r = state.reading;
            let mut reply = Vec::new();
            for &byte in data {
                match byte {
                    b if b == Command::CalibrateBlack.as_byte() => state.black = Some(r),
                    b if b == Command::CalibrateWhite.as_byte() => state.white = Some(r),
                    b if b == Command::RequestReading.as_byte() && state.auto_reply => {
                        reply.extend_from_slice(format!("R {} G {} B {}\r\n", r.r, r.g, r.b).as_bytes());
                    }
                    _ => {}
                }
            }
            reply
        };

        if !reply.is_empty() {
            self.inject(&reply);
        }
        Ok(())
    }

    fn handle_close(&self, channel_id: u64) {
        let mut state = self.state.lock();
        if state.channel_id == channel_id {
            state.on_event = None;
            state.channel_id += 1;
        }
    }
}

impl SimState {
    /// Odd ids are open channels, even ids mean closed
    fn channel_id_open(&self) -> bool {
        self.channel_id % 2 == 1
    }
}

impl PortEnumerator for SimulatedSensor {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, TransportError> {
        let state = self.state.lock();
        if !state.present {
            return Ok(Vec::new());
        }
        let mut port = PortDescriptor::usb(
            &state.port_name,
            state.identity.vendor_id,
            state.identity.product_id,
        );
        port.description = Some("Simulated color sensor".to_string());
        Ok(vec![port])
    }
}

impl SerialBackend for SimulatedSensor {
    fn open(
        &mut self,
        config: &SerialConfig,
        on_event: LinkCallback,
    ) -> Result<Box<dyn SerialChannel>, TransportError> {
        let mut state = self.state.lock();
        if !state.present || config.port != state.port_name {
            return Err(TransportError::PortNotFound(config.port.clone()));
        }
        if state.refuse_open {
            return Err(TransportError::PermissionDenied(config.port.clone()));
        }
        if state.channel_id_open() {
            return Err(TransportError::ConnectionFailed(format!(
                "{} is already open",
                config.port
            )));
        }

        state.channel_id += 1;
        state.opens += 1;
        state.on_event = Some(on_event);
        tracing::debug!("Simulated sensor opened on {}", config.port);

        Ok(Box::new(SimulatedChannel {
            sensor: self.clone(),
            channel_id: state.channel_id,
            info: format!("{} (simulated)", config.connection_info()),
        }))
    }
}

struct SimulatedChannel {
    sensor: SimulatedSensor,
    channel_id: u64,
    info: String,
}

impl SerialChannel for SimulatedChannel {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.sensor.handle_write(self.channel_id, data)
    }

    fn close(&mut self) {
        self.sensor.handle_close(self.channel_id);
    }

    fn connection_info(&self) -> String {
        self.info.clone()
    }
}

impl Drop for SimulatedChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(sim: &SimulatedSensor) -> (Box<dyn SerialChannel>, Arc<Mutex<Vec<u8>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let channel = sim
            .backend()
            .open(
                &SerialConfig::sensor(SIMULATED_PORT),
                Box::new(move |event: LinkEvent| {
                    if let LinkEvent::Data(data) = event {
                        sink.lock().extend_from_slice(&data);
                    }
                }),
            )
            .unwrap();
        (channel, received)
    }

    #[test]
    fn test_listed_with_sensor_identity() {
        let sim = SimulatedSensor::new();
        let ports = sim.enumerator().available_ports().unwrap();
        assert_eq!(ports.len(), 1);
        assert!(ports[0].matches(&SENSOR_IDENTITY));

        sim.set_present(false);
        assert!(sim.enumerator().available_ports().unwrap().is_empty());
    }

    #[test]
    fn test_reading_request_replies() {
        let sim = SimulatedSensor::new();
        sim.set_reading(ColorReading::new(10, 20, 30));
        let (mut channel, received) = open(&sim);

        channel.write(b"2").unwrap();
        assert_eq!(*received.lock(), b"R 10 G 20 B 30\r\n");
        assert_eq!(sim.written(), b"2");
    }

    #[test]
    fn test_calibration_is_silent() {
        let sim = SimulatedSensor::new();
        let (mut channel, received) = open(&sim);

        channel.write(b"0").unwrap();
        sim.set_reading(ColorReading::new(900, 900, 900));
        channel.write(b"1").unwrap();

        assert!(received.lock().is_empty());
        assert_eq!(sim.black_point(), Some(ColorReading::new(255, 128, 64)));
        assert_eq!(sim.white_point(), Some(ColorReading::new(900, 900, 900)));
    }

    #[test]
    fn test_close_stops_delivery() {
        let sim = SimulatedSensor::new();
        let (mut channel, received) = open(&sim);
        assert!(sim.is_open());

        channel.close();
        assert!(!sim.is_open());
        assert!(!sim.inject(b"R 1 G 2 B 3\r"));
        assert!(matches!(channel.write(b"2"), Err(TransportError::Disconnected)));
        assert!(received.lock().is_empty());
    }

    #[test]
    fn test_unplug_reports_lost_once() {
        let sim = SimulatedSensor::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = events.clone();
        let mut channel = sim
            .backend()
            .open(
                &SerialConfig::sensor(SIMULATED_PORT),
                Box::new(move |event: LinkEvent| seen.lock().push(event)),
            )
            .unwrap();

        sim.set_present(false);
        sim.set_present(false);
        assert_eq!(
            *events.lock(),
            vec![LinkEvent::Lost("device removed".to_string())]
        );
        assert!(!sim.inject(b"R 1 G 2 B 3\r"));
        assert!(matches!(channel.write(b"2"), Err(TransportError::Disconnected)));

        channel.close();
        sim.set_present(true);
        assert!(!sim.is_open());
    }

    #[test]
    fn test_single_open_at_a_time() {
        let sim = SimulatedSensor::new();
        let (_channel, _) = open(&sim);
        let second = sim.backend().open(
            &SerialConfig::sensor(SIMULATED_PORT),
            Box::new(|_: LinkEvent| {}),
        );
        assert!(matches!(second, Err(TransportError::ConnectionFailed(_))));
    }

    #[test]
    fn test_busy_and_unplugged() {
        let busy = SimulatedSensor::new().busy();
        let err = busy
            .backend()
            .open(&SerialConfig::sensor(SIMULATED_PORT), Box::new(|_: LinkEvent| {}));
        assert!(matches!(err, Err(TransportError::PermissionDenied(_))));

        let gone = SimulatedSensor::new().unplugged();
        let err = gone
            .backend()
            .open(&SerialConfig::sensor(SIMULATED_PORT), Box::new(|_: LinkEvent| {}));
        assert!(matches!(err, Err(TransportError::PortNotFound(_))));
    }
}
