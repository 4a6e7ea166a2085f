//! Serial port transport implementation

use super::{LinkCallback, LinkEvent, SerialBackend, SerialChannel, TransportError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Baud rate the sensor firmware talks at
pub const SENSOR_BAUD_RATE: u32 = 9600;

/// Read timeout; the reader notices `close` within one of these
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial link parameters. Only the port varies; framing is always
/// 8 data bits, no parity, 1 stop bit, no flow control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl SerialConfig {
    /// The sensor link on `port`
    pub fn sensor(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: SENSOR_BAUD_RATE,
        }
    }

    /// e.g. `/dev/ttyUSB0 @ 9600 baud (8N1 No FC)`
    pub fn connection_info(&self) -> String {
        format!("{} @ {} baud (8N1 No FC)", self.port, self.baud_rate)
    }
}

/// Opens real ports through the `serialport` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSerial;

impl SystemSerial {
    /// Create the backend
    pub fn new() -> Self {
        Self
    }
}

impl SerialBackend for SystemSerial {
    fn open(
        &mut self,
        config: &SerialConfig,
        on_event: LinkCallback,
    ) -> Result<Box<dyn SerialChannel>, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        let reader_port = port
            .try_clone()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let reader = spawn_reader(reader_port, running.clone(), on_event, config.port.clone())?;

        tracing::info!("Opened {}", config.connection_info());

        Ok(Box::new(SystemChannel {
            info: config.connection_info(),
            port: Some(port),
            running,
            reader: Some(reader),
        }))
    }
}

fn spawn_reader(
    mut port: Box<dyn SerialPort>,
    running: Arc<AtomicBool>,
    mut on_event: LinkCallback,
    name: String,
) -> Result<JoinHandle<()>, TransportError> {
    std::thread::Builder::new()
        .name(format!("serial-reader {name}"))
        .spawn(move || {
            let mut buf = vec![0u8; 1024];
            while running.load(Ordering::SeqCst) {
                match port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => on_event(LinkEvent::Data(Bytes::copy_from_slice(&buf[..n]))),
                    Err(e) if e.kind() == ErrorKind::TimedOut => {}
                    Err(e) => {
                        tracing::warn!("Serial read on {} failed: {}", name, e);
                        // A read error after close is expected and not reported
                        if running.swap(false, Ordering::SeqCst) {
                            on_event(LinkEvent::Lost(e.to_string()));
                        }
                        break;
                    }
                }
            }
            tracing::debug!("Reader for {} stopped", name);
        })
        .map_err(TransportError::IoError)
}

struct SystemChannel {
    info: String,
    port: Option<Box<dyn SerialPort>>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialChannel for SystemChannel {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::Disconnected)?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Detached: the reader exits within one read timeout on its own
        drop(self.reader.take());
        if self.port.take().is_some() {
            tracing::info!("Closed {}", self.info);
        }
    }

    fn connection_info(&self) -> String {
        self.info.clone()
    }
}

impl Drop for SystemChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_config_is_fixed() {
        let config = SerialConfig::sensor("/dev/ttyUSB0");
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 9600);
    }

    #[test]
    fn test_connection_info() {
        let config = SerialConfig::sensor("COM3");
        assert_eq!(config.connection_info(), "COM3 @ 9600 baud (8N1 No FC)");
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SystemSerial::new().open(
            &SerialConfig::sensor("/dev/colorprobe-does-not-exist"),
            Box::new(|_: LinkEvent| {}),
        );
        assert!(result.is_err());
    }
}
