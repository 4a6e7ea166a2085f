//! Transport layer for the sensor's serial link
//!
//! The rest of the core only sees two seams:
//! - [`SerialBackend`] opens a port and subscribes a link callback to it
//! - [`SerialChannel`] is the open port: write bytes, then close it
//!
//! [`SystemSerial`] implements both on top of the `serialport` crate. Tests
//! substitute in-memory fakes.

mod serial;

pub use serial::{SerialConfig, SystemSerial, SENSOR_BAUD_RATE};

use bytes::Bytes;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port enumeration failed
    #[error("Port enumeration failed: {0}")]
    Enumeration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// What an open port reports back to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A chunk read from the port
    Data(Bytes),
    /// Reading failed and the port will deliver nothing more
    Lost(String),
}

/// Receives every [`LinkEvent`] of an open port, in arrival order.
///
/// `Lost` is sent at most once and is never followed by `Data`.
pub type LinkCallback = Box<dyn FnMut(LinkEvent) + Send>;

/// An open serial port.
///
/// Reading is push-driven through the [`LinkCallback`] given at open time;
/// the channel only exposes writes and its own teardown.
pub trait SerialChannel: Send {
    /// Write all of `data` and flush
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Detach the callback and release the port. Returns without waiting
    /// for in-flight reads. Idempotent.
    fn close(&mut self);

    /// Human-readable connection description
    fn connection_info(&self) -> String;
}

/// Something that can open serial ports
pub trait SerialBackend: Send {
    /// Open and configure the port described by `config`.
    ///
    /// `on_event` stays subscribed until the returned channel is closed.
    fn open(
        &mut self,
        config: &SerialConfig,
        on_event: LinkCallback,
    ) -> Result<Box<dyn SerialChannel>, TransportError>;
}
