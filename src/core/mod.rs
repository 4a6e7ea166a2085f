//! Core module containing the sensor protocol handler
//!
//! This module provides:
//! - Device discovery by USB identity
//! - Transport layer over the serial link
//! - Line framing and reading grammar
//! - Connection lifecycle with per-connection receive buffer
//! - Single-shot and periodic polling
//! - Activity logging with timestamps
//! - Async session driving all of the above from one control task
//! - In-memory simulated sensor for tests and demos

pub mod codec;
pub mod connection;
pub mod events;
pub mod locator;
pub mod logger;
pub mod poller;
pub mod sensor;
pub mod session;
pub mod simulator;
pub mod transport;

use thiserror::Error;

use self::transport::TransportError;

/// Errors reported by the sensor core. None of them are fatal.
#[derive(Error, Debug)]
pub enum SensorError {
    /// No matching hardware, or the matching port could not be opened
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Write or poll attempted while the connection is closed
    #[error("Not connected")]
    NotConnected,

    /// Line does not match the reading grammar
    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    /// Poll interval must be non-zero
    #[error("Invalid poll interval: {0} ms")]
    InvalidInterval(u64),

    /// The session control task is gone
    #[error("Session closed")]
    SessionClosed,

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}
