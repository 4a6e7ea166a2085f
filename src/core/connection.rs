//! Connection lifecycle for the sensor link
//!
//! [`ConnectionManager`] is the only owner of the serial channel and of the
//! receive buffer. Every write to the device goes through it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::codec::{Command, LineFramer};
use super::locator::CandidateDevice;
use super::transport::{LinkCallback, SerialBackend, SerialChannel, SerialConfig};
use super::SensorError;

/// Builds the link callback for a connection, given its generation
pub type LinkRoute = Box<dyn Fn(u64) -> LinkCallback + Send>;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No open channel
    #[default]
    Closed,
    /// Channel open and configured
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
        }
    }
}

/// Owns the serial channel's open/closed lifecycle
pub struct ConnectionManager {
    backend: Box<dyn SerialBackend>,
    route: LinkRoute,
    channel: Option<Box<dyn SerialChannel>>,
    port_name: Option<String>,
    framer: LineFramer,
    /// Bumped on every successful open; tags inbound data
    generation: u64,
}

impl ConnectionManager {
    /// Create a closed manager.
    ///
    /// `route` is called once per open to build the callback that inbound
    /// chunks and link loss are delivered to.
    pub fn new(backend: Box<dyn SerialBackend>, route: LinkRoute) -> Self {
        Self {
            backend,
            route,
            channel: None,
            port_name: None,
            framer: LineFramer::new(),
            generation: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        if self.channel.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    /// Check if open
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Port of the open connection
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Generation of the current (or last) connection
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Connection info string of the open channel
    pub fn connection_info(&self) -> Option<String> {
        self.channel.as_ref().map(|c| c.connection_info())
    }

    /// Open the located device with the fixed sensor configuration.
    ///
    /// Closed → Open only. Calling this while open does nothing; callers
    /// are expected to check [`is_open`](Self::is_open) and report it.
    pub fn open(&mut self, candidate: Option<&CandidateDevice>) -> Result<(), SensorError> {
        if self.is_open() {
            tracing::debug!("open() ignored, already open");
            return Ok(());
        }

        let candidate = candidate.ok_or_else(|| {
            SensorError::DeviceUnavailable("no matching device found".to_string())
        })?;

        let config = SerialConfig::sensor(&candidate.port_name);
        let generation = self.generation + 1;
        let on_event = (self.route)(generation);

        let channel = self
            .backend
            .open(&config, on_event)
            .map_err(|e| SensorError::DeviceUnavailable(format!("{}: {}", candidate.port_name, e)))?;

        self.generation = generation;
        self.framer.clear();
        self.channel = Some(channel);
        self.port_name = Some(candidate.port_name.clone());
        Ok(())
    }

    /// Open → Closed. Returns false if nothing was open.
    ///
    /// Unsubscribes the link callback and drops any partial line.
    pub fn close(&mut self) -> bool {
        let Some(mut channel) = self.channel.take() else {
            return false;
        };
        channel.close();
        self.framer.clear();
        self.port_name = None;
        true
    }

    /// Send one command byte. Fire-and-forget.
    pub fn write(&mut self, command: Command) -> Result<(), SensorError> {
        let channel = self.channel.as_mut().ok_or(SensorError::NotConnected)?;
        channel.write(&[command.as_byte()])?;
        tracing::debug!("Sent {} ({:?})", command, command.as_byte() as char);
        Ok(())
    }

    /// Buffer an inbound chunk and return every line it completed, in order.
    ///
    /// Chunks arriving while closed are discarded.
    pub fn on_data_received(&mut self, chunk: &[u8]) -> Vec<String> {
        if !self.is_open() {
            tracing::debug!("Discarding {} bytes received while closed", chunk.len());
            return Vec::new();
        }
        self.framer.push(chunk)
    }

    /// Bytes of the current unterminated line
    pub fn pending(&self) -> usize {
        self.framer.pending()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
