//! # Colorprobe Core Library
//!
//! Host-side driver for a USB serial RGB color sensor:
//! - Finds the sensor among the serial ports by USB vendor/product id
//! - Opens it at 9600 baud 8N1 and frames its `\r`-terminated reading lines
//! - Requests readings once or on an interval, and sends calibration commands
//! - Reports readings, state changes and a timestamped activity log as events
//!
//! ## Example
//!
//! ```rust,no_run
//! use colorprobe_core::{SensorEvent, Session, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Session::start(SessionConfig::default());
//!     let mut rx = session.subscribe();
//!
//!     session.connect().await?;
//!     session.start_polling(Duration::from_secs(1)).await?;
//!
//!     while let Ok(event) = rx.recv().await {
//!         if let SensorEvent::Reading(reading) = event {
//!             println!("{} {}", reading, reading.to_hex());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::codec::{ColorReading, Command, LineFramer, ParsedLine};
pub use crate::core::connection::{ConnectionManager, ConnectionState};
pub use crate::core::events::{EventSink, SensorEvent};
pub use crate::core::locator::{CandidateDevice, DeviceIdentity, DeviceLocator, SENSOR_IDENTITY};
pub use crate::core::logger::{ActivityLog, LogEntry, LogLevel};
pub use crate::core::poller::{PollSession, Poller, PollerState};
pub use crate::core::sensor::ColorSensor;
pub use crate::core::session::{Session, SessionConfig, SessionStatus};
pub use crate::core::simulator::SimulatedSensor;
pub use crate::core::transport::{SerialConfig, TransportError};
pub use crate::core::SensorError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
