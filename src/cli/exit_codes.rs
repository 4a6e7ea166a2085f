//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use std::process::ExitCode;

use crate::config::ConfigError;
use crate::core::transport::TransportError;
use crate::core::SensorError;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed or not connected
    pub const CONNECTION_FAILED: u8 = 3;

    /// No reading before the deadline
    pub const TIMEOUT: u8 = 4;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Sensor not found or not openable
    pub const DEVICE_NOT_FOUND: u8 = 12;

    /// Line rejected by the reading grammar
    pub const VALIDATION_FAILED: u8 = 17;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;

    /// Every code, in table order
    pub const ALL: [u8; 11] = [
        Self::SUCCESS,
        Self::ERROR,
        Self::INVALID_ARGS,
        Self::CONNECTION_FAILED,
        Self::TIMEOUT,
        Self::PERMISSION_DENIED,
        Self::CONFIG_ERROR,
        Self::CANCELLED,
        Self::DEVICE_NOT_FOUND,
        Self::VALIDATION_FAILED,
        Self::INTERNAL_ERROR,
    ];
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// No reading arrived in time
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::TIMEOUT, msg.into())
    }

    /// Interrupted by the user
    pub fn cancelled() -> Self {
        Self::Error(ExitCodes::CANCELLED, "Cancelled".to_string())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&SensorError> for CliResult {
    fn from(err: &SensorError) -> Self {
        let code = match err {
            SensorError::DeviceUnavailable(_) => ExitCodes::DEVICE_NOT_FOUND,
            SensorError::NotConnected => ExitCodes::CONNECTION_FAILED,
            SensorError::MalformedLine(_) => ExitCodes::VALIDATION_FAILED,
            SensorError::InvalidInterval(_) => ExitCodes::INVALID_ARGS,
            SensorError::SessionClosed => ExitCodes::INTERNAL_ERROR,
            SensorError::Transport(TransportError::PermissionDenied(_)) => {
                ExitCodes::PERMISSION_DENIED
            }
            SensorError::Transport(_) => ExitCodes::CONNECTION_FAILED,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<SensorError> for CliResult {
    fn from(err: SensorError) -> Self {
        Self::from(&err)
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        ExitCodes::SUCCESS => "Success",
        ExitCodes::ERROR => "General error",
        ExitCodes::INVALID_ARGS => "Invalid arguments",
        ExitCodes::CONNECTION_FAILED => "Connection failed",
        ExitCodes::TIMEOUT => "No reading before timeout",
        ExitCodes::PERMISSION_DENIED => "Permission denied",
        ExitCodes::CONFIG_ERROR => "Configuration error",
        ExitCodes::CANCELLED => "Operation cancelled",
        ExitCodes::DEVICE_NOT_FOUND => "Sensor not found",
        ExitCodes::VALIDATION_FAILED => "Malformed line",
        ExitCodes::INTERNAL_ERROR => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ExitCodes::ALL {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);
        assert_eq!(success.message(), None);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_sensor_error() {
        let cases = [
            (SensorError::DeviceUnavailable("none".into()), ExitCodes::DEVICE_NOT_FOUND),
            (SensorError::NotConnected, ExitCodes::CONNECTION_FAILED),
            (SensorError::MalformedLine("x".into()), ExitCodes::VALIDATION_FAILED),
            (SensorError::InvalidInterval(0), ExitCodes::INVALID_ARGS),
            (
                SensorError::Transport(TransportError::PermissionDenied("COM3".into())),
                ExitCodes::PERMISSION_DENIED,
            ),
            (
                SensorError::Transport(TransportError::Disconnected),
                ExitCodes::CONNECTION_FAILED,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(CliResult::from(&err).code(), code, "{err}");
        }
    }

    #[test]
    fn test_every_code_described() {
        for code in ExitCodes::ALL {
            assert_ne!(exit_code_description(code), "Unknown error");
        }
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
