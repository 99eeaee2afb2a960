//! Unified error types for the CO2 Ampel firmware.
//!
//! Each subsystem has its own small `Copy` enum; all of them convert into
//! [`Error`] so the runtime can log and count failures uniformly.  Only
//! [`Error::ConnectivityStuck`] is fatal.

use core::fmt;

use crate::app::ports::ConfigError;
use crate::ota::OtaError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Sensor(SensorError),
    Network(NetworkError),
    Update(OtaError),
    /// Telemetry has not been delivered for longer than the watchdog allows.
    ConnectivityStuck,
    Config(ConfigError),
}

impl Error {
    /// Whether this error ends the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectivityStuck)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Network(e) => write!(f, "network: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::ConnectivityStuck => write!(f, "connectivity stuck"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// No response frame within the UART timeout.
    Timeout,
    /// Response frame failed its checksum.
    BadChecksum,
    /// Response frame did not answer the command that was sent.
    UnexpectedResponse,
    /// CO2 reading was zero, negative, or not a number.
    InvalidReading,
    /// I2C transfer to the environment sensor failed.
    BusError,
    /// Environment sensor did not identify itself.
    NotFound,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "sensor response timed out"),
            Self::BadChecksum => write!(f, "sensor frame checksum mismatch"),
            Self::UnexpectedResponse => write!(f, "unexpected sensor response"),
            Self::InvalidReading => write!(f, "invalid reading"),
            Self::BusError => write!(f, "I2C bus error"),
            Self::NotFound => write!(f, "sensor not found"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// No WiFi association.
    Offline,
    /// The telemetry sink did not confirm the write.
    TelemetryWriteFailed,
    /// Telemetry endpoint is not configured.
    NotConfigured,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::TelemetryWriteFailed => write!(f, "telemetry write failed"),
            Self::NotConfigured => write!(f, "telemetry endpoint not configured"),
        }
    }
}

impl From<NetworkError> for Error {
    fn from(e: NetworkError) -> Self {
        Self::Network(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Update(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
