//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DeviceRuntime (domain)
//! ```
//!
//! Driven adapters (sensors, LED strip, telemetry, storage, network, OTA)
//! implement these traits.  The [`DeviceRuntime`](super::service::DeviceRuntime)
//! consumes them via generics, so the domain core never touches hardware
//! directly.

use crate::error::SensorError;
use crate::ota::OtaError;
use crate::status::LedTier;

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Monotonic millisecond tick since boot.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
}

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// CO2 sensor plus the optional environment sensor.
pub trait SensorPort {
    /// CO2 concentration in ppm.  Values ≤ 0 mean the read failed.
    fn read_co2(&mut self) -> f32;

    /// Degrees Celsius.  Comes from the environment sensor when it is
    /// healthy, otherwise from the CO2 sensor's internal thermistor.
    fn read_temperature(&mut self) -> f32;

    /// Relative humidity in percent.  Only meaningful when
    /// [`environment_ok`](Self::environment_ok) is true.
    fn read_humidity(&mut self) -> f32;

    /// Pressure in Pa.  Only meaningful when
    /// [`environment_ok`](Self::environment_ok) is true.
    fn read_pressure(&mut self) -> f32;

    /// Whether the last CO2 read succeeded.
    fn is_healthy(&self) -> bool;

    /// Whether the environment sensor is present and its last
    /// measurement succeeded.
    fn environment_ok(&self) -> bool;

    /// Declare the current air to be the 400 ppm baseline.
    fn calibrate_zero_point(&mut self) -> Result<(), SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: domain → LED strip)
// ───────────────────────────────────────────────────────────────

/// Addressable indicator strip.  Positions are laid out in
/// [`status`](crate::status); changes are latched until [`commit`](Self::commit).
pub trait DisplayPort {
    fn set_indicator(&mut self, position: usize, tier: LedTier);

    /// Push the latched frame to the hardware.
    fn commit(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Telemetry port
// ───────────────────────────────────────────────────────────────

pub const MAX_TAGS: usize = 2;
pub const MAX_FIELDS: usize = 4;

pub type TagValue = heapless::String<32>;

/// One time-series sample: a measurement name, string tags and numeric
/// fields.  The timestamp is assigned by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: &'static str,
    pub tags: heapless::Vec<(&'static str, TagValue), MAX_TAGS>,
    pub fields: heapless::Vec<(&'static str, f32), MAX_FIELDS>,
}

impl Point {
    pub fn new(measurement: &'static str) -> Self {
        Self {
            measurement,
            tags: heapless::Vec::new(),
            fields: heapless::Vec::new(),
        }
    }

    /// Add a tag.  Returns `false` if the tag table is full or the value
    /// does not fit.
    pub fn add_tag(&mut self, key: &'static str, value: &str) -> bool {
        let mut v = TagValue::new();
        if v.push_str(value).is_err() {
            return false;
        }
        self.tags.push((key, v)).is_ok()
    }

    /// Add a field.  Returns `false` if the field table is full.
    pub fn add_field(&mut self, key: &'static str, value: f32) -> bool {
        self.fields.push((key, value)).is_ok()
    }

    pub fn field(&self, key: &str) -> Option<f32> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Time-series database client.
pub trait TelemetryPort {
    /// Write one point.  Returns `true` only when the server confirmed it.
    fn write(&mut self, point: &Point) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / BLE)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, BLE
/// characteristic, test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

/// Fan out to two sinks, first `A` then `B`.
impl<A: EventSink, B: EventSink> EventSink for (A, B) {
    fn emit(&mut self, event: &super::events::AppEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

/// A sink that may be switched off by configuration.
impl<T: EventSink> EventSink for Option<T> {
    fn emit(&mut self, event: &super::events::AppEvent) {
        if let Some(sink) = self {
            sink.emit(event);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Configuration store (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Flat string key-value store shared with the setup portal.
///
/// Implementations must write atomically; NVS does this natively.
/// Validation happens in [`DeviceConfig::store`](crate::config::DeviceConfig::store)
/// before anything reaches the store.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Connectivity port
// ───────────────────────────────────────────────────────────────

/// WiFi link plus the captive setup portal.
pub trait ConnectivityPort {
    fn is_connected(&self) -> bool;

    /// Start (`true`) or stop (`false`) the setup portal.  Returns
    /// immediately; the portal is serviced by [`process_portal`](Self::process_portal).
    fn request_portal(&mut self, start: bool);

    /// Service a running portal.  Called once per loop iteration.
    fn process_portal(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Firmware update ports
// ───────────────────────────────────────────────────────────────

/// Fetches the small text resource that names the latest version.
pub trait VersionSource {
    fn fetch_text(&mut self, url: &str) -> Result<String, OtaError>;
}

/// Streams a firmware image into the inactive partition.
///
/// The call order is always `open_stream`, `flash_write`, `finalize`;
/// `abort` may follow any of them on failure.
pub trait FirmwareTransport {
    /// Open the image stream and return the announced content length.
    fn open_stream(&mut self, url: &str) -> Result<Option<u64>, OtaError>;

    /// Copy the stream to flash.  Returns the number of bytes written.
    fn flash_write(&mut self, expected_len: u64) -> Result<u64, OtaError>;

    /// Verify the image and mark it bootable.
    fn finalize(&mut self) -> bool;

    /// Drop the stream and discard a partial image.
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    FirmwareUpdated,
    ConnectivityStuck,
}

impl core::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FirmwareUpdated => write!(f, "firmware updated"),
            Self::ConnectivityStuck => write!(f, "connectivity stuck"),
        }
    }
}

/// Process restart.  Never returns on hardware.
pub trait RestartPort {
    fn restart(&mut self, reason: RestartReason);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigStore`] operations and config validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    StorageFull,
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
