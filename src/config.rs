//! Device configuration.
//!
//! Everything tunable on the CO2 Ampel lives in [`DeviceConfig`].  The
//! persisted form is a flat set of string keys in a [`ConfigStore`]
//! (NVS on hardware); keys that are absent fall back to the defaults below.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, ConfigStore};

/// Ring buffer length of the drift detector.
pub const SAMPLE_WINDOW_LEN: usize = 30;

// Persisted keys.  The first four are shared with the setup portal.
pub const KEY_INFLUX_URL: &str = "influxDBURL";
pub const KEY_INFLUX_DB: &str = "influxDBName";
pub const KEY_USE_WIFI: &str = "useWifi";
pub const KEY_USE_BLE: &str = "useBLE";
pub const KEY_AUTO_UPDATE: &str = "autoUpdate";
pub const KEY_AUTO_CALIBRATION: &str = "autoCalib";
pub const KEY_REQUIRE_CONNECTIVITY: &str = "needConn";
pub const KEY_VERSION_URL: &str = "versionURL";
pub const KEY_FIRMWARE_URL: &str = "firmwareURL";

pub type InfluxUrl = heapless::String<40>;
pub type InfluxDbName = heapless::String<32>;
pub type UpdateUrl = heapless::String<128>;

/// InfluxDB v1 endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Base URL, e.g. `http://192.168.1.10:8086`.
    pub influx_url: InfluxUrl,
    pub influx_db: InfluxDbName,
}

impl TelemetryConfig {
    pub fn is_configured(&self) -> bool {
        !self.influx_url.is_empty() && !self.influx_db.is_empty()
    }
}

/// Feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Join WiFi and push measurements to InfluxDB.
    pub telemetry: bool,
    /// Publish measurements over BLE.
    pub ble: bool,
    pub auto_update: bool,
    pub auto_calibration: bool,
    /// Restart when telemetry has not been delivered for too long.
    pub require_connectivity: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            telemetry: true,
            ble: true,
            auto_update: true,
            auto_calibration: true,
            require_connectivity: false,
        }
    }
}

/// Scheduler intervals, all in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub measurement_interval_ms: u64,
    pub blink_interval_ms: u64,
    /// Delay after boot before the first update check.
    pub update_first_check_ms: u64,
    pub update_interval_ms: u64,
    /// Maximum age of the last delivered telemetry point before restart.
    pub watchdog_stale_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            measurement_interval_ms: 30_000,
            blink_interval_ms: 500,
            update_first_check_ms: 45_000,
            update_interval_ms: 3_600_000,
            watchdog_stale_ms: 3_600_000,
        }
    }
}

/// Zero-point calibration triggers.
///
/// Rule A fires after a sustained period below 400 ppm.  Rule B fires on a
/// long, steady downward drift while the sensor has not seen fresh air for
/// hours.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationThresholds {
    /// Rule A: time without any reading above 400 ppm.
    pub clean_air_ms: u64,
    /// Rule B: per-step drift that counts towards the streak.
    pub short_drift_ppm: f32,
    /// Rule B: drift across the whole window.
    pub window_drift_ppm: f32,
    /// Rule B: consecutive drifting readings required.
    pub drift_streak: u32,
    /// Rule B: time without any reading below 500 ppm.
    pub no_fresh_air_ms: u64,
}

impl Default for CalibrationThresholds {
    fn default() -> Self {
        Self {
            clean_air_ms: 600_000,
            short_drift_ppm: -15.0,
            window_drift_ppm: -400.0,
            drift_streak: SAMPLE_WINDOW_LEN as u32,
            no_fresh_air_ms: 14_400_000,
        }
    }
}

/// Where the device looks for new firmware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Plain-text resource whose first line is the latest version.
    pub version_url: UpdateUrl,
    pub firmware_url: UpdateUrl,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            version_url: url_or_empty("http://firmware.co2ampel.local/version.txt"),
            firmware_url: url_or_empty("http://firmware.co2ampel.local/firmware.bin"),
        }
    }
}

fn url_or_empty(s: &str) -> UpdateUrl {
    let mut url = UpdateUrl::new();
    let _ = url.push_str(s);
    url
}

/// Complete device configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub telemetry: TelemetryConfig,
    pub capabilities: Capabilities,
    pub timing: TimingConfig,
    pub calibration: CalibrationThresholds,
    pub update: UpdateConfig,
}

impl DeviceConfig {
    /// Build the configuration from persisted keys.
    ///
    /// Missing keys keep their defaults.  A value that does not fit its
    /// field is ignored with a warning rather than failing the boot.
    pub fn load(store: &impl ConfigStore) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = store.get(KEY_INFLUX_URL) {
            load_string(&mut cfg.telemetry.influx_url, KEY_INFLUX_URL, &v);
        }
        if let Some(v) = store.get(KEY_INFLUX_DB) {
            load_string(&mut cfg.telemetry.influx_db, KEY_INFLUX_DB, &v);
        }
        if let Some(v) = store.get(KEY_VERSION_URL) {
            load_string(&mut cfg.update.version_url, KEY_VERSION_URL, &v);
        }
        if let Some(v) = store.get(KEY_FIRMWARE_URL) {
            load_string(&mut cfg.update.firmware_url, KEY_FIRMWARE_URL, &v);
        }

        let caps = &mut cfg.capabilities;
        load_flag(store, KEY_USE_WIFI, &mut caps.telemetry);
        load_flag(store, KEY_USE_BLE, &mut caps.ble);
        load_flag(store, KEY_AUTO_UPDATE, &mut caps.auto_update);
        load_flag(store, KEY_AUTO_CALIBRATION, &mut caps.auto_calibration);
        load_flag(store, KEY_REQUIRE_CONNECTIVITY, &mut caps.require_connectivity);

        info!(
            "Config: influx='{}' db='{}' wifi={} ble={} ota={} calib={} needConn={}",
            cfg.telemetry.influx_url,
            cfg.telemetry.influx_db,
            caps.telemetry,
            caps.ble,
            caps.auto_update,
            caps.auto_calibration,
            caps.require_connectivity,
        );
        cfg
    }

    /// Validate, then persist every key.
    pub fn store(&self, store: &mut impl ConfigStore) -> Result<(), ConfigError> {
        self.validate()?;

        store.set(KEY_INFLUX_URL, &self.telemetry.influx_url)?;
        store.set(KEY_INFLUX_DB, &self.telemetry.influx_db)?;
        store.set(KEY_VERSION_URL, &self.update.version_url)?;
        store.set(KEY_FIRMWARE_URL, &self.update.firmware_url)?;

        let caps = &self.capabilities;
        store.set(KEY_USE_WIFI, flag_str(caps.telemetry))?;
        store.set(KEY_USE_BLE, flag_str(caps.ble))?;
        store.set(KEY_AUTO_UPDATE, flag_str(caps.auto_update))?;
        store.set(KEY_AUTO_CALIBRATION, flag_str(caps.auto_calibration))?;
        store.set(KEY_REQUIRE_CONNECTIVITY, flag_str(caps.require_connectivity))?;

        info!("Config: saved");
        Ok(())
    }

    /// Range-check every field.  Out-of-range values are rejected, never
    /// clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timing;
        if !(1_000..=3_600_000).contains(&t.measurement_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "measurement_interval_ms must be 1000–3600000",
            ));
        }
        if !(100..=5_000).contains(&t.blink_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "blink_interval_ms must be 100–5000",
            ));
        }
        if t.update_interval_ms < 60_000 {
            return Err(ConfigError::ValidationFailed(
                "update_interval_ms must be at least 60000",
            ));
        }
        if t.watchdog_stale_ms < t.measurement_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "watchdog_stale_ms must exceed measurement_interval_ms",
            ));
        }

        let c = &self.calibration;
        if c.short_drift_ppm.is_nan() || c.short_drift_ppm >= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "short_drift_ppm must be negative",
            ));
        }
        if c.window_drift_ppm.is_nan() || c.window_drift_ppm >= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "window_drift_ppm must be negative",
            ));
        }
        if c.drift_streak == 0 {
            return Err(ConfigError::ValidationFailed("drift_streak must be non-zero"));
        }

        if !self.telemetry.influx_url.is_empty() && !is_http_url(&self.telemetry.influx_url) {
            return Err(ConfigError::ValidationFailed(
                "influx_url must start with http:// or https://",
            ));
        }
        if self.capabilities.require_connectivity && !self.delivers_telemetry() {
            return Err(ConfigError::ValidationFailed(
                "require_connectivity needs telemetry enabled and an InfluxDB endpoint",
            ));
        }
        if self.capabilities.auto_update
            && !(is_http_url(&self.update.version_url) && is_http_url(&self.update.firmware_url))
        {
            return Err(ConfigError::ValidationFailed(
                "update URLs must be http(s) when auto_update is enabled",
            ));
        }
        Ok(())
    }

    /// Telemetry is enabled and has somewhere to go.
    pub fn delivers_telemetry(&self) -> bool {
        self.capabilities.telemetry && self.telemetry.is_configured()
    }

    /// Whether the connectivity watchdog may restart the device.  A device
    /// that never sends telemetry has no delivery to go stale.
    pub fn watchdog_armed(&self) -> bool {
        self.capabilities.require_connectivity && self.delivers_telemetry()
    }

    /// JSON rendering for diagnostics output.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string(self).map_err(|_| ConfigError::Corrupted)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

const fn flag_str(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

fn load_flag(store: &impl ConfigStore, key: &str, field: &mut bool) {
    match store.get(key).as_deref().map(str::trim) {
        None => {}
        Some("1") => *field = true,
        Some("0") => *field = false,
        Some(other) => warn!("Config: ignoring {}='{}' (expected 1/0)", key, other),
    }
}

fn load_string<const N: usize>(field: &mut heapless::String<N>, key: &str, value: &str) {
    let mut s = heapless::String::<N>::new();
    if s.push_str(value).is_ok() {
        *field = s;
    } else {
        warn!("Config: {} longer than {} bytes, keeping default", key, N);
    }
}
