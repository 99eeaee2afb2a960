//! Mock adapters for integration tests.
//!
//! Each mock records what the runtime asked of it so tests can assert on
//! the full history without touching UART, I2C, RMT or the radio.

use std::collections::VecDeque;

use co2ampel::app::events::AppEvent;
use co2ampel::app::ports::{
    ConnectivityPort, DisplayPort, EventSink, FirmwareTransport, Point, RestartPort,
    RestartReason, SensorPort, TelemetryPort, VersionSource,
};
use co2ampel::config::DeviceConfig;
use co2ampel::error::SensorError;
use co2ampel::ota::OtaError;
use co2ampel::portal::PortalFlag;
use co2ampel::status::{LedTier, STRIP_LEN};

/// Interval the mock loop advances by so exactly one measurement is due.
pub const MEASURE_STEP_MS: u64 = 30_001;

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    /// Readings returned in order; the last one repeats.
    pub co2: VecDeque<f32>,
    pub temperature_c: f32,
    /// `Some((humidity, pressure))` when the environment sensor answers.
    pub environment: Option<(f32, f32)>,
    pub calibrate_ok: bool,
    pub calibrations: u32,
    /// Latched strip contents.
    pub latched: [LedTier; STRIP_LEN],
    /// Strip contents as of the last commit.
    pub shown: [LedTier; STRIP_LEN],
    pub commits: u32,
    last_co2: f32,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(ppm: f32) -> Self {
        Self {
            co2: VecDeque::from([ppm]),
            temperature_c: 22.0,
            environment: Some((45.0, 101_325.0)),
            calibrate_ok: true,
            calibrations: 0,
            latched: [LedTier::Off; STRIP_LEN],
            shown: [LedTier::Off; STRIP_LEN],
            commits: 0,
            last_co2: 0.0,
        }
    }

    pub fn script(&mut self, readings: &[f32]) {
        self.co2 = readings.iter().copied().collect();
    }

    pub fn set_co2(&mut self, ppm: f32) {
        self.script(&[ppm]);
    }
}

impl SensorPort for MockHardware {
    fn read_co2(&mut self) -> f32 {
        let ppm = if self.co2.len() > 1 {
            self.co2.pop_front().unwrap_or(0.0)
        } else {
            self.co2.front().copied().unwrap_or(0.0)
        };
        self.last_co2 = ppm;
        ppm
    }

    fn read_temperature(&mut self) -> f32 {
        self.temperature_c
    }

    fn read_humidity(&mut self) -> f32 {
        self.environment.map_or(f32::NAN, |(h, _)| h)
    }

    fn read_pressure(&mut self) -> f32 {
        self.environment.map_or(f32::NAN, |(_, p)| p)
    }

    fn is_healthy(&self) -> bool {
        self.last_co2 > 0.0
    }

    fn environment_ok(&self) -> bool {
        self.environment.is_some()
    }

    fn calibrate_zero_point(&mut self) -> Result<(), SensorError> {
        self.calibrations += 1;
        if self.calibrate_ok {
            Ok(())
        } else {
            Err(SensorError::Timeout)
        }
    }
}

impl DisplayPort for MockHardware {
    fn set_indicator(&mut self, position: usize, tier: LedTier) {
        if let Some(slot) = self.latched.get_mut(position) {
            *slot = tier;
        }
    }

    fn commit(&mut self) {
        self.shown = self.latched;
        self.commits += 1;
    }
}

// ── MockNetwork ───────────────────────────────────────────────

pub struct MockNetwork {
    pub online: bool,
    pub accept_writes: bool,
    pub points: Vec<Point>,
    pub portal_requests: Vec<bool>,
    pub portal_polls: u32,
}

#[allow(dead_code)]
impl MockNetwork {
    pub fn online() -> Self {
        Self {
            online: true,
            accept_writes: true,
            points: Vec::new(),
            portal_requests: Vec::new(),
            portal_polls: 0,
        }
    }

    pub fn offline() -> Self {
        Self {
            online: false,
            ..Self::online()
        }
    }
}

impl ConnectivityPort for MockNetwork {
    fn is_connected(&self) -> bool {
        self.online
    }

    fn request_portal(&mut self, start: bool) {
        self.portal_requests.push(start);
    }

    fn process_portal(&mut self) {
        self.portal_polls += 1;
    }
}

impl TelemetryPort for MockNetwork {
    fn write(&mut self, point: &Point) -> bool {
        self.points.push(point.clone());
        self.accept_writes
    }
}

// ── MockUpdater ───────────────────────────────────────────────

/// Update server plus flash in one.  Records every call in order.
pub struct MockUpdater {
    pub version: Result<&'static str, OtaError>,
    pub image_len: Option<u64>,
    pub flashed: u64,
    pub finalize_ok: bool,
    pub calls: Vec<&'static str>,
}

#[allow(dead_code)]
impl MockUpdater {
    pub fn serving(version: &'static str) -> Self {
        Self {
            version: Ok(version),
            image_len: Some(4096),
            flashed: 0,
            finalize_ok: true,
            calls: Vec::new(),
        }
    }
}

impl VersionSource for MockUpdater {
    fn fetch_text(&mut self, _url: &str) -> Result<String, OtaError> {
        self.calls.push("fetch");
        self.version.map(str::to_owned)
    }
}

impl FirmwareTransport for MockUpdater {
    fn open_stream(&mut self, _url: &str) -> Result<Option<u64>, OtaError> {
        self.calls.push("open");
        Ok(self.image_len)
    }

    fn flash_write(&mut self, _expected_len: u64) -> Result<u64, OtaError> {
        self.calls.push("write");
        self.flashed = self.image_len.unwrap_or(0);
        Ok(self.flashed)
    }

    fn finalize(&mut self) -> bool {
        self.calls.push("finalize");
        self.finalize_ok
    }

    fn abort(&mut self) {
        self.calls.push("abort");
    }
}

// ── Restart and event recorders ───────────────────────────────

#[derive(Default)]
pub struct RecordingRestart {
    pub reasons: Vec<RestartReason>,
}

impl RestartPort for RecordingRestart {
    fn restart(&mut self, reason: RestartReason) {
        self.reasons.push(reason);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// A fresh portal flag per test; the runtime needs a `'static` one.
pub fn portal_flag() -> &'static PortalFlag {
    Box::leak(Box::new(PortalFlag::new()))
}

/// Default config with an InfluxDB endpoint and no automatic updates.
#[allow(dead_code)]
pub fn test_config() -> DeviceConfig {
    let mut cfg = DeviceConfig::default();
    cfg.telemetry.influx_url.push_str("http://influx.test:8086").unwrap();
    cfg.telemetry.influx_db.push_str("co2").unwrap();
    cfg.capabilities.auto_update = false;
    cfg
}
