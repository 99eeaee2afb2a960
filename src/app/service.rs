//! Device runtime, the hexagonal core.
//!
//! [`DeviceRuntime`] owns the configuration and the [`DeviceState`] and
//! runs the cooperative main loop one tick at a time.  All I/O flows
//! through port traits passed into [`DeviceRuntime::tick`], so the whole
//! loop is testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌─────────────────────────┐ ──▶ EventSink
//!  DisplayPort ◀──│      DeviceRuntime       │ ──▶ TelemetryPort
//!                 │ status · drift · OTA · WD│ ──▶ FirmwareTransport
//!  PortalFlag ──▶ └─────────────────────────┘ ──▶ RestartPort
//! ```
//!
//! Tick order is fixed: connectivity refresh, measurement, fault blink,
//! portal, update check, watchdog.  Blocking calls (telemetry, portal,
//! OTA) stall everything behind them in the same tick.

use log::{debug, info, warn};

use crate::calibration::{Acceptance, CalibrationDecision, CalibrationRule};
use crate::config::DeviceConfig;
use crate::error::{Error, NetworkError, SensorError};
use crate::ota::UpdateOutcome;
use crate::portal::{PortalAction, PortalFlag};
use crate::scheduler::DueTasks;
use crate::status::{
    self, CO2_BASE, HEALTHY_TIER, TEMPERATURE_BASE, classify_co2, classify_temperature,
};
use crate::version::CURRENT_VERSION;

use super::events::AppEvent;
use super::ports::{
    ConnectivityPort, DisplayPort, EventSink, FirmwareTransport, Point, RestartPort,
    SensorPort, TelemetryPort, VersionSource,
};
use super::state::{DeviceState, SensorReading, Subsystem};

/// Telemetry measurement name.
pub const MEASUREMENT: &str = "Environment";

// ───────────────────────────────────────────────────────────────
// DeviceRuntime
// ───────────────────────────────────────────────────────────────

pub struct DeviceRuntime {
    config: DeviceConfig,
    state: DeviceState,
    device_name: heapless::String<32>,
    current_version: &'static str,
    portal_flag: &'static PortalFlag,
}

impl DeviceRuntime {
    /// Build the runtime.  `device_name` tags every telemetry point;
    /// `portal_flag` is the flag the button interrupt toggles.
    pub fn new(config: DeviceConfig, device_name: &str, portal_flag: &'static PortalFlag) -> Self {
        let mut name = heapless::String::new();
        if name.push_str(device_name).is_err() {
            warn!("Runtime: device name '{}' truncated", device_name);
            for c in device_name.chars() {
                if name.push(c).is_err() {
                    break;
                }
            }
        }
        let state = DeviceState::new(&config);
        Self {
            config,
            state,
            device_name: name,
            current_version: CURRENT_VERSION,
            portal_flag,
        }
    }

    /// Override the version compared against the update server.
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.current_version = version;
        self
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Show the boot frame and announce startup.
    pub fn start(&mut self, display: &mut impl DisplayPort, sink: &mut impl EventSink) {
        for (pos, tier) in status::boot_frame().into_iter().enumerate() {
            display.set_indicator(pos, tier);
        }
        display.commit();
        sink.emit(&AppEvent::Started {
            version: self.current_version,
        });
        info!(
            "Runtime: {} started as '{}'",
            self.current_version, self.device_name
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one pass of the main loop at `now_ms`.
    ///
    /// `hw` is both sensor and strip, `net` is the WiFi link and telemetry
    /// client, `updater` fetches versions and writes firmware; adapters
    /// that share a peripheral are passed as one to avoid double mutable
    /// borrows.
    pub fn tick(
        &mut self,
        now_ms: u64,
        hw: &mut (impl SensorPort + DisplayPort),
        net: &mut (impl ConnectivityPort + TelemetryPort),
        updater: &mut (impl VersionSource + FirmwareTransport),
        restart: &mut impl RestartPort,
        sink: &mut impl EventSink,
    ) -> DueTasks {
        // 1. Connectivity
        self.state.connectivity.is_online = net.is_connected();

        let due = self.state.scheduler.poll(now_ms);

        // 2. Measurement
        if due.measure {
            self.measure(now_ms, hw, net, sink);
        }

        // 3. Fault blink
        if due.blink {
            self.blink(hw);
        }

        // 4. Portal
        self.service_portal(net, sink);

        // 5. Update check
        if due.update_check {
            let outcome = self.check_for_update(now_ms, updater, restart);
            if let UpdateOutcome::Failed(e) = outcome {
                sink.emit(&AppEvent::Error(e.into()));
            }
            sink.emit(&AppEvent::UpdateFinished(outcome));
        }

        // 6. Watchdog
        if self.state.watchdog.check(
            now_ms,
            self.config.watchdog_armed(),
            &self.state.connectivity,
            restart,
        ) {
            sink.emit(&AppEvent::Error(Error::ConnectivityStuck));
            sink.emit(&AppEvent::WatchdogFired);
        }

        due
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Build the telemetry point for `reading`.
    pub fn build_point(&self, reading: &SensorReading) -> Point {
        let mut point = Point::new(MEASUREMENT);
        point.add_tag("device", &self.device_name);
        point.add_field("ppm", reading.ppm);
        if let (Some(h), Some(p)) = (reading.humidity_pct, reading.pressure_pa) {
            point.add_field("temp", reading.temperature_c);
            point.add_field("humidity", h);
            point.add_field("pressure", p);
        }
        point
    }

    // ── Internal ──────────────────────────────────────────────

    fn measure(
        &mut self,
        now_ms: u64,
        hw: &mut (impl SensorPort + DisplayPort),
        telemetry: &mut impl TelemetryPort,
        sink: &mut impl EventSink,
    ) {
        let ppm = hw.read_co2();
        let temperature_c = hw.read_temperature();
        let env_ok = hw.environment_ok();
        let reading = SensorReading {
            ppm,
            temperature_c,
            humidity_pct: env_ok.then(|| hw.read_humidity()),
            pressure_pa: env_ok.then(|| hw.read_pressure()),
            t_ms: now_ms,
        };
        let co2_ok = reading.co2_valid() && hw.is_healthy();
        self.state.measurements = self.state.measurements.wrapping_add(1);
        debug!("Measure: {:.0} ppm, {:.1} °C", ppm, temperature_c);

        if let Some(tiers) = classify_temperature(temperature_c) {
            for (i, tier) in tiers.into_iter().enumerate() {
                hw.set_indicator(TEMPERATURE_BASE + i, tier);
            }
        }

        if co2_ok {
            for (i, tier) in classify_co2(ppm).into_iter().enumerate() {
                hw.set_indicator(CO2_BASE + i, tier);
            }
            self.feed_detector(ppm, now_ms, hw, sink);
        } else {
            warn!("Measure: invalid CO2 reading {}", ppm);
            sink.emit(&AppEvent::Error(SensorError::InvalidReading.into()));
        }
        self.set_fault(Subsystem::Sensor, !co2_ok, hw, sink);

        self.state.last_reading = Some(reading);
        sink.emit(&AppEvent::Measurement(reading));

        let network_ok = self.publish(&reading, co2_ok, telemetry, sink);
        self.set_fault(Subsystem::Network, !network_ok, hw, sink);

        // Fault indicators overlay whatever the tables just wrote.
        self.paint_fault(Subsystem::Sensor, hw);
        self.paint_fault(Subsystem::Network, hw);
        hw.commit();
    }

    fn feed_detector(
        &mut self,
        ppm: f32,
        now_ms: u64,
        sensor: &mut impl SensorPort,
        sink: &mut impl EventSink,
    ) {
        let decision = match self.state.detector.accept(ppm, now_ms) {
            Acceptance::Discarded => {
                debug!("Calibration: warm-up reading {} discarded", ppm);
                return;
            }
            Acceptance::Accepted(d) => d,
        };
        let CalibrationDecision::CalibrateNow(rule) = decision else {
            return;
        };
        if !self.config.capabilities.auto_calibration {
            debug!("Calibration: {:?} due but auto calibration disabled", rule);
            return;
        }
        self.issue_calibration(rule, sensor, sink);
    }

    fn issue_calibration(
        &mut self,
        rule: CalibrationRule,
        sensor: &mut impl SensorPort,
        sink: &mut impl EventSink,
    ) {
        let ok = match sensor.calibrate_zero_point() {
            Ok(()) => {
                info!("Calibration: zero point set ({:?})", rule);
                self.state.calibrations_issued = self.state.calibrations_issued.wrapping_add(1);
                true
            }
            Err(e) => {
                warn!("Calibration: sensor rejected command: {}", e);
                sink.emit(&AppEvent::Error(e.into()));
                false
            }
        };
        sink.emit(&AppEvent::CalibrationIssued { rule, ok });
    }

    /// Write the reading to the telemetry sink.  Returns whether the
    /// network side is healthy.
    fn publish(
        &mut self,
        reading: &SensorReading,
        co2_ok: bool,
        telemetry: &mut impl TelemetryPort,
        sink: &mut impl EventSink,
    ) -> bool {
        if !self.config.capabilities.telemetry {
            return true;
        }
        if !self.state.connectivity.is_online {
            debug!("Telemetry: offline, point dropped");
            if self.config.telemetry.is_configured() {
                self.state.connectivity.record_failure();
            }
            sink.emit(&AppEvent::Error(NetworkError::Offline.into()));
            return false;
        }
        if !self.config.telemetry.is_configured() {
            debug!("Telemetry: no endpoint configured");
            return true;
        }
        if !co2_ok {
            return true;
        }

        let point = self.build_point(reading);
        if telemetry.write(&point) {
            self.state.connectivity.record_delivery(reading.t_ms);
            true
        } else {
            self.state.connectivity.record_failure();
            self.state.telemetry_failures = self.state.telemetry_failures.wrapping_add(1);
            warn!(
                "Telemetry: write failed ({} so far)",
                self.state.telemetry_failures
            );
            sink.emit(&AppEvent::Error(NetworkError::TelemetryWriteFailed.into()));
            false
        }
    }

    fn set_fault(
        &mut self,
        subsystem: Subsystem,
        active: bool,
        display: &mut impl DisplayPort,
        sink: &mut impl EventSink,
    ) {
        if !self.state.fault_mut(subsystem).set(active) {
            return;
        }
        if active {
            warn!("Fault: {:?} raised", subsystem);
        } else {
            info!("Fault: {:?} cleared", subsystem);
            display.set_indicator(subsystem.indicator(), HEALTHY_TIER);
        }
        sink.emit(&AppEvent::FaultChanged { subsystem, active });
    }

    fn paint_fault(&self, subsystem: Subsystem, display: &mut impl DisplayPort) {
        let fault = self.state.fault(subsystem);
        if fault.active {
            display.set_indicator(subsystem.indicator(), status::fault_tier(fault.phase_on));
        }
    }

    fn blink(&mut self, display: &mut impl DisplayPort) {
        let mut changed = false;
        for subsystem in [Subsystem::Sensor, Subsystem::Network] {
            if self.state.fault_mut(subsystem).toggle() {
                self.paint_fault(subsystem, display);
                changed = true;
            }
        }
        if changed {
            display.commit();
        }
    }

    fn service_portal(&mut self, net: &mut impl ConnectivityPort, sink: &mut impl EventSink) {
        match self.state.portal.sync(self.portal_flag.is_requested()) {
            Some(PortalAction::Start) => {
                info!("Portal: starting");
                net.request_portal(true);
                sink.emit(&AppEvent::PortalChanged { running: true });
            }
            Some(PortalAction::Stop) => {
                info!("Portal: stopping");
                net.request_portal(false);
                sink.emit(&AppEvent::PortalChanged { running: false });
            }
            None => {}
        }
        if self.state.portal.is_running() {
            net.process_portal();
        }
    }

    fn check_for_update(
        &mut self,
        now_ms: u64,
        updater: &mut (impl VersionSource + FirmwareTransport),
        restart: &mut impl RestartPort,
    ) -> UpdateOutcome {
        if !self.config.capabilities.auto_update {
            return UpdateOutcome::Skipped;
        }
        if !self.state.connectivity.is_online {
            info!("OTA: offline, check skipped");
            return UpdateOutcome::Skipped;
        }
        self.state.pipeline.run(
            now_ms,
            self.current_version,
            &self.config.update,
            updater,
            restart,
        )
    }
}
