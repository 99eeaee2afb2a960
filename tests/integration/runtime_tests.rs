//! Integration tests for the DeviceRuntime main loop against mock adapters.

use co2ampel::app::events::AppEvent;
use co2ampel::app::ports::RestartReason;
use co2ampel::app::service::DeviceRuntime;
use co2ampel::app::state::Subsystem;
use co2ampel::calibration::CalibrationRule;
use co2ampel::config::DeviceConfig;
use co2ampel::error::{Error, NetworkError, SensorError};
use co2ampel::portal::PortalFlag;
use co2ampel::status::{ColorFamily, LedTier, Level};
use co2ampel::version::CURRENT_VERSION;

use crate::mock_hw::{
    MEASURE_STEP_MS, MockHardware, MockNetwork, MockUpdater, RecordingRestart, RecordingSink,
    portal_flag, test_config,
};

const GREEN_LOW: LedTier = LedTier::Lit(ColorFamily::Green, Level::Low);
const RED_HIGH: LedTier = LedTier::Lit(ColorFamily::Red, Level::High);
const YELLOW_MID: LedTier = LedTier::Lit(ColorFamily::Yellow, Level::Mid);

struct Rig {
    rt: DeviceRuntime,
    hw: MockHardware,
    net: MockNetwork,
    updater: MockUpdater,
    restart: RecordingRestart,
    sink: RecordingSink,
}

impl Rig {
    fn new(config: DeviceConfig, ppm: f32, net: MockNetwork) -> Self {
        Self::with_flag(config, ppm, net, portal_flag())
    }

    fn with_flag(
        config: DeviceConfig,
        ppm: f32,
        net: MockNetwork,
        flag: &'static PortalFlag,
    ) -> Self {
        let mut rig = Self {
            rt: DeviceRuntime::new(config, "CO2 Ampel 42", flag),
            hw: MockHardware::new(ppm),
            net,
            updater: MockUpdater::serving("v0.0.1"),
            restart: RecordingRestart::default(),
            sink: RecordingSink::default(),
        };
        rig.rt.start(&mut rig.hw, &mut rig.sink);
        rig
    }

    fn tick(&mut self, now_ms: u64) {
        self.rt.tick(
            now_ms,
            &mut self.hw,
            &mut self.net,
            &mut self.updater,
            &mut self.restart,
            &mut self.sink,
        );
    }
}

// ── Boot and measurement ──────────────────────────────────────

#[test]
fn start_shows_boot_frame_and_announces_version() {
    let rig = Rig::new(test_config(), 650.0, MockNetwork::online());

    assert_eq!(rig.hw.commits, 1);
    for (pos, tier) in rig.hw.shown.iter().enumerate() {
        let expected = if pos == 2 || pos == 4 { GREEN_LOW } else { LedTier::Off };
        assert_eq!(*tier, expected, "position {}", pos);
    }
    assert_eq!(
        rig.sink.events.first(),
        Some(&AppEvent::Started { version: CURRENT_VERSION })
    );
}

#[test]
fn first_tick_paints_co2_and_temperature() {
    let mut rig = Rig::new(test_config(), 1100.0, MockNetwork::online());
    rig.tick(0);

    assert_eq!(&rig.hw.shown[5..8], &[YELLOW_MID, LedTier::Off, LedTier::Off]);
    assert_eq!(
        &rig.hw.shown[0..4],
        &[LedTier::Off, LedTier::Off, GREEN_LOW, LedTier::Off]
    );
    assert_eq!(rig.hw.shown[4], GREEN_LOW, "network indicator stays healthy");
    assert_eq!(rig.rt.state().measurements, 1);
}

#[test]
fn measurement_only_runs_after_interval() {
    let mut rig = Rig::new(test_config(), 700.0, MockNetwork::online());
    rig.tick(0);
    rig.tick(15_000);
    rig.tick(30_000);
    assert_eq!(rig.rt.state().measurements, 1);
    rig.tick(MEASURE_STEP_MS);
    assert_eq!(rig.rt.state().measurements, 2);
}

#[test]
fn telemetry_point_carries_environment_fields() {
    let mut rig = Rig::new(test_config(), 812.0, MockNetwork::online());
    rig.tick(0);

    assert_eq!(rig.net.points.len(), 1);
    let p = &rig.net.points[0];
    assert_eq!(p.measurement, "Environment");
    assert_eq!(p.tag("device"), Some("CO2 Ampel 42"));
    assert_eq!(p.field("ppm"), Some(812.0));
    assert_eq!(p.field("temp"), Some(22.0));
    assert_eq!(p.field("humidity"), Some(45.0));
    assert_eq!(p.field("pressure"), Some(101_325.0));
    assert_eq!(rig.rt.state().connectivity.last_successful_write_ms, 0);
}

#[test]
fn telemetry_point_without_environment_sensor_has_ppm_only() {
    let mut rig = Rig::new(test_config(), 812.0, MockNetwork::online());
    rig.hw.environment = None;
    rig.tick(0);

    let p = &rig.net.points[0];
    assert_eq!(p.field("ppm"), Some(812.0));
    assert_eq!(p.field("temp"), None);
    assert_eq!(p.field("humidity"), None);
}

// ── Fault indication ──────────────────────────────────────────

#[test]
fn invalid_co2_blinks_sensor_indicator_until_recovery() {
    let mut rig = Rig::new(test_config(), 0.0, MockNetwork::online());

    rig.tick(0);
    assert_eq!(rig.hw.shown[2], RED_HIGH, "fresh fault starts lit");
    assert!(rig.sink.contains(&AppEvent::FaultChanged {
        subsystem: Subsystem::Sensor,
        active: true,
    }));
    assert!(rig.sink.contains(&AppEvent::Error(Error::Sensor(
        SensorError::InvalidReading
    ))));
    assert!(rig.net.points.is_empty(), "invalid readings are not published");

    rig.tick(501);
    assert_eq!(rig.hw.shown[2], LedTier::Off);
    rig.tick(1_002);
    assert_eq!(rig.hw.shown[2], RED_HIGH);

    rig.hw.set_co2(650.0);
    rig.tick(MEASURE_STEP_MS);
    assert_eq!(rig.hw.shown[2], GREEN_LOW);
    assert!(rig.sink.contains(&AppEvent::FaultChanged {
        subsystem: Subsystem::Sensor,
        active: false,
    }));
}

#[test]
fn offline_raises_network_fault() {
    let mut rig = Rig::new(test_config(), 650.0, MockNetwork::offline());
    rig.tick(0);

    assert_eq!(rig.hw.shown[4], RED_HIGH);
    assert!(rig.net.points.is_empty());
    assert!(rig.sink.contains(&AppEvent::Error(Error::Network(NetworkError::Offline))));
}

#[test]
fn failed_write_counts_and_raises_network_fault() {
    let mut net = MockNetwork::online();
    net.accept_writes = false;
    let mut rig = Rig::new(test_config(), 650.0, net);
    rig.tick(0);

    assert_eq!(rig.rt.state().telemetry_failures, 1);
    assert!(rig.rt.state().fault(Subsystem::Network).active);
    assert!(rig.sink.contains(&AppEvent::Error(Error::Network(
        NetworkError::TelemetryWriteFailed
    ))));
}

#[test]
fn telemetry_disabled_never_faults_network() {
    let mut cfg = test_config();
    cfg.capabilities.telemetry = false;
    let mut rig = Rig::new(cfg, 650.0, MockNetwork::offline());
    rig.tick(0);

    assert!(!rig.rt.state().fault(Subsystem::Network).active);
    assert!(rig.net.points.is_empty());
    assert_eq!(rig.hw.shown[4], GREEN_LOW);
}

#[test]
fn unconfigured_endpoint_is_not_a_fault() {
    let mut rig = Rig::new(DeviceConfig::default(), 650.0, MockNetwork::online());
    rig.tick(0);
    assert!(rig.net.points.is_empty());
    assert!(!rig.rt.state().fault(Subsystem::Network).active);
}

// ── Portal ────────────────────────────────────────────────────

#[test]
fn button_flag_starts_and_stops_portal() {
    let flag = portal_flag();
    let mut rig = Rig::with_flag(test_config(), 650.0, MockNetwork::online(), flag);

    flag.toggle_from_isr();
    rig.tick(0);
    assert_eq!(rig.net.portal_requests, vec![true]);
    assert_eq!(rig.net.portal_polls, 1);
    assert!(rig.sink.contains(&AppEvent::PortalChanged { running: true }));

    rig.tick(10);
    assert_eq!(rig.net.portal_requests, vec![true], "no repeated start");
    assert_eq!(rig.net.portal_polls, 2);

    flag.toggle_from_isr();
    rig.tick(20);
    assert_eq!(rig.net.portal_requests, vec![true, false]);
    assert_eq!(rig.net.portal_polls, 2);
    assert!(rig.sink.contains(&AppEvent::PortalChanged { running: false }));
}

// ── Calibration ───────────────────────────────────────────────

#[test]
fn sustained_clean_air_triggers_zero_point() {
    let mut rig = Rig::new(test_config(), 380.0, MockNetwork::online());

    for i in 0..20 {
        rig.tick(i * MEASURE_STEP_MS);
    }
    assert_eq!(rig.hw.calibrations, 0, "not before ten minutes");

    rig.tick(20 * MEASURE_STEP_MS);
    assert_eq!(rig.hw.calibrations, 1);
    assert_eq!(rig.rt.state().calibrations_issued, 1);
    assert!(rig.sink.contains(&AppEvent::CalibrationIssued {
        rule: CalibrationRule::CleanAir,
        ok: true,
    }));
}

#[test]
fn zero_point_repeats_every_measurement_while_air_stays_clean() {
    let mut rig = Rig::new(test_config(), 380.0, MockNetwork::online());
    let mut readings = vec![380.0; 40];
    readings.push(600.0);
    readings.push(380.0);
    rig.hw.script(&readings);

    for i in 0..40 {
        rig.tick(i * MEASURE_STEP_MS);
    }
    assert_eq!(rig.hw.calibrations, 20, "once per measurement after ten minutes");

    // One reading above 400 ppm restarts the ten-minute wait.
    for i in 40..60 {
        rig.tick(i * MEASURE_STEP_MS);
    }
    assert_eq!(rig.hw.calibrations, 20);

    rig.tick(60 * MEASURE_STEP_MS);
    assert_eq!(rig.hw.calibrations, 21);
}

#[test]
fn calibration_suppressed_when_disabled() {
    let mut cfg = test_config();
    cfg.capabilities.auto_calibration = false;
    let mut rig = Rig::new(cfg, 380.0, MockNetwork::online());

    for i in 0..25 {
        rig.tick(i * MEASURE_STEP_MS);
    }
    assert_eq!(rig.hw.calibrations, 0);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::CalibrationIssued { .. })),
        0
    );
}

#[test]
fn rejected_calibration_is_reported() {
    let mut rig = Rig::new(test_config(), 380.0, MockNetwork::online());
    rig.hw.calibrate_ok = false;

    for i in 0..=20 {
        rig.tick(i * MEASURE_STEP_MS);
    }
    assert_eq!(rig.rt.state().calibrations_issued, 0);
    assert!(rig.sink.contains(&AppEvent::CalibrationIssued {
        rule: CalibrationRule::CleanAir,
        ok: false,
    }));
    assert!(rig.sink.contains(&AppEvent::Error(Error::Sensor(SensorError::Timeout))));
}

#[test]
fn high_warmup_readings_are_ignored_by_detector() {
    let mut rig = Rig::new(test_config(), 600.0, MockNetwork::online());
    rig.hw.script(&[600.0, 600.0, 1500.0, 600.0]);
    for i in 0..4 {
        rig.tick(i * MEASURE_STEP_MS);
    }
    assert_eq!(rig.rt.state().detector.window().read_count(), 3);
    assert_eq!(rig.rt.state().measurements, 4);
}

// ── Watchdog ──────────────────────────────────────────────────

#[test]
fn watchdog_restarts_once_when_delivery_stalls() {
    let mut cfg = test_config();
    cfg.capabilities.require_connectivity = true;
    let mut net = MockNetwork::online();
    net.accept_writes = false;
    let mut rig = Rig::new(cfg, 650.0, net);

    rig.tick(0);
    rig.tick(3_600_000);
    assert!(rig.restart.reasons.is_empty(), "limit is exclusive");

    rig.tick(3_600_001);
    assert_eq!(rig.restart.reasons, vec![RestartReason::ConnectivityStuck]);
    assert!(rig.sink.contains(&AppEvent::WatchdogFired));
    assert!(rig.sink.contains(&AppEvent::Error(Error::ConnectivityStuck)));

    rig.tick(3_700_000);
    assert_eq!(rig.restart.reasons.len(), 1);
}

#[test]
fn watchdog_quiet_while_writes_succeed() {
    let mut cfg = test_config();
    cfg.capabilities.require_connectivity = true;
    let mut rig = Rig::new(cfg, 650.0, MockNetwork::online());

    let mut now = 0;
    while now <= 4_000_000 {
        rig.tick(now);
        now += MEASURE_STEP_MS;
    }
    assert!(rig.restart.reasons.is_empty());
}

#[test]
fn watchdog_ignored_when_connectivity_optional() {
    let mut rig = Rig::new(test_config(), 650.0, MockNetwork::offline());
    rig.tick(0);
    rig.tick(7_200_000);
    assert!(rig.restart.reasons.is_empty());
}

/// Run one hour and a bit of measurements with connectivity required.
fn run_past_watchdog_limit(rig: &mut Rig) {
    for i in 0..=121 {
        rig.tick(i * MEASURE_STEP_MS);
    }
}

fn required(mut cfg: DeviceConfig) -> DeviceConfig {
    cfg.capabilities.require_connectivity = true;
    cfg
}

#[test]
fn watchdog_restarts_when_offline_with_endpoint() {
    let mut rig = Rig::new(required(test_config()), 650.0, MockNetwork::offline());
    run_past_watchdog_limit(&mut rig);
    assert_eq!(rig.restart.reasons, vec![RestartReason::ConnectivityStuck]);
}

#[test]
fn watchdog_never_fires_with_telemetry_disabled() {
    let mut cfg = required(test_config());
    cfg.capabilities.telemetry = false;
    let mut rig = Rig::new(cfg, 650.0, MockNetwork::online());
    run_past_watchdog_limit(&mut rig);
    assert!(rig.net.points.is_empty());
    assert!(rig.restart.reasons.is_empty());
}

#[test]
fn watchdog_never_fires_without_endpoint() {
    let mut rig = Rig::new(required(DeviceConfig::default()), 650.0, MockNetwork::online());
    run_past_watchdog_limit(&mut rig);
    assert!(rig.restart.reasons.is_empty());
    assert!(!rig.sink.contains(&AppEvent::WatchdogFired));
}

#[test]
fn watchdog_never_fires_while_only_the_sensor_is_faulty() {
    let mut rig = Rig::new(required(test_config()), 0.0, MockNetwork::online());
    run_past_watchdog_limit(&mut rig);
    assert!(rig.net.points.is_empty());
    assert!(rig.rt.state().fault(Subsystem::Sensor).active);
    assert!(rig.restart.reasons.is_empty());
}
