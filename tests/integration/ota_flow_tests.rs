//! Integration tests for the scheduled firmware update.
//!
//! The first half drives the runtime against the recording mock updater;
//! the second half uses the crate's own simulated HTTP updater and restart
//! adapter end to end.

use co2ampel::adapters::http_ota::HttpUpdater;
use co2ampel::adapters::restart::SystemRestart;
use co2ampel::app::events::AppEvent;
use co2ampel::app::ports::RestartReason;
use co2ampel::app::service::DeviceRuntime;
use co2ampel::config::DeviceConfig;
use co2ampel::error::Error;
use co2ampel::ota::{OtaError, UpdateOutcome, UpdateStage};

use crate::mock_hw::{
    MockHardware, MockNetwork, MockUpdater, RecordingRestart, RecordingSink, portal_flag,
};

const FIRST_CHECK_MS: u64 = 45_000;
const RUNNING: &str = "v1.2.3";

fn update_config() -> DeviceConfig {
    let mut cfg = DeviceConfig::default();
    cfg.capabilities.auto_update = true;
    cfg
}

fn runtime(cfg: DeviceConfig) -> DeviceRuntime {
    DeviceRuntime::new(cfg, "CO2 Ampel 7", portal_flag()).with_version(RUNNING)
}

/// Run ticks at boot and at the first update check.
fn run_check(
    rt: &mut DeviceRuntime,
    net: &mut MockNetwork,
    updater: &mut MockUpdater,
    restart: &mut RecordingRestart,
) -> RecordingSink {
    let mut hw = MockHardware::new(650.0);
    let mut sink = RecordingSink::default();
    rt.tick(0, &mut hw, net, updater, restart, &mut sink);
    rt.tick(FIRST_CHECK_MS, &mut hw, net, updater, restart, &mut sink);
    sink
}

// ── Against the mock updater ──────────────────────────────────

#[test]
fn newer_version_is_flashed_and_restarts() {
    let mut rt = runtime(update_config());
    let mut net = MockNetwork::online();
    let mut updater = MockUpdater::serving("v1.2.10\n");
    let mut restart = RecordingRestart::default();

    let sink = run_check(&mut rt, &mut net, &mut updater, &mut restart);

    assert_eq!(updater.calls, vec!["fetch", "open", "write", "finalize"]);
    assert_eq!(restart.reasons, vec![RestartReason::FirmwareUpdated]);
    assert!(sink.contains(&AppEvent::UpdateFinished(UpdateOutcome::Rebooted)));
    assert_eq!(rt.state().pipeline.stage(), UpdateStage::Rebooting);
}

#[test]
fn same_version_only_checks() {
    let mut rt = runtime(update_config());
    let mut net = MockNetwork::online();
    let mut updater = MockUpdater::serving("v1.2.3");
    let mut restart = RecordingRestart::default();

    let sink = run_check(&mut rt, &mut net, &mut updater, &mut restart);

    assert_eq!(updater.calls, vec!["fetch"]);
    assert!(restart.reasons.is_empty());
    assert!(sink.contains(&AppEvent::UpdateFinished(UpdateOutcome::UpToDate)));
}

#[test]
fn offline_check_is_skipped() {
    let mut rt = runtime(update_config());
    let mut net = MockNetwork::offline();
    let mut updater = MockUpdater::serving("v9.0.0");
    let mut restart = RecordingRestart::default();

    let sink = run_check(&mut rt, &mut net, &mut updater, &mut restart);

    assert!(updater.calls.is_empty());
    assert!(sink.contains(&AppEvent::UpdateFinished(UpdateOutcome::Skipped)));
}

#[test]
fn disabled_updates_never_check() {
    let mut cfg = update_config();
    cfg.capabilities.auto_update = false;
    let mut rt = runtime(cfg);
    let mut net = MockNetwork::online();
    let mut updater = MockUpdater::serving("v9.0.0");
    let mut restart = RecordingRestart::default();

    let sink = run_check(&mut rt, &mut net, &mut updater, &mut restart);

    assert!(updater.calls.is_empty());
    assert_eq!(
        sink.count(|e| matches!(e, AppEvent::UpdateFinished(_))),
        0
    );
}

#[test]
fn failed_verification_aborts_without_restart() {
    let mut rt = runtime(update_config());
    let mut net = MockNetwork::online();
    let mut updater = MockUpdater::serving("v2.0.0");
    updater.finalize_ok = false;
    let mut restart = RecordingRestart::default();

    let sink = run_check(&mut rt, &mut net, &mut updater, &mut restart);

    assert_eq!(updater.calls.last(), Some(&"abort"));
    assert!(restart.reasons.is_empty());
    assert!(sink.contains(&AppEvent::Error(Error::Update(OtaError::VerifyFailed))));
    assert_eq!(rt.state().pipeline.stage(), UpdateStage::Idle);
}

#[test]
fn missing_content_length_never_flashes() {
    let mut rt = runtime(update_config());
    let mut net = MockNetwork::online();
    let mut updater = MockUpdater::serving("v2.0.0");
    updater.image_len = None;
    let mut restart = RecordingRestart::default();

    let sink = run_check(&mut rt, &mut net, &mut updater, &mut restart);

    assert_eq!(updater.calls, vec!["fetch", "open", "abort"]);
    assert!(sink.contains(&AppEvent::UpdateFinished(UpdateOutcome::Failed(
        OtaError::UnknownLength
    ))));
}

#[test]
fn next_check_waits_a_full_interval() {
    let mut rt = runtime(update_config());
    let mut net = MockNetwork::online();
    let mut updater = MockUpdater::serving("v1.0.0");
    let mut restart = RecordingRestart::default();
    let mut hw = MockHardware::new(650.0);
    let mut sink = RecordingSink::default();

    for now in [FIRST_CHECK_MS, FIRST_CHECK_MS + 1_800_000, FIRST_CHECK_MS + 3_600_000] {
        rt.tick(now, &mut hw, &mut net, &mut updater, &mut restart, &mut sink);
    }
    assert_eq!(updater.calls.len(), 1);

    rt.tick(
        FIRST_CHECK_MS + 3_600_001,
        &mut hw,
        &mut net,
        &mut updater,
        &mut restart,
        &mut sink,
    );
    assert_eq!(updater.calls.len(), 2);
    assert_eq!(rt.state().pipeline.state().check_count, 2);
}

// ── Against the simulated HTTP updater ────────────────────────

#[test]
fn simulated_server_update_end_to_end() {
    let cfg = update_config();
    let mut rt = runtime(cfg.clone());
    let mut hw = MockHardware::new(650.0);
    let mut net = MockNetwork::online();
    let mut sink = RecordingSink::default();
    let mut restart = SystemRestart::new();

    let image = vec![0xE9u8; 64 * 1024];
    let mut updater = HttpUpdater::new();
    updater.serve(&cfg.update.version_url, "v1.3.0\nrelease notes follow\n");
    updater.serve(&cfg.update.firmware_url, image.clone());

    rt.tick(FIRST_CHECK_MS, &mut hw, &mut net, &mut updater, &mut restart, &mut sink);

    assert_eq!(updater.booted_image(), Some(image.as_slice()));
    assert_eq!(restart.requested(), &[RestartReason::FirmwareUpdated]);
    assert_eq!(
        rt.state().pipeline.history(),
        &[
            UpdateStage::Checking,
            UpdateStage::Downloading,
            UpdateStage::Flashing,
            UpdateStage::Verifying,
            UpdateStage::Rebooting,
        ]
    );
}

#[test]
fn simulated_server_missing_version_file() {
    let mut rt = runtime(update_config());
    let mut hw = MockHardware::new(650.0);
    let mut net = MockNetwork::online();
    let mut sink = RecordingSink::default();
    let mut restart = SystemRestart::new();
    let mut updater = HttpUpdater::new();

    rt.tick(FIRST_CHECK_MS, &mut hw, &mut net, &mut updater, &mut restart, &mut sink);

    assert!(sink.contains(&AppEvent::UpdateFinished(UpdateOutcome::Failed(
        OtaError::HttpStatus(404)
    ))));
    assert!(restart.requested().is_empty());
    assert!(updater.booted_image().is_none());
}
