//! Setup-portal flow against the simulated WiFi adapter, NVS store and
//! InfluxDB writer.
//!
//! Boot without credentials → portal requested → form submitted →
//! credentials persisted → link up → telemetry flows.

use co2ampel::adapters::influx::InfluxWriter;
use co2ampel::adapters::network::NetworkAdapter;
use co2ampel::adapters::nvs::NvsConfigStore;
use co2ampel::adapters::wifi::WifiAdapter;
use co2ampel::app::events::AppEvent;
use co2ampel::app::ports::{ConnectivityPort, TelemetryPort};
use co2ampel::app::service::DeviceRuntime;
use co2ampel::app::state::Subsystem;
use co2ampel::config::DeviceConfig;

use crate::mock_hw::{
    MEASURE_STEP_MS, MockHardware, MockUpdater, RecordingRestart, RecordingSink, portal_flag,
};

type SimNetwork = NetworkAdapter<WifiAdapter<NvsConfigStore>, InfluxWriter>;

fn network(config: &DeviceConfig) -> SimNetwork {
    let store = NvsConfigStore::new().unwrap();
    let wifi = WifiAdapter::new(store, "CO2 Ampel 99", "pass99");
    NetworkAdapter::new(wifi, InfluxWriter::new(&config.telemetry))
}

#[test]
fn boot_without_credentials_opens_portal_and_joins_after_save() {
    let mut config = DeviceConfig::default();
    config.capabilities.auto_update = false;
    config.telemetry.influx_url.push_str("http://db.local:8086").unwrap();
    config.telemetry.influx_db.push_str("school").unwrap();

    let mut net = network(&config);
    assert!(!net.link.connect_stored().unwrap());

    let flag = portal_flag();
    flag.set(true);

    let mut rt = DeviceRuntime::new(config, "CO2 Ampel 99", flag);
    let mut hw = MockHardware::new(640.0);
    let mut updater = MockUpdater::serving("v0.0.1");
    let mut restart = RecordingRestart::default();
    let mut sink = RecordingSink::default();
    rt.start(&mut hw, &mut sink);

    rt.tick(0, &mut hw, &mut net, &mut updater, &mut restart, &mut sink);
    assert!(sink.contains(&AppEvent::PortalChanged { running: true }));
    assert!(rt.state().fault(Subsystem::Network).active, "offline until joined");
    assert!(net.telemetry.sent().is_empty());

    net.link
        .submit("s=Classroom+12&p=chalkdust&useBLEID=0")
        .unwrap();
    rt.tick(10, &mut hw, &mut net, &mut updater, &mut restart, &mut sink);
    assert!(net.is_connected());

    rt.tick(MEASURE_STEP_MS, &mut hw, &mut net, &mut updater, &mut restart, &mut sink);
    assert!(!rt.state().fault(Subsystem::Network).active);
    assert_eq!(net.telemetry.sent().len(), 1);
    assert!(net.telemetry.sent()[0].starts_with("Environment,device=CO2\\ Ampel\\ 99 ppm=640"));
    assert_eq!(net.telemetry.writes(), 1);
}

#[test]
fn invalid_form_is_rejected_before_it_reaches_the_store() {
    let config = DeviceConfig::default();
    let mut net = network(&config);
    assert!(net.link.submit("s=Lab&p=short").is_err());
    net.link.request_portal(true);
    net.link.process_portal();
    assert!(!net.is_connected());
}

#[test]
fn portal_access_point_uses_device_identity() {
    let net = network(&DeviceConfig::default());
    assert_eq!(net.link.ap_credentials(), ("CO2 Ampel 99", "pass99"));
}

#[test]
fn unconfigured_influx_drops_points() {
    let mut net = network(&DeviceConfig::default());
    let mut p = co2ampel::app::ports::Point::new("Environment");
    p.add_field("ppm", 500.0);
    assert!(!net.write(&p));
    assert!(net.telemetry.sent().is_empty());
}
