//! CO2 Ampel Firmware: Main Entry Point
//!
//! Hexagonal architecture around a cooperative, single-threaded main loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter    LogEventSink   NvsConfigStore  Esp32Clock  │
//! │  (Sensor+Display)   BleNotifier    (ConfigStore)   (Clock)     │
//! │  NetworkAdapter     HttpUpdater    SystemRestart               │
//! │  (WiFi+Influx)      (Version+FW)   (Restart)                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              DeviceRuntime (pure logic)                │    │
//! │  │  Status · Drift calibration · OTA · Watchdog           │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  GPIO0 ISR ──▶ PORTAL_REQUEST (AtomicBool)                     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::Result;
use log::{info, warn};

use esp_idf_hal::delay::{Delay, FreeRtos};
use esp_idf_hal::gpio::AnyIOPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use co2ampel::adapters::ble::BleNotifier;
use co2ampel::adapters::device_id;
use co2ampel::adapters::hardware::HardwareAdapter;
use co2ampel::adapters::http_ota::{self, HttpUpdater};
use co2ampel::adapters::influx::InfluxWriter;
use co2ampel::adapters::log_sink::LogEventSink;
use co2ampel::adapters::network::NetworkAdapter;
use co2ampel::adapters::nvs::NvsConfigStore;
use co2ampel::adapters::restart::SystemRestart;
use co2ampel::adapters::time::Esp32Clock;
use co2ampel::adapters::wifi::WifiAdapter;
use co2ampel::app::ports::ClockPort;
use co2ampel::app::service::DeviceRuntime;
use co2ampel::config::DeviceConfig;
use co2ampel::drivers::{hw_init, led_strip::LedStrip};
use co2ampel::pins;
use co2ampel::portal::PORTAL_REQUEST;
use co2ampel::sensors::bme280::Bme280;
use co2ampel::sensors::mhz19::{Mhz19, UartLink};
use co2ampel::version::CURRENT_VERSION;

/// Idle time between loop passes.  Every duty is scheduled off the clock,
/// so this only bounds button latency.
const LOOP_SLEEP_MS: u32 = 20;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  CO2 Ampel {:<26}║", CURRENT_VERSION);
    info!("╚══════════════════════════════════════╝");

    // ── 1b. OTA rollback check ────────────────────────────────
    http_ota::mark_running_valid();

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let store = NvsConfigStore::new().map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let config = DeviceConfig::load(&store);
    let caps = config.capabilities;
    info!(
        "Config: telemetry={} ble={} auto_update={} auto_calibration={}",
        caps.telemetry, caps.ble, caps.auto_update, caps.auto_calibration
    );

    // ── 3. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let name = device_id::device_name(&mac);
    let portal_password = device_id::portal_password(&mac);
    info!("Device: {}", name);

    // ── 4. Sensors and LED strip ──────────────────────────────
    let uart_config = UartConfig::default().baudrate(Hertz(pins::MHZ19_BAUD));
    let uart = UartDriver::new(
        peripherals.uart2,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &uart_config,
    )?;
    let mut co2 = Mhz19::new(UartLink::new(uart));
    if let Err(e) = co2.begin() {
        warn!("MH-Z19: range setup failed: {}", e);
    }

    let i2c_config = I2cConfig::new().baudrate(Hertz(pins::I2C_FREQ_HZ));
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        &i2c_config,
    )?;
    let env = match Bme280::probe(i2c, Delay::new_default()) {
        Ok(bme) => Some(bme),
        Err((e, _bus)) => {
            warn!("BME280 unavailable ({}), using MH-Z19 temperature", e);
            None
        }
    };

    let strip = LedStrip::new(peripherals.rmt.channel0, peripherals.pins.gpio5)?;
    let mut hw = HardwareAdapter::new(co2, env, strip);

    // ── 5. Network ────────────────────────────────────────────
    let mut wifi = WifiAdapter::new(
        peripherals.modem,
        sys_loop,
        nvs_partition,
        store,
        &name,
        &portal_password,
    )?;
    if caps.telemetry && !wifi.connect_stored()? {
        info!("WiFi: not connected, opening setup portal");
        PORTAL_REQUEST.set(true);
    }
    let mut net = NetworkAdapter::new(wifi, InfluxWriter::new(&config.telemetry));

    if let Err(e) = hw_init::init_portal_button() {
        warn!("Portal button unavailable: {}", e);
    }

    // ── 6. Event sinks ────────────────────────────────────────
    let ble = caps.ble.then(|| {
        let mut ble = BleNotifier::new(&name);
        ble.start();
        ble
    });
    let mut sink = (LogEventSink::new(), ble);

    // ── 7. Runtime ────────────────────────────────────────────
    let mut updater = HttpUpdater::new();
    let mut restart = SystemRestart::new();
    let clock = Esp32Clock::new();

    let mut runtime = DeviceRuntime::new(config, &name, &PORTAL_REQUEST);
    runtime.start(&mut hw, &mut sink);

    info!("System ready. Entering main loop.");

    loop {
        runtime.tick(
            clock.now_ms(),
            &mut hw,
            &mut net,
            &mut updater,
            &mut restart,
            &mut sink,
        );
        FreeRtos::delay_ms(LOOP_SLEEP_MS);
    }
}
