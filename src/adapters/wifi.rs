//! WiFi station adapter with the setup portal.
//!
//! Implements [`ConnectivityPort`].  The portal is a soft AP named after
//! the device (`"CO2 Ampel <id>"`, password `"pass<id>"`) serving one form
//! that collects WiFi credentials and the InfluxDB endpoint.  It runs next
//! to the station interface, so measurements keep flowing while it is up.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` plus an
//!   `EspHttpServer` form handler.
//! - **all other targets**: a `connected` flag and [`WifiAdapter::submit`]
//!   stand in for the radio and the browser.
//!
//! Form submissions are parsed on the HTTP task and parked in a shared
//! slot; [`ConnectivityPort::process_portal`] applies them on the main loop.

use core::fmt;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigStore, ConnectivityPort};
use crate::config::{DeviceConfig, InfluxDbName, InfluxUrl};

/// NVS keys for the station credentials.
pub const KEY_WIFI_SSID: &str = "wifiSSID";
pub const KEY_WIFI_PASS: &str = "wifiPass";

// Form field names served by the portal page.
const FIELD_SSID: &str = "s";
const FIELD_PASS: &str = "p";
const FIELD_INFLUX_URL: &str = "influxDBURLID";
const FIELD_INFLUX_DB: &str = "influxDBNameID";
const FIELD_USE_WIFI: &str = "useWifiID";
const FIELD_USE_BLE: &str = "useBLEID";

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    InvalidSsid,
    InvalidPassword,
    InvalidField(&'static str),
    Storage(ConfigError),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::InvalidField(name) => write!(f, "form field '{}' invalid", name),
            Self::Storage(e) => write!(f, "storing portal settings failed: {}", e),
        }
    }
}

impl From<ConfigError> for ConnectivityError {
    fn from(e: ConfigError) -> Self {
        Self::Storage(e)
    }
}

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

/// SSIDs are 1..=32 bytes of printable ASCII (space through tilde).
fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    let printable = ssid.bytes().all(|b| (0x20..=0x7E).contains(&b));
    if ssid.is_empty() || ssid.len() > 32 || !printable {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Portal form
// ───────────────────────────────────────────────────────────────

/// Decode one `application/x-www-form-urlencoded` component.
fn url_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = s.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).ok()
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConnectivityError> {
    match value.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(ConnectivityError::InvalidField(name)),
    }
}

fn bounded<const N: usize>(
    name: &'static str,
    value: &str,
) -> Result<heapless::String<N>, ConnectivityError> {
    let mut s = heapless::String::new();
    s.push_str(value)
        .map_err(|()| ConnectivityError::InvalidField(name))?;
    Ok(s)
}

/// One submission of the portal page.  Empty fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortalForm {
    pub ssid: Option<heapless::String<32>>,
    pub password: heapless::String<64>,
    pub influx_url: Option<InfluxUrl>,
    pub influx_db: Option<InfluxDbName>,
    pub use_wifi: Option<bool>,
    pub use_ble: Option<bool>,
}

impl PortalForm {
    /// Parse and validate a urlencoded form body.
    pub fn parse(body: &str) -> Result<Self, ConnectivityError> {
        let mut form = Self::default();
        for pair in body.split('&').filter(|p| !p.is_empty()) {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = url_decode(raw_key).ok_or(ConnectivityError::InvalidField("key"))?;
            let value = url_decode(raw_value).ok_or(ConnectivityError::InvalidField("value"))?;
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                FIELD_SSID => {
                    validate_ssid(&value)?;
                    form.ssid = Some(bounded(FIELD_SSID, &value)?);
                }
                FIELD_PASS => {
                    validate_password(&value)?;
                    form.password = bounded(FIELD_PASS, &value)?;
                }
                FIELD_INFLUX_URL => form.influx_url = Some(bounded(FIELD_INFLUX_URL, &value)?),
                FIELD_INFLUX_DB => form.influx_db = Some(bounded(FIELD_INFLUX_DB, &value)?),
                FIELD_USE_WIFI => form.use_wifi = Some(parse_flag(FIELD_USE_WIFI, &value)?),
                FIELD_USE_BLE => form.use_ble = Some(parse_flag(FIELD_USE_BLE, &value)?),
                other => warn!("Portal: ignoring unknown field '{}'", other),
            }
        }
        Ok(form)
    }

    /// Persist the submission.  Settings other than the WiFi credentials
    /// take effect at the next boot.
    pub fn apply(&self, store: &mut impl ConfigStore) -> Result<(), ConnectivityError> {
        let mut cfg = DeviceConfig::load(&*store);
        if let Some(url) = &self.influx_url {
            cfg.telemetry.influx_url.clone_from(url);
        }
        if let Some(db) = &self.influx_db {
            cfg.telemetry.influx_db.clone_from(db);
        }
        if let Some(on) = self.use_wifi {
            cfg.capabilities.telemetry = on;
        }
        if let Some(on) = self.use_ble {
            cfg.capabilities.ble = on;
        }
        if cfg.capabilities.require_connectivity && !cfg.delivers_telemetry() {
            warn!("Portal: telemetry off, connectivity no longer required");
            cfg.capabilities.require_connectivity = false;
        }
        cfg.store(&mut *store)?;

        if let Some(ssid) = &self.ssid {
            store.set(KEY_WIFI_SSID, ssid)?;
            store.set(KEY_WIFI_PASS, &self.password)?;
        }
        Ok(())
    }
}

/// Stored station credentials, if any.
pub fn stored_credentials(store: &impl ConfigStore) -> Option<(String, String)> {
    let ssid = store.get(KEY_WIFI_SSID).filter(|s| !s.is_empty())?;
    let pass = store.get(KEY_WIFI_PASS).unwrap_or_default();
    Some((ssid, pass))
}

#[cfg(target_os = "espidf")]
const PORTAL_HTML: &str = r#"<!DOCTYPE html><html><head><meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1"><title>CO2 Ampel</title></head>
<body><h1>CO2 Ampel setup</h1><form method="POST" action="/save">
<label>WiFi SSID <input name="s" maxlength="32"></label><br>
<label>WiFi password <input name="p" type="password" maxlength="64"></label><br>
<label>Influx DB URL <input name="influxDBURLID" maxlength="40"></label><br>
<label>Influx DB Name <input name="influxDBNameID" maxlength="32"></label><br>
<label>Use Wifi 1/0 <input name="useWifiID" maxlength="1"></label><br>
<label>Use BLE 1/0 <input name="useBLEID" maxlength="1"></label><br>
<button type="submit">Save</button></form></body></html>"#;

#[cfg(target_os = "espidf")]
const MAX_FORM_BODY: usize = 1024;
#[cfg(target_os = "espidf")]
const WIFI_CONNECT_ATTEMPTS: u32 = 3;

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter<S: ConfigStore> {
    store: S,
    ap_ssid: heapless::String<32>,
    ap_password: heapless::String<64>,
    pending: Arc<Mutex<Option<PortalForm>>>,
    portal_running: bool,
    #[cfg(target_os = "espidf")]
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    #[cfg(target_os = "espidf")]
    server: Option<esp_idf_svc::http::server::EspHttpServer<'static>>,
    #[cfg(not(target_os = "espidf"))]
    connected: bool,
}

impl<S: ConfigStore> WifiAdapter<S> {
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn portal_running(&self) -> bool {
        self.portal_running
    }

    fn take_pending(&self) -> Option<PortalForm> {
        match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => {
                warn!("Portal: submission slot poisoned");
                None
            }
        }
    }

    fn access_point_ids(device_name: &str, ap_password: &str) -> (heapless::String<32>, heapless::String<64>) {
        let mut ssid = heapless::String::new();
        let mut pass = heapless::String::new();
        if ssid.push_str(device_name).is_err() || pass.push_str(ap_password).is_err() {
            warn!("WiFi: portal AP name truncated");
        }
        (ssid, pass)
    }
}

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl<S: ConfigStore> WifiAdapter<S> {
    pub fn new(
        modem: esp_idf_svc::hal::modem::Modem,
        sys_loop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: esp_idf_svc::nvs::EspDefaultNvsPartition,
        store: S,
        device_name: &str,
        ap_password: &str,
    ) -> anyhow::Result<Self> {
        use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;
        let (ap_ssid, ap_password) = Self::access_point_ids(device_name, ap_password);
        Ok(Self {
            store,
            ap_ssid,
            ap_password,
            pending: Arc::new(Mutex::new(None)),
            portal_running: false,
            wifi,
            server: None,
        })
    }

    fn client_config(&self) -> anyhow::Result<embedded_svc::wifi::ClientConfiguration> {
        use anyhow::anyhow;
        use embedded_svc::wifi::{AuthMethod, ClientConfiguration};

        let (ssid, pass) =
            stored_credentials(&self.store).ok_or_else(|| anyhow!("no WiFi credentials stored"))?;
        Ok(ClientConfiguration {
            ssid: ssid.as_str().try_into().map_err(|_| anyhow!("wifi ssid too long"))?,
            password: pass.as_str().try_into().map_err(|_| anyhow!("wifi password too long"))?,
            auth_method: if pass.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPAWPA2Personal
            },
            ..Default::default()
        })
    }

    fn ap_config(&self) -> anyhow::Result<embedded_svc::wifi::AccessPointConfiguration> {
        use anyhow::anyhow;
        use embedded_svc::wifi::{AccessPointConfiguration, AuthMethod};

        Ok(AccessPointConfiguration {
            ssid: self.ap_ssid.as_str().try_into().map_err(|_| anyhow!("AP ssid too long"))?,
            password: self
                .ap_password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("AP password too long"))?,
            auth_method: AuthMethod::WPA2Personal,
            channel: 1,
            ..Default::default()
        })
    }

    /// Join the stored network.  Returns `Ok(false)` when there are no
    /// credentials or every attempt failed; the caller opens the portal.
    pub fn connect_stored(&mut self) -> anyhow::Result<bool> {
        use embedded_svc::wifi::Configuration;

        let client = match self.client_config() {
            Ok(c) => c,
            Err(e) => {
                warn!("WiFi: {:#}", e);
                return Ok(false);
            }
        };
        self.wifi.set_configuration(&Configuration::Client(client))?;
        self.wifi.start()?;
        Ok(self.try_connect())
    }

    fn try_connect(&mut self) -> bool {
        for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
            info!("WiFi: connect attempt {}/{}", attempt, WIFI_CONNECT_ATTEMPTS);
            match self.wifi.connect().and_then(|()| self.wifi.wait_netif_up()) {
                Ok(()) => {
                    info!("WiFi: connected");
                    return true;
                }
                Err(e) => {
                    warn!("WiFi: attempt {} failed: {}", attempt, e);
                    let _ = self.wifi.disconnect();
                }
            }
        }
        false
    }

    fn start_portal(&mut self) -> anyhow::Result<()> {
        use embedded_svc::http::Method;
        use embedded_svc::io::{Read, Write};
        use embedded_svc::wifi::Configuration;
        use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};

        let client = self.client_config().unwrap_or_default();
        self.wifi
            .set_configuration(&Configuration::Mixed(client, self.ap_config()?))?;
        self.wifi.start()?;

        let mut server = EspHttpServer::new(&HttpConfiguration {
            stack_size: 10 * 1024,
            ..Default::default()
        })?;

        server.fn_handler::<anyhow::Error, _>("/", Method::Get, |req| {
            req.into_response(200, Some("OK"), &[("Content-Type", "text/html; charset=utf-8")])?
                .write_all(PORTAL_HTML.as_bytes())?;
            Ok(())
        })?;

        let pending = self.pending.clone();
        server.fn_handler::<anyhow::Error, _>("/save", Method::Post, move |mut req| {
            let len = req.content_len().unwrap_or(0) as usize;
            if len > MAX_FORM_BODY {
                req.into_status_response(413)?.write_all(b"form too large")?;
                return Ok(());
            }
            let mut body = vec![0u8; len];
            req.read_exact(&mut body)?;
            let parsed = core::str::from_utf8(&body)
                .map_err(|_| ConnectivityError::InvalidField("body"))
                .and_then(PortalForm::parse);
            match parsed {
                Ok(form) => {
                    if let Ok(mut slot) = pending.lock() {
                        *slot = Some(form);
                    }
                    req.into_ok_response()?.write_all(b"Saved. Connecting...")?;
                }
                Err(e) => {
                    req.into_status_response(400)?.write_all(e.to_string().as_bytes())?;
                }
            }
            Ok(())
        })?;

        self.server = Some(server);
        info!("Portal: AP '{}' up", self.ap_ssid);
        Ok(())
    }

    fn stop_portal(&mut self) -> anyhow::Result<()> {
        use embedded_svc::wifi::Configuration;

        self.server = None;
        if let Ok(client) = self.client_config() {
            self.wifi.set_configuration(&Configuration::Client(client))?;
        }
        info!("Portal: AP down");
        Ok(())
    }

    fn platform_is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false)
    }

    fn platform_reconnect(&mut self) {
        use embedded_svc::wifi::Configuration;

        let config = match self.client_config() {
            Ok(client) if self.portal_running => self
                .ap_config()
                .map(|ap| Configuration::Mixed(client, ap)),
            Ok(client) => Ok(Configuration::Client(client)),
            Err(e) => Err(e),
        };
        match config {
            Ok(c) => {
                if let Err(e) = self.wifi.set_configuration(&c) {
                    warn!("WiFi: reconfigure failed: {}", e);
                    return;
                }
                self.try_connect();
            }
            Err(e) => warn!("WiFi: {:#}", e),
        }
    }
}

// ── Simulation ────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl<S: ConfigStore> WifiAdapter<S> {
    pub fn new(store: S, device_name: &str, ap_password: &str) -> Self {
        let (ap_ssid, ap_password) = Self::access_point_ids(device_name, ap_password);
        Self {
            store,
            ap_ssid,
            ap_password,
            pending: Arc::new(Mutex::new(None)),
            portal_running: false,
            connected: false,
        }
    }

    /// Joins as soon as credentials are stored.
    #[allow(clippy::unnecessary_wraps)]
    pub fn connect_stored(&mut self) -> anyhow::Result<bool> {
        self.connected = stored_credentials(&self.store).is_some();
        Ok(self.connected)
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Post a form body as the portal's HTTP handler would.
    pub fn submit(&self, body: &str) -> Result<(), ConnectivityError> {
        let form = PortalForm::parse(body)?;
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(form);
        }
        Ok(())
    }

    pub fn ap_credentials(&self) -> (&str, &str) {
        (&self.ap_ssid, &self.ap_password)
    }

    #[allow(clippy::unnecessary_wraps)]
    fn start_portal(&mut self) -> anyhow::Result<()> {
        info!("Portal(sim): AP '{}' up", self.ap_ssid);
        Ok(())
    }

    #[allow(clippy::unnecessary_wraps)]
    fn stop_portal(&mut self) -> anyhow::Result<()> {
        info!("Portal(sim): AP down");
        Ok(())
    }

    fn platform_is_connected(&self) -> bool {
        self.connected
    }

    fn platform_reconnect(&mut self) {
        self.connected = stored_credentials(&self.store).is_some();
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl<S: ConfigStore> ConnectivityPort for WifiAdapter<S> {
    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn request_portal(&mut self, start: bool) {
        if start == self.portal_running {
            return;
        }
        let result = if start {
            self.start_portal()
        } else {
            self.stop_portal()
        };
        match result {
            Ok(()) => self.portal_running = start,
            Err(e) => warn!("Portal: {} failed: {:#}", if start { "start" } else { "stop" }, e),
        }
    }

    fn process_portal(&mut self) {
        let Some(form) = self.take_pending() else {
            return;
        };
        match form.apply(&mut self.store) {
            Ok(()) => {
                info!("Portal: settings saved");
                if form.ssid.is_some() {
                    self.platform_reconnect();
                }
            }
            Err(e) => warn!("Portal: {}", e),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
