//! InfluxDB v1 telemetry adapter.
//!
//! Implements [`TelemetryPort`] by rendering each [`Point`] as one line of
//! line protocol and POSTing it to `<url>/write?db=<name>`.  The server
//! answers `204 No Content` on success.

use core::fmt::Write as _;

use log::warn;

use crate::app::ports::{Point, TelemetryPort};
use crate::config::TelemetryConfig;

#[cfg(target_os = "espidf")]
const TIMEOUT_MS: u64 = 5_000;

/// Escape `s` for a line-protocol position: commas and spaces always,
/// `=` too for tag and field keys and tag values.
fn escape_into(out: &mut String, s: &str, escape_equals: bool) {
    for c in s.chars() {
        if c == ',' || c == ' ' || (escape_equals && c == '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// `measurement,tag=v field=1,field2=2.5`
pub fn line_protocol(point: &Point) -> String {
    let mut line = String::with_capacity(96);
    escape_into(&mut line, point.measurement, false);
    for (key, value) in &point.tags {
        line.push(',');
        escape_into(&mut line, key, true);
        line.push('=');
        escape_into(&mut line, value, true);
    }
    for (i, (key, value)) in point.fields.iter().enumerate() {
        line.push(if i == 0 { ' ' } else { ',' });
        escape_into(&mut line, key, true);
        let _ = write!(line, "={}", value);
    }
    line
}

/// `<url>/write?db=<name>` with a single slash at the join.
pub fn write_url(cfg: &TelemetryConfig) -> String {
    format!(
        "{}/write?db={}",
        cfg.influx_url.trim_end_matches('/'),
        cfg.influx_db
    )
}

pub struct InfluxWriter {
    endpoint: Option<String>,
    writes: u32,
    #[cfg(not(target_os = "espidf"))]
    sim_accept: bool,
    #[cfg(not(target_os = "espidf"))]
    sent: Vec<String>,
}

impl InfluxWriter {
    /// Writer for `cfg`.  Without a URL and database every write is dropped.
    pub fn new(cfg: &TelemetryConfig) -> Self {
        Self {
            endpoint: cfg.is_configured().then(|| write_url(cfg)),
            writes: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_accept: true,
            #[cfg(not(target_os = "espidf"))]
            sent: Vec::new(),
        }
    }

    /// Successful writes since boot.
    pub fn writes(&self) -> u32 {
        self.writes
    }

    #[cfg(target_os = "espidf")]
    fn post(&mut self, url: &str, body: &str) -> bool {
        use embedded_svc::http::Method;
        use embedded_svc::http::client::Client;
        use embedded_svc::io::Write;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let config = Configuration {
            timeout: Some(std::time::Duration::from_millis(TIMEOUT_MS)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let result = (|| -> anyhow::Result<u16> {
            let mut client = Client::wrap(EspHttpConnection::new(&config)?);
            let len = body.len().to_string();
            let headers = [
                ("Content-Type", "text/plain; charset=utf-8"),
                ("Content-Length", len.as_str()),
            ];
            let mut request = client.post(url, &headers)?;
            request.write_all(body.as_bytes())?;
            request.flush()?;
            Ok(request.submit()?.status())
        })();
        match result {
            Ok(204) => true,
            Ok(status) => {
                warn!("Influx: write answered HTTP {}", status);
                false
            }
            Err(e) => {
                warn!("Influx: write failed: {:#}", e);
                false
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn post(&mut self, _url: &str, body: &str) -> bool {
        self.sent.push(body.to_owned());
        self.sim_accept
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_accept(&mut self, accept: bool) {
        self.sim_accept = accept;
    }

    /// Bodies posted so far (simulation).
    #[cfg(not(target_os = "espidf"))]
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl TelemetryPort for InfluxWriter {
    fn write(&mut self, point: &Point) -> bool {
        let Some(url) = self.endpoint.clone() else {
            return false;
        };
        let ok = self.post(&url, &line_protocol(point));
        if ok {
            self.writes = self.writes.wrapping_add(1);
        }
        ok
    }
}
