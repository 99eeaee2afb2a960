//! HTTP firmware updater.
//!
//! Implements [`VersionSource`] and [`FirmwareTransport`] for the update
//! pipeline: a plain GET for the version file and a streamed GET whose body
//! is copied chunk by chunk into the inactive OTA partition.
//!
//! - **`target_os = "espidf"`**: `EspHttpConnection` + `esp-ota`.
//! - **all other targets**: an in-memory URL map standing in for the server
//!   and a byte vector standing in for the partition.

use log::{info, warn};

use crate::app::ports::{FirmwareTransport, VersionSource};
use crate::ota::OtaError;

/// Upper bound for the version text resource.
const MAX_VERSION_BODY: usize = 256;
const CHUNK_SIZE: usize = 1024;
#[cfg(target_os = "espidf")]
const TIMEOUT_MS: u64 = 30_000;

pub struct HttpUpdater {
    #[cfg(target_os = "espidf")]
    conn: Option<esp_idf_svc::http::client::EspHttpConnection>,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    server: std::collections::HashMap<String, Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    stream: Option<Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    partition: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    partition_size: u64,
    #[cfg(not(target_os = "espidf"))]
    booted_image: Option<Vec<u8>>,
}

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
impl HttpUpdater {
    pub fn new() -> Self {
        Self {
            conn: None,
            update: None,
        }
    }

    fn connect(url: &str) -> Result<esp_idf_svc::http::client::EspHttpConnection, OtaError> {
        use embedded_svc::http::Method;
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let config = Configuration {
            timeout: Some(std::time::Duration::from_millis(TIMEOUT_MS)),
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            ..Default::default()
        };
        let mut conn = EspHttpConnection::new(&config).map_err(|e| {
            warn!("OTA: HTTP client init failed: {}", e);
            OtaError::ConnectFailed
        })?;
        conn.initiate_request(Method::Get, url, &[])
            .and_then(|()| conn.initiate_response())
            .map_err(|e| {
                warn!("OTA: GET {} failed: {}", url, e);
                OtaError::ConnectFailed
            })?;
        let status = conn.status();
        if status != 200 {
            return Err(OtaError::HttpStatus(status));
        }
        Ok(conn)
    }

    fn next_partition_size() -> Result<u64, OtaError> {
        // SAFETY: read-only query of the partition table.
        let part = unsafe { esp_idf_svc::sys::esp_ota_get_next_update_partition(core::ptr::null()) };
        if part.is_null() {
            return Err(OtaError::NoPartition);
        }
        Ok(u64::from(unsafe { (*part).size }))
    }
}

#[cfg(target_os = "espidf")]
impl Default for HttpUpdater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl VersionSource for HttpUpdater {
    fn fetch_text(&mut self, url: &str) -> Result<String, OtaError> {
        use embedded_svc::io::Read;

        let mut conn = Self::connect(url).map_err(|e| match e {
            OtaError::ConnectFailed => OtaError::CheckFailed,
            other => other,
        })?;
        let mut body = Vec::new();
        let mut buf = [0u8; 128];
        loop {
            let n = conn.read(&mut buf).map_err(|_| OtaError::CheckFailed)?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&buf[..n]);
            if body.len() > MAX_VERSION_BODY {
                return Err(OtaError::CheckFailed);
            }
        }
        String::from_utf8(body).map_err(|_| OtaError::CheckFailed)
    }
}

#[cfg(target_os = "espidf")]
impl FirmwareTransport for HttpUpdater {
    fn open_stream(&mut self, url: &str) -> Result<Option<u64>, OtaError> {
        use embedded_svc::http::Headers;

        let conn = Self::connect(url)?;
        let len = conn.content_len();
        info!("OTA: image stream open ({:?} bytes)", len);
        self.conn = Some(conn);
        Ok(len)
    }

    fn flash_write(&mut self, expected_len: u64) -> Result<u64, OtaError> {
        use embedded_svc::io::Read;

        if expected_len > Self::next_partition_size()? {
            return Err(OtaError::TooLarge);
        }
        let conn = self.conn.as_mut().ok_or(OtaError::ConnectFailed)?;
        let mut update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("esp-ota begin failed: {:?}", e);
            OtaError::BeginFailed
        })?;

        let mut written = 0u64;
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = conn.read(&mut chunk).map_err(|_| OtaError::WriteFailed)?;
            if n == 0 {
                break;
            }
            if written + n as u64 > expected_len {
                return Err(OtaError::SizeMismatch {
                    expected: expected_len,
                    written: written + n as u64,
                });
            }
            update.write(&chunk[..n]).map_err(|e| {
                warn!("esp-ota write failed: {:?}", e);
                OtaError::WriteFailed
            })?;
            written += n as u64;
        }
        self.update = Some(update);
        Ok(written)
    }

    fn finalize(&mut self) -> bool {
        self.conn = None;
        let Some(update) = self.update.take() else {
            return false;
        };
        match update.finalize() {
            Ok(mut completed) => match completed.set_as_boot_partition() {
                Ok(()) => true,
                Err(e) => {
                    warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                    false
                }
            },
            Err(e) => {
                warn!("esp-ota finalize failed: {:?}", e);
                false
            }
        }
    }

    fn abort(&mut self) {
        // esp-ota aborts when OtaUpdate is dropped.
        self.update = None;
        self.conn = None;
    }
}

/// Mark the running image valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn mark_running_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

// ── Simulation ────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl HttpUpdater {
    /// Inactive partition size in the simulation.
    pub const SIM_PARTITION_SIZE: u64 = 1_536 * 1024;

    pub fn new() -> Self {
        Self {
            server: std::collections::HashMap::new(),
            stream: None,
            partition: Vec::new(),
            partition_size: Self::SIM_PARTITION_SIZE,
            booted_image: None,
        }
    }

    /// Serve `body` at `url`.
    pub fn serve(&mut self, url: &str, body: impl Into<Vec<u8>>) {
        self.server.insert(url.to_owned(), body.into());
    }

    pub fn set_partition_size(&mut self, size: u64) {
        self.partition_size = size;
    }

    /// Image marked bootable by the last successful finalize.
    pub fn booted_image(&self) -> Option<&[u8]> {
        self.booted_image.as_deref()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for HttpUpdater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl VersionSource for HttpUpdater {
    fn fetch_text(&mut self, url: &str) -> Result<String, OtaError> {
        let body = self.server.get(url).ok_or(OtaError::HttpStatus(404))?;
        if body.len() > MAX_VERSION_BODY {
            return Err(OtaError::CheckFailed);
        }
        String::from_utf8(body.clone()).map_err(|_| OtaError::CheckFailed)
    }
}

#[cfg(not(target_os = "espidf"))]
impl FirmwareTransport for HttpUpdater {
    fn open_stream(&mut self, url: &str) -> Result<Option<u64>, OtaError> {
        let body = self.server.get(url).ok_or(OtaError::HttpStatus(404))?.clone();
        let len = body.len() as u64;
        self.stream = Some(body);
        Ok(Some(len))
    }

    fn flash_write(&mut self, expected_len: u64) -> Result<u64, OtaError> {
        if expected_len > self.partition_size {
            return Err(OtaError::TooLarge);
        }
        let stream = self.stream.take().ok_or(OtaError::ConnectFailed)?;
        self.partition.clear();
        for chunk in stream.chunks(CHUNK_SIZE) {
            self.partition.extend_from_slice(chunk);
        }
        Ok(self.partition.len() as u64)
    }

    fn finalize(&mut self) -> bool {
        if self.partition.is_empty() {
            return false;
        }
        self.booted_image = Some(core::mem::take(&mut self.partition));
        true
    }

    fn abort(&mut self) {
        self.stream = None;
        self.partition.clear();
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mark_running_valid() {
    info!("OTA rollback check (simulation): skipped");
}
