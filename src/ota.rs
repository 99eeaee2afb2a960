//! Self-update pipeline.
//!
//! ```text
//!  Idle ─▶ Checking ─┬─▶ UpToDate ─▶ Idle
//!                    └─▶ Downloading ─▶ Flashing ─▶ Verifying ─▶ Rebooting
//!           any failure ─▶ Failed ─▶ Idle
//! ```
//!
//! A run is blocking: it holds the main loop from the version check until
//! either the device restarts or the pipeline is back in `Idle`.  A failure
//! never restarts the device; the next scheduled check simply tries again.
//! There is no rollback path.

use core::fmt;

use log::{info, warn};

use crate::app::ports::{FirmwareTransport, RestartPort, RestartReason, VersionSource};
use crate::config::UpdateConfig;
use crate::version::FirmwareVersion;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// The version resource could not be fetched.
    CheckFailed,
    /// Server answered with a non-success status.
    HttpStatus(u16),
    /// The first line of the version resource was blank or too long.
    EmptyVersion,
    /// Firmware stream could not be opened.
    ConnectFailed,
    /// Server did not announce a positive content length.
    UnknownLength,
    /// Image does not fit the inactive partition.
    TooLarge,
    NoPartition,
    BeginFailed,
    WriteFailed,
    /// Stream ended before (or after) the announced length.
    SizeMismatch { expected: u64, written: u64 },
    VerifyFailed,
    BootSetFailed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckFailed => write!(f, "version check request failed"),
            Self::HttpStatus(code) => write!(f, "unexpected HTTP status {code}"),
            Self::EmptyVersion => write!(f, "remote version is empty"),
            Self::ConnectFailed => write!(f, "firmware download could not be started"),
            Self::UnknownLength => write!(f, "firmware length unknown or zero"),
            Self::TooLarge => write!(f, "firmware larger than OTA partition"),
            Self::NoPartition => write!(f, "no inactive OTA partition available"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::SizeMismatch { expected, written } => {
                write!(f, "wrote {written} of {expected} bytes")
            }
            Self::VerifyFailed => write!(f, "OTA image verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
        }
    }
}

// ── State ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Idle,
    Checking,
    UpToDate,
    Downloading,
    Flashing,
    Verifying,
    Rebooting,
    Failed(OtaError),
}

/// Bookkeeping for the check schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateState {
    pub last_check_ms: Option<u64>,
    pub check_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    UpToDate,
    /// Restart was requested.  On hardware this is never observed.
    Rebooted,
    Failed(OtaError),
    /// Disabled, offline, or already rebooting.
    Skipped,
}

const HISTORY_LEN: usize = 8;

pub struct UpdatePipeline {
    stage: UpdateStage,
    state: UpdateState,
    history: heapless::Vec<UpdateStage, HISTORY_LEN>,
}

impl UpdatePipeline {
    pub fn new() -> Self {
        Self {
            stage: UpdateStage::Idle,
            state: UpdateState::default(),
            history: heapless::Vec::new(),
        }
    }

    pub fn stage(&self) -> UpdateStage {
        self.stage
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Stages visited during the most recent run, in order.
    pub fn history(&self) -> &[UpdateStage] {
        &self.history
    }

    /// Run one full check/download/flash cycle against `current`.
    pub fn run(
        &mut self,
        now_ms: u64,
        current: &str,
        urls: &UpdateConfig,
        updater: &mut (impl VersionSource + FirmwareTransport),
        restart: &mut impl RestartPort,
    ) -> UpdateOutcome {
        if self.stage == UpdateStage::Rebooting {
            return UpdateOutcome::Skipped;
        }

        self.history.clear();
        self.state.last_check_ms = Some(now_ms);
        self.state.check_count = self.state.check_count.saturating_add(1);

        self.enter(UpdateStage::Checking);
        let text = match updater.fetch_text(&urls.version_url) {
            Ok(t) => t,
            Err(e) => return self.fail(e),
        };
        let Some(remote) = text.lines().next().and_then(FirmwareVersion::parse) else {
            return self.fail(OtaError::EmptyVersion);
        };

        if !remote.is_newer_than(current) {
            info!("OTA: {} is current (remote {})", current, remote);
            self.enter(UpdateStage::UpToDate);
            self.enter(UpdateStage::Idle);
            return UpdateOutcome::UpToDate;
        }
        info!("OTA: updating {} -> {}", current, remote);

        self.enter(UpdateStage::Downloading);
        let expected = match updater.open_stream(&urls.firmware_url) {
            Ok(Some(len)) if len > 0 => len,
            Ok(_) => {
                updater.abort();
                return self.fail(OtaError::UnknownLength);
            }
            Err(e) => {
                updater.abort();
                return self.fail(e);
            }
        };

        self.enter(UpdateStage::Flashing);
        match updater.flash_write(expected) {
            Ok(written) if written == expected => {}
            Ok(written) => {
                updater.abort();
                return self.fail(OtaError::SizeMismatch { expected, written });
            }
            Err(e) => {
                updater.abort();
                return self.fail(e);
            }
        }

        self.enter(UpdateStage::Verifying);
        if !updater.finalize() {
            updater.abort();
            return self.fail(OtaError::VerifyFailed);
        }

        self.enter(UpdateStage::Rebooting);
        info!("OTA: {} bytes flashed, restarting", expected);
        restart.restart(RestartReason::FirmwareUpdated);
        UpdateOutcome::Rebooted
    }

    fn enter(&mut self, stage: UpdateStage) {
        self.stage = stage;
        // Capacity covers the longest path; overflow would only drop history.
        let _ = self.history.push(stage);
    }

    fn fail(&mut self, err: OtaError) -> UpdateOutcome {
        warn!("OTA: failed in {:?}: {}", self.stage, err);
        self.enter(UpdateStage::Failed(err));
        self.enter(UpdateStage::Idle);
        UpdateOutcome::Failed(err)
    }
}

impl Default for UpdatePipeline {
    fn default() -> Self {
        Self::new()
    }
}
