//! Outbound application events.
//!
//! The [`DeviceRuntime`](super::service::DeviceRuntime) emits these through
//! the [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, update the BLE
//! characteristic, record them in a test.

use crate::calibration::CalibrationRule;
use crate::error::Error;
use crate::ota::UpdateOutcome;

use super::state::{SensorReading, Subsystem};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The runtime has started and shows the boot frame.
    Started { version: &'static str },

    /// A measurement tick completed.
    Measurement(SensorReading),

    /// A zero-point calibration was sent to the sensor.
    CalibrationIssued { rule: CalibrationRule, ok: bool },

    /// A subsystem fault was raised or cleared.
    FaultChanged { subsystem: Subsystem, active: bool },

    /// The setup portal was started or stopped.
    PortalChanged { running: bool },

    /// A scheduled update check finished.
    UpdateFinished(UpdateOutcome),

    /// The connectivity watchdog requested a restart.
    WatchdogFired,

    /// A recoverable failure.
    Error(Error),
}
