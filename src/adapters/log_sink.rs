//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::ota::UpdateOutcome;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { version } => {
                info!("START | version={}", version);
            }
            AppEvent::Measurement(r) => match (r.humidity_pct, r.pressure_pa) {
                (Some(h), Some(p)) => info!(
                    "MEAS  | CO2={:.0}ppm | T={:.1}\u{00b0}C | RH={:.1}% | p={:.0}Pa | t={}ms",
                    r.ppm, r.temperature_c, h, p, r.t_ms,
                ),
                _ => info!(
                    "MEAS  | CO2={:.0}ppm | T={:.1}\u{00b0}C | t={}ms",
                    r.ppm, r.temperature_c, r.t_ms,
                ),
            },
            AppEvent::CalibrationIssued { rule, ok } => {
                info!("CALIB | rule={:?} | ok={}", rule, ok);
            }
            AppEvent::FaultChanged { subsystem, active } => {
                if *active {
                    warn!("FAULT | {:?} raised", subsystem);
                } else {
                    info!("FAULT | {:?} cleared", subsystem);
                }
            }
            AppEvent::PortalChanged { running } => {
                info!("PORTAL| running={}", running);
            }
            AppEvent::UpdateFinished(outcome) => match outcome {
                UpdateOutcome::Failed(e) => warn!("OTA   | failed: {}", e),
                other => info!("OTA   | {:?}", other),
            },
            AppEvent::WatchdogFired => {
                error!("WDOG  | connectivity stuck, restarting");
            }
            AppEvent::Error(e) => {
                if e.is_fatal() {
                    error!("ERROR | {}", e);
                } else {
                    warn!("ERROR | {}", e);
                }
            }
        }
    }
}
