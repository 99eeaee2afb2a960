//! Mutable runtime state.
//!
//! Everything the main loop changes between ticks lives in one
//! [`DeviceState`] owned by the [`DeviceRuntime`](super::service::DeviceRuntime).
//! Nothing here is persisted; a reboot starts from [`DeviceState::new`].

use serde::Serialize;

use crate::calibration::DriftCalibrationDetector;
use crate::config::DeviceConfig;
use crate::ota::UpdatePipeline;
use crate::portal::PortalTracker;
use crate::scheduler::Scheduler;
use crate::status::{NETWORK_FAULT_POSITION, SENSOR_FAULT_POSITION};
use crate::watchdog::{ConnectivityState, ConnectivityWatchdog};

/// One measurement tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub ppm: f32,
    pub temperature_c: f32,
    /// Present only when the environment sensor is healthy.
    pub humidity_pct: Option<f32>,
    pub pressure_pa: Option<f32>,
    pub t_ms: u64,
}

impl SensorReading {
    pub fn co2_valid(&self) -> bool {
        self.ppm > 0.0
    }
}

/// Subsystems with a blinking fault indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Subsystem {
    Sensor,
    Network,
}

impl Subsystem {
    pub const fn indicator(self) -> usize {
        match self {
            Self::Sensor => SENSOR_FAULT_POSITION,
            Self::Network => NETWORK_FAULT_POSITION,
        }
    }
}

/// Fault flag plus the blink phase of its indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultIndicator {
    pub active: bool,
    pub phase_on: bool,
}

impl FaultIndicator {
    /// Update the fault flag.  Returns `true` on an edge.  A fresh fault
    /// starts in the lit phase.
    pub fn set(&mut self, active: bool) -> bool {
        if self.active == active {
            return false;
        }
        self.active = active;
        self.phase_on = active;
        true
    }

    /// Flip the blink phase of an active fault.
    pub fn toggle(&mut self) -> bool {
        if self.active {
            self.phase_on = !self.phase_on;
        }
        self.active
    }
}

pub struct DeviceState {
    pub scheduler: Scheduler,
    pub detector: DriftCalibrationDetector,
    pub pipeline: UpdatePipeline,
    pub watchdog: ConnectivityWatchdog,
    pub connectivity: ConnectivityState,
    pub portal: PortalTracker,
    pub sensor_fault: FaultIndicator,
    pub network_fault: FaultIndicator,
    pub last_reading: Option<SensorReading>,
    pub measurements: u32,
    pub calibrations_issued: u32,
    pub telemetry_failures: u32,
}

impl DeviceState {
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            scheduler: Scheduler::from_timing(&config.timing, config.capabilities.auto_update),
            detector: DriftCalibrationDetector::new(config.calibration),
            pipeline: UpdatePipeline::new(),
            watchdog: ConnectivityWatchdog::new(config.timing.watchdog_stale_ms),
            connectivity: ConnectivityState::default(),
            portal: PortalTracker::default(),
            sensor_fault: FaultIndicator::default(),
            network_fault: FaultIndicator::default(),
            last_reading: None,
            measurements: 0,
            calibrations_issued: 0,
            telemetry_failures: 0,
        }
    }

    pub fn fault(&self, subsystem: Subsystem) -> &FaultIndicator {
        match subsystem {
            Subsystem::Sensor => &self.sensor_fault,
            Subsystem::Network => &self.network_fault,
        }
    }

    pub fn fault_mut(&mut self, subsystem: Subsystem) -> &mut FaultIndicator {
        match subsystem {
            Subsystem::Sensor => &mut self.sensor_fault,
            Subsystem::Network => &mut self.network_fault,
        }
    }
}
