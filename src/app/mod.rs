//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the runtime rules of the CO2 Ampel: the ordered
//! main-loop tick, fault indication, telemetry point building and the
//! gating of calibration and updates by capability flags.  All
//! interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod events;
pub mod ports;
pub mod service;
pub mod state;
