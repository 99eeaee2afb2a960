//! CO2 Ampel firmware library.
//!
//! Exposes the pure-logic modules for integration testing and the
//! adapters the device binary wires together.  All ESP-IDF-specific code
//! is guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod calibration;
pub mod config;
pub mod error;
pub mod ota;
pub mod portal;
pub mod scheduler;
pub mod status;
pub mod version;
pub mod watchdog;

pub mod pins;

pub mod adapters;
pub mod drivers;
pub mod sensors;
