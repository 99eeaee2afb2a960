//! Sensor drivers.
//!
//! - [`mhz19`]: NDIR CO2 over UART, the primary measurement.
//! - [`bme280`]: temperature, humidity and pressure over I2C.  Optional;
//!   the firmware runs on the MH-Z19 thermistor when it is absent.

pub mod bme280;
pub mod mhz19;
