//! Hardware adapter: bridges the sensor drivers and the LED strip to the
//! domain port traits.
//!
//! Owns the MH-Z19 driver, the optional BME280 and the [`LedStrip`],
//! exposing them through [`SensorPort`] and [`DisplayPort`].  On
//! non-espidf targets the strip uses its in-memory backend and the sensors
//! run over whatever link/bus the caller hands in.

use crate::app::ports::{DisplayPort, SensorPort};
use crate::drivers::led_strip::LedStrip;
use crate::error::SensorError;
use crate::sensors::bme280::{Bme280, EnvReading};
use crate::sensors::mhz19::{Mhz19, SerialLink};
use crate::status::LedTier;

/// Anything that can take one temperature / humidity / pressure sample.
pub trait EnvironmentSensor {
    fn measure(&mut self) -> Result<EnvReading, SensorError>;
}

impl<I2C, D> EnvironmentSensor for Bme280<I2C, D>
where
    I2C: embedded_hal::i2c::I2c,
    D: embedded_hal::delay::DelayNs,
{
    fn measure(&mut self) -> Result<EnvReading, SensorError> {
        Bme280::measure(self)
    }
}

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter<L: SerialLink, E: EnvironmentSensor> {
    co2: Mhz19<L>,
    env: Option<E>,
    /// Sample from the last successful environment measurement this cycle.
    env_sample: Option<EnvReading>,
    strip: LedStrip,
}

impl<L: SerialLink, E: EnvironmentSensor> HardwareAdapter<L, E> {
    /// `env` is `None` when the BME280 did not answer at boot.
    pub fn new(co2: Mhz19<L>, env: Option<E>, strip: LedStrip) -> Self {
        Self {
            co2,
            env,
            env_sample: None,
            strip,
        }
    }

    pub fn strip(&self) -> &LedStrip {
        &self.strip
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl<L: SerialLink, E: EnvironmentSensor> SensorPort for HardwareAdapter<L, E> {
    fn read_co2(&mut self) -> f32 {
        self.co2.read().map_or(0.0, |r| f32::from(r.ppm))
    }

    fn read_temperature(&mut self) -> f32 {
        // One forced conversion per cycle; humidity and pressure reuse it.
        self.env_sample = match self.env.as_mut().map(EnvironmentSensor::measure) {
            Some(Ok(sample)) => Some(sample),
            Some(Err(e)) => {
                log::warn!("BME280: measurement failed: {}", e);
                None
            }
            None => None,
        };
        match (self.env_sample, self.co2.last_temperature()) {
            (Some(sample), _) => sample.temperature_c,
            (None, Some(t)) => f32::from(t),
            (None, None) => f32::NAN,
        }
    }

    fn read_humidity(&mut self) -> f32 {
        self.env_sample.map_or(f32::NAN, |s| s.humidity_pct)
    }

    fn read_pressure(&mut self) -> f32 {
        self.env_sample.map_or(f32::NAN, |s| s.pressure_pa)
    }

    fn is_healthy(&self) -> bool {
        self.co2.is_healthy()
    }

    fn environment_ok(&self) -> bool {
        self.env_sample.is_some()
    }

    fn calibrate_zero_point(&mut self) -> Result<(), SensorError> {
        self.co2.calibrate_zero_point()
    }
}

// ── DisplayPort implementation ────────────────────────────────

impl<L: SerialLink, E: EnvironmentSensor> DisplayPort for HardwareAdapter<L, E> {
    fn set_indicator(&mut self, position: usize, tier: LedTier) {
        self.strip.set(position, tier.rgb());
    }

    fn commit(&mut self) {
        self.strip.show();
    }
}
