//! BME280 temperature / humidity / pressure sensor on I2C.
//!
//! Runs in forced mode: every [`Bme280::measure`] triggers one conversion
//! at 1x oversampling, waits for it, and applies the Bosch integer
//! compensation from the factory trim registers.
//!
//! Generic over `embedded-hal` 1.0 [`I2c`] and [`DelayNs`], so the host
//! tests drive it with a register-map mock.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::error::SensorError;

pub const ADDR_PRIMARY: u8 = 0x76;
pub const ADDR_SECONDARY: u8 = 0x77;

const REG_CHIP_ID: u8 = 0xD0;
const CHIP_ID: u8 = 0x60;
const REG_CALIB_00: u8 = 0x88;
const REG_CALIB_H1: u8 = 0xA1;
const REG_CALIB_26: u8 = 0xE1;
const REG_CTRL_HUM: u8 = 0xF2;
const REG_STATUS: u8 = 0xF3;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_PRESS_MSB: u8 = 0xF7;

/// Humidity oversampling x1.
const CTRL_HUM_X1: u8 = 0x01;
/// Temperature x1, pressure x1, forced mode.
const CTRL_MEAS_FORCED: u8 = 0x25;
const STATUS_MEASURING: u8 = 0x08;
/// Upper bound for one forced conversion at x1 oversampling.
const CONVERSION_POLLS: u32 = 20;
const POLL_INTERVAL_MS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    pub pressure_pa: f32,
}

/// Factory trim values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calibration {
    pub t1: u16,
    pub t2: i16,
    pub t3: i16,
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
    pub h1: u8,
    pub h2: i16,
    pub h3: u8,
    pub h4: i16,
    pub h5: i16,
    pub h6: i8,
}

impl Calibration {
    /// Parse the 0x88..0xA0 block, the 0xA1 byte and the 0xE1..0xE7 block.
    pub fn parse(block1: &[u8; 24], h1: u8, block2: &[u8; 7]) -> Self {
        let le_u = |i: usize| u16::from_le_bytes([block1[i], block1[i + 1]]);
        let le_i = |i: usize| i16::from_le_bytes([block1[i], block1[i + 1]]);
        Self {
            t1: le_u(0),
            t2: le_i(2),
            t3: le_i(4),
            p1: le_u(6),
            p2: le_i(8),
            p3: le_i(10),
            p4: le_i(12),
            p5: le_i(14),
            p6: le_i(16),
            p7: le_i(18),
            p8: le_i(20),
            p9: le_i(22),
            h1,
            h2: i16::from_le_bytes([block2[0], block2[1]]),
            h3: block2[2],
            // H4 and H5 share the nibbles of 0xE5.
            h4: (i16::from(block2[3] as i8) << 4) | i16::from(block2[4] & 0x0F),
            h5: (i16::from(block2[5] as i8) << 4) | i16::from(block2[4] >> 4),
            h6: block2[6] as i8,
        }
    }

    /// Returns (°C × 100, t_fine).
    pub fn compensate_temperature(&self, adc_t: i32) -> (i32, i32) {
        let t1 = i32::from(self.t1);
        let var1 = (((adc_t >> 3) - (t1 << 1)) * i32::from(self.t2)) >> 11;
        let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * i32::from(self.t3)) >> 14;
        let t_fine = var1 + var2;
        ((t_fine * 5 + 128) >> 8, t_fine)
    }

    /// Pressure in Pa × 256 (Q24.8).
    pub fn compensate_pressure(&self, adc_p: i32, t_fine: i32) -> u32 {
        let mut var1 = i64::from(t_fine) - 128_000;
        let mut var2 = var1 * var1 * i64::from(self.p6);
        var2 += (var1 * i64::from(self.p5)) << 17;
        var2 += i64::from(self.p4) << 35;
        var1 = ((var1 * var1 * i64::from(self.p3)) >> 8) + ((var1 * i64::from(self.p2)) << 12);
        var1 = (((1i64 << 47) + var1) * i64::from(self.p1)) >> 33;
        if var1 == 0 {
            return 0;
        }
        let mut p = 1_048_576 - i64::from(adc_p);
        p = (((p << 31) - var2) * 3125) / var1;
        var1 = (i64::from(self.p9) * (p >> 13) * (p >> 13)) >> 25;
        var2 = (i64::from(self.p8) * p) >> 19;
        p = ((p + var1 + var2) >> 8) + (i64::from(self.p7) << 4);
        p.clamp(0, i64::from(u32::MAX)) as u32
    }

    /// Relative humidity in % × 1024 (Q22.10).
    pub fn compensate_humidity(&self, adc_h: i32, t_fine: i32) -> u32 {
        let v = i64::from(t_fine) - 76_800;
        let a = (((i64::from(adc_h) << 14)
            - (i64::from(self.h4) << 20)
            - (i64::from(self.h5) * v))
            + 16_384)
            >> 15;
        let b = ((((((v * i64::from(self.h6)) >> 10)
            * (((v * i64::from(self.h3)) >> 11) + 32_768))
            >> 10)
            + 2_097_152)
            * i64::from(self.h2)
            + 8192)
            >> 14;
        let mut x = a * b;
        x -= ((((x >> 15) * (x >> 15)) >> 7) * i64::from(self.h1)) >> 4;
        (x.clamp(0, 419_430_400) >> 12) as u32
    }

    pub fn compensate(&self, raw: &[u8; 8]) -> EnvReading {
        let adc_p = (i32::from(raw[0]) << 12) | (i32::from(raw[1]) << 4) | (i32::from(raw[2]) >> 4);
        let adc_t = (i32::from(raw[3]) << 12) | (i32::from(raw[4]) << 4) | (i32::from(raw[5]) >> 4);
        let adc_h = (i32::from(raw[6]) << 8) | i32::from(raw[7]);

        let (t_centi, t_fine) = self.compensate_temperature(adc_t);
        EnvReading {
            temperature_c: t_centi as f32 / 100.0,
            humidity_pct: self.compensate_humidity(adc_h, t_fine) as f32 / 1024.0,
            pressure_pa: self.compensate_pressure(adc_p, t_fine) as f32 / 256.0,
        }
    }
}

pub struct Bme280<I2C, D> {
    i2c: I2C,
    delay: D,
    addr: u8,
    calib: Calibration,
}

impl<I2C: I2c, D: DelayNs> Bme280<I2C, D> {
    /// Probe both addresses, read the trim registers and configure the
    /// oversampling.  Returns the bus back if no sensor answers.
    pub fn probe(mut i2c: I2C, delay: D) -> Result<Self, (SensorError, I2C)> {
        for addr in [ADDR_PRIMARY, ADDR_SECONDARY] {
            let mut id = [0u8];
            if i2c.write_read(addr, &[REG_CHIP_ID], &mut id).is_ok() && id[0] == CHIP_ID {
                info!("BME280: found at 0x{:02X}", addr);
                let mut dev = Self {
                    i2c,
                    delay,
                    addr,
                    calib: Calibration::default(),
                };
                return match dev.init() {
                    Ok(()) => Ok(dev),
                    Err(e) => Err((e, dev.i2c)),
                };
            }
        }
        warn!("BME280: not found on I2C bus");
        Err((SensorError::NotFound, i2c))
    }

    fn init(&mut self) -> Result<(), SensorError> {
        let mut block1 = [0u8; 24];
        let mut h1 = [0u8];
        let mut block2 = [0u8; 7];
        self.read_regs(REG_CALIB_00, &mut block1)?;
        self.read_regs(REG_CALIB_H1, &mut h1)?;
        self.read_regs(REG_CALIB_26, &mut block2)?;
        self.calib = Calibration::parse(&block1, h1[0], &block2);

        // ctrl_hum only latches on the next ctrl_meas write.
        self.write_reg(REG_CTRL_HUM, CTRL_HUM_X1)?;
        self.write_reg(REG_CONFIG, 0x00)?;
        Ok(())
    }

    /// Trigger one forced conversion and read the result.
    pub fn measure(&mut self) -> Result<EnvReading, SensorError> {
        self.write_reg(REG_CTRL_MEAS, CTRL_MEAS_FORCED)?;
        let mut polls = 0;
        loop {
            self.delay.delay_ms(POLL_INTERVAL_MS);
            let mut status = [0u8];
            self.read_regs(REG_STATUS, &mut status)?;
            if status[0] & STATUS_MEASURING == 0 {
                break;
            }
            polls += 1;
            if polls >= CONVERSION_POLLS {
                return Err(SensorError::Timeout);
            }
        }
        let mut raw = [0u8; 8];
        self.read_regs(REG_PRESS_MSB, &mut raw)?;
        Ok(self.calib.compensate(&raw))
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calib
    }

    fn read_regs(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        self.i2c
            .write_read(self.addr, &[reg], buf)
            .map_err(|_| SensorError::BusError)
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), SensorError> {
        self.i2c
            .write(self.addr, &[reg, value])
            .map_err(|_| SensorError::BusError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};

    /// Datasheet example trim values.
    fn datasheet() -> Calibration {
        Calibration {
            t1: 27504,
            t2: 26435,
            t3: -1000,
            p1: 36477,
            p2: -10685,
            p3: 3024,
            p4: 2855,
            p5: 140,
            p6: -7,
            p7: 15500,
            p8: -14600,
            p9: 6000,
            h1: 75,
            h2: 362,
            h3: 0,
            h4: 313,
            h5: 50,
            h6: 30,
        }
    }

    #[test]
    fn datasheet_temperature() {
        let (t, t_fine) = datasheet().compensate_temperature(519_888);
        assert_eq!(t, 2508);
        assert_eq!(t_fine, 128_422);
    }

    #[test]
    fn datasheet_pressure() {
        let p = datasheet().compensate_pressure(415_148, 128_422);
        assert_eq!(p, 25_767_233);
    }

    #[test]
    fn humidity_in_range() {
        let c = datasheet();
        let h = c.compensate_humidity(30_000, 128_422) as f32 / 1024.0;
        assert!((h - 55.0).abs() < 0.1, "{h}");
        assert_eq!(c.compensate_humidity(0, 128_422), 0);
    }

    #[test]
    fn parses_shared_nibbles() {
        let block1 = [0u8; 24];
        // H4 = 0x139 (313), H5 = 0x032 (50)
        let block2 = [0x6A, 0x01, 0x00, 0x13, 0x29, 0x03, 0x1E];
        let c = Calibration::parse(&block1, 75, &block2);
        assert_eq!(c.h2, 362);
        assert_eq!(c.h4, 313);
        assert_eq!(c.h5, 50);
        assert_eq!(c.h6, 30);
    }

    struct RegMap {
        regs: [u8; 256],
        present_at: u8,
    }

    impl ErrorType for RegMap {
        type Error = ErrorKind;
    }

    impl I2c for RegMap {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if address != self.present_at {
                return Err(ErrorKind::Other);
            }
            let mut ptr = 0usize;
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        ptr = bytes[0] as usize;
                        for (i, b) in bytes[1..].iter().enumerate() {
                            self.regs[ptr + i] = *b;
                        }
                    }
                    Operation::Read(buf) => {
                        for (i, b) in buf.iter_mut().enumerate() {
                            *b = self.regs[ptr + i];
                        }
                    }
                }
            }
            Ok(())
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn probe_finds_secondary_address() {
        let mut regs = [0u8; 256];
        regs[REG_CHIP_ID as usize] = CHIP_ID;
        let dev = Bme280::probe(
            RegMap {
                regs,
                present_at: ADDR_SECONDARY,
            },
            NoDelay,
        );
        assert!(dev.is_ok());
    }

    #[test]
    fn probe_reports_missing_sensor() {
        let bus = RegMap {
            regs: [0u8; 256],
            present_at: ADDR_PRIMARY,
        };
        assert!(matches!(
            Bme280::probe(bus, NoDelay),
            Err((SensorError::NotFound, _))
        ));
    }

    #[test]
    fn forced_measurement_reads_data_block() {
        let mut regs = [0u8; 256];
        regs[REG_CHIP_ID as usize] = CHIP_ID;
        let c = datasheet();
        let mut block1 = [0u8; 24];
        for (i, v) in [c.t1 as i16, c.t2, c.t3, c.p1 as i16, c.p2, c.p3, c.p4, c.p5, c.p6, c.p7, c.p8, c.p9]
            .iter()
            .enumerate()
        {
            block1[i * 2..i * 2 + 2].copy_from_slice(&v.to_le_bytes());
        }
        regs[0x88..0x88 + 24].copy_from_slice(&block1);
        // adc_p = 415148, adc_t = 519888, adc_h = 30000
        regs[0xF7..0xFF].copy_from_slice(&[0x65, 0x5A, 0xC0, 0x7E, 0xED, 0x00, 0x75, 0x30]);

        let mut dev = Bme280::probe(
            RegMap {
                regs,
                present_at: ADDR_PRIMARY,
            },
            NoDelay,
        )
        .ok()
        .unwrap();
        let r = dev.measure().unwrap();
        assert!((r.temperature_c - 25.08).abs() < 0.001);
        assert!((r.pressure_pa - 100_653.25).abs() < 0.01);
    }
}
