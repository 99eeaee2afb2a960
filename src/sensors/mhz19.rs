//! MH-Z19B NDIR CO2 sensor on UART2 (9600 8N1).
//!
//! Every exchange is one 9-byte command frame and, for reads, one 9-byte
//! response:
//!
//! ```text
//!  command   FF 01 cmd b3 b4 b5 b6 b7 ck
//!  response  FF cmd d2 d3 d4 d5 d6 d7 ck
//!  ck = 0xFF - (b1 + … + b7) + 1   (wrapping)
//! ```
//!
//! The codec is pure and host-testable; [`Mhz19`] drives it over any
//! [`SerialLink`].

use log::{info, warn};

use crate::error::SensorError;

pub const FRAME_LEN: usize = 9;

const START: u8 = 0xFF;
const SENSOR_ID: u8 = 0x01;

pub const CMD_READ_CO2: u8 = 0x86;
pub const CMD_ZERO_POINT: u8 = 0x87;
pub const CMD_SET_RANGE: u8 = 0x99;

/// Detection range configured at boot.
pub const RANGE_PPM: u32 = 5000;
/// Offset of the temperature byte in a read response.
const TEMPERATURE_OFFSET: i16 = 40;

pub type Frame = [u8; FRAME_LEN];

pub fn checksum(frame: &Frame) -> u8 {
    let sum = frame[1..8].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0xFFu8.wrapping_sub(sum).wrapping_add(1)
}

/// Build a command frame with `payload` in bytes 3..8.
pub fn encode(cmd: u8, payload: [u8; 5]) -> Frame {
    let mut frame = [START, SENSOR_ID, cmd, 0, 0, 0, 0, 0, 0];
    frame[3..8].copy_from_slice(&payload);
    frame[8] = checksum(&frame);
    frame
}

pub fn read_co2_command() -> Frame {
    encode(CMD_READ_CO2, [0; 5])
}

pub fn zero_point_command() -> Frame {
    encode(CMD_ZERO_POINT, [0; 5])
}

pub fn set_range_command(range_ppm: u32) -> Frame {
    let r = range_ppm.to_be_bytes();
    encode(CMD_SET_RANGE, [0, r[0], r[1], r[2], r[3]])
}

/// Decoded answer to [`CMD_READ_CO2`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Co2Response {
    pub ppm: u16,
    /// Internal thermistor, whole degrees Celsius.
    pub temperature_c: i16,
}

/// Validate a response frame for `cmd`.
pub fn decode(frame: &Frame, cmd: u8) -> Result<&Frame, SensorError> {
    if frame[0] != START || frame[1] != cmd {
        return Err(SensorError::UnexpectedResponse);
    }
    if checksum(frame) != frame[8] {
        return Err(SensorError::BadChecksum);
    }
    Ok(frame)
}

pub fn decode_co2(frame: &Frame) -> Result<Co2Response, SensorError> {
    let f = decode(frame, CMD_READ_CO2)?;
    Ok(Co2Response {
        ppm: u16::from_be_bytes([f[2], f[3]]),
        temperature_c: i16::from(f[4]) - TEMPERATURE_OFFSET,
    })
}

// ── Driver ────────────────────────────────────────────────────

/// Byte transport to the sensor.
pub trait SerialLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SensorError>;

    /// Fill `buf` completely or fail with [`SensorError::Timeout`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SensorError>;

    /// Drop stale bytes left in the receive buffer.
    fn clear_input(&mut self) {}
}

pub struct Mhz19<L: SerialLink> {
    link: L,
    last: Option<Co2Response>,
    healthy: bool,
}

impl<L: SerialLink> Mhz19<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            last: None,
            healthy: false,
        }
    }

    /// Configure the detection range.  The sensor does not answer.
    pub fn begin(&mut self) -> Result<(), SensorError> {
        self.link.write_all(&set_range_command(RANGE_PPM))?;
        info!("MH-Z19: range set to {} ppm", RANGE_PPM);
        Ok(())
    }

    pub fn read(&mut self) -> Result<Co2Response, SensorError> {
        self.link.clear_input();
        let result = self.exchange();
        self.healthy = result.is_ok();
        match result {
            Ok(r) => {
                self.last = Some(r);
                Ok(r)
            }
            Err(e) => {
                warn!("MH-Z19: read failed: {}", e);
                Err(e)
            }
        }
    }

    fn exchange(&mut self) -> Result<Co2Response, SensorError> {
        self.link.write_all(&read_co2_command())?;
        let mut frame = [0u8; FRAME_LEN];
        self.link.read_exact(&mut frame)?;
        decode_co2(&frame)
    }

    /// Declare the current air to be 400 ppm.
    pub fn calibrate_zero_point(&mut self) -> Result<(), SensorError> {
        self.link.write_all(&zero_point_command())
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Temperature from the last successful read.
    pub fn last_temperature(&self) -> Option<i16> {
        self.last.map(|r| r.temperature_c)
    }
}

// ── ESP-IDF UART link ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct UartLink {
    uart: esp_idf_hal::uart::UartDriver<'static>,
}

#[cfg(target_os = "espidf")]
impl UartLink {
    const TIMEOUT_MS: u32 = 1_000;

    pub fn new(uart: esp_idf_hal::uart::UartDriver<'static>) -> Self {
        Self { uart }
    }
}

#[cfg(target_os = "espidf")]
impl SerialLink for UartLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        let mut sent = 0;
        while sent < bytes.len() {
            sent += self
                .uart
                .write(&bytes[sent..])
                .map_err(|_| SensorError::Timeout)?;
        }
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SensorError> {
        let ticks = esp_idf_hal::delay::TickType::new_millis(u64::from(Self::TIMEOUT_MS)).ticks();
        let mut got = 0;
        while got < buf.len() {
            let n = self
                .uart
                .read(&mut buf[got..], ticks)
                .map_err(|_| SensorError::Timeout)?;
            if n == 0 {
                return Err(SensorError::Timeout);
            }
            got += n;
        }
        Ok(())
    }

    fn clear_input(&mut self) {
        let _ = self.uart.clear_rx();
    }
}
