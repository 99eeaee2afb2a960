//! WS2811 status strip (8 pixels, GRB wire order).
//!
//! On ESP-IDF: each commit is encoded into RMT pulses and sent blocking.
//! On host/test: the wire buffer is kept in memory and frames are counted.

use crate::status::{Rgb, STRIP_LEN};

pub const BYTES_PER_PIXEL: usize = 3;
pub const FRAME_BYTES: usize = STRIP_LEN * BYTES_PER_PIXEL;

/// Reorder RGB pixels into the strip's GRB byte stream.
pub fn encode_grb(pixels: &[Rgb; STRIP_LEN]) -> [u8; FRAME_BYTES] {
    let mut out = [0u8; FRAME_BYTES];
    for (chunk, &(r, g, b)) in out.chunks_exact_mut(BYTES_PER_PIXEL).zip(pixels) {
        chunk.copy_from_slice(&[g, r, b]);
    }
    out
}

// ── Bit timing (RMT clock 80 MHz / 2 = 25 ns per tick) ───────

#[cfg(target_os = "espidf")]
const RMT_CLOCK_DIVIDER: u8 = 2;
/// (high, low) ticks for a 0 bit: 0.4 µs / 0.85 µs.
pub const T0: (u16, u16) = (16, 34);
/// (high, low) ticks for a 1 bit: 0.8 µs / 0.45 µs.
pub const T1: (u16, u16) = (32, 18);

pub const fn bit_timing(bit: bool) -> (u16, u16) {
    if bit { T1 } else { T0 }
}

pub struct LedStrip {
    pixels: [Rgb; STRIP_LEN],
    frames_sent: u32,
    #[cfg(target_os = "espidf")]
    tx: esp_idf_hal::rmt::TxRmtDriver<'static>,
    #[cfg(not(target_os = "espidf"))]
    last_frame: [u8; FRAME_BYTES],
}

#[cfg(target_os = "espidf")]
impl LedStrip {
    pub fn new<C, P>(
        channel: impl esp_idf_hal::peripheral::Peripheral<P = C> + 'static,
        pin: impl esp_idf_hal::peripheral::Peripheral<P = P> + 'static,
    ) -> anyhow::Result<Self>
    where
        C: esp_idf_hal::rmt::RmtChannel,
        P: esp_idf_hal::gpio::OutputPin,
    {
        use anyhow::Context;
        use esp_idf_hal::rmt::PinState;
        use esp_idf_hal::rmt::config::TransmitConfig;

        let config = TransmitConfig::new()
            .clock_divider(RMT_CLOCK_DIVIDER)
            .idle(Some(PinState::Low));
        let tx = esp_idf_hal::rmt::TxRmtDriver::new(channel, pin, &config)
            .context("failed to init RMT LED driver")?;
        Ok(Self {
            pixels: [(0, 0, 0); STRIP_LEN],
            frames_sent: 0,
            tx,
        })
    }

    fn transmit(&mut self, frame: &[u8; FRAME_BYTES]) -> anyhow::Result<()> {
        use anyhow::Context;
        use esp_idf_hal::rmt::PinState;
        use esp_idf_hal::rmt::{Pulse, PulseTicks, VariableLengthSignal};

        let mut signal = VariableLengthSignal::with_capacity(FRAME_BYTES * 8 * 2);
        for byte in frame {
            for i in (0..8).rev() {
                let (high, low) = bit_timing(byte & (1 << i) != 0);
                let hi = Pulse::new(PinState::High, PulseTicks::new(high).context("bad pulse")?);
                let lo = Pulse::new(PinState::Low, PulseTicks::new(low).context("bad pulse")?);
                signal.push([&hi, &lo]).context("RMT signal overflow")?;
            }
        }
        self.tx
            .start_blocking(&signal)
            .context("failed to transmit LED frame over RMT")?;
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl LedStrip {
    pub fn new() -> Self {
        Self {
            pixels: [(0, 0, 0); STRIP_LEN],
            frames_sent: 0,
            last_frame: [0; FRAME_BYTES],
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    fn transmit(&mut self, frame: &[u8; FRAME_BYTES]) -> anyhow::Result<()> {
        self.last_frame = *frame;
        Ok(())
    }

    /// Wire bytes of the last committed frame.
    pub fn last_frame(&self) -> &[u8; FRAME_BYTES] {
        &self.last_frame
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for LedStrip {
    fn default() -> Self {
        Self::new()
    }
}

impl LedStrip {
    /// Set one pixel in the buffer.  Out-of-range positions are ignored.
    pub fn set(&mut self, position: usize, rgb: Rgb) {
        if let Some(p) = self.pixels.get_mut(position) {
            *p = rgb;
        }
    }

    pub fn pixel(&self, position: usize) -> Option<Rgb> {
        self.pixels.get(position).copied()
    }

    /// Push the buffer to the strip.
    pub fn show(&mut self) {
        let frame = encode_grb(&self.pixels);
        match self.transmit(&frame) {
            Ok(()) => self.frames_sent = self.frames_sent.wrapping_add(1),
            Err(e) => log::warn!("LedStrip: {:#}", e),
        }
    }

    pub fn clear(&mut self) {
        self.pixels = [(0, 0, 0); STRIP_LEN];
    }

    pub fn frames_sent(&self) -> u32 {
        self.frames_sent
    }
}
