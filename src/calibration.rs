//! Long-term drift detection for the CO2 sensor.
//!
//! NDIR sensors drift downwards over months.  The detector keeps the last
//! [`SAMPLE_WINDOW_LEN`] accepted readings and decides, after each one,
//! whether a zero-point calibration should be issued.
//!
//! Two independent triggers:
//!
//! * **Clean air**: nothing above 400 ppm for `clean_air_ms`.  Outdoor air
//!   never reads that low, so the baseline has sagged.
//! * **Drift**: every short-interval delta has been falling for a whole
//!   window, the window as a whole fell by more than `window_drift_ppm`,
//!   and the room has not been aired (below 500 ppm) for `no_fresh_air_ms`.

use log::{debug, info};

use crate::config::{CalibrationThresholds, SAMPLE_WINDOW_LEN};

/// Readings at or below this count are subject to the warm-up guard.
const WARMUP_READINGS: u32 = 4;
/// Maximum plausible ppm while the sensor is still warming up.
const WARMUP_MAX_PPM: f32 = 1400.0;
const CLEAN_AIR_PPM: f32 = 400.0;
const FRESH_AIR_PPM: f32 = 500.0;
/// Distance, in samples, of the short-interval delta.
const SHORT_SPAN: usize = SAMPLE_WINDOW_LEN / 5;

// ── Sample window ─────────────────────────────────────────────

/// Fixed ring of the most recent accepted ppm values.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    buf: [f32; SAMPLE_WINDOW_LEN],
    cursor: usize,
    read_count: u32,
}

impl SampleWindow {
    pub const fn new() -> Self {
        Self {
            buf: [0.0; SAMPLE_WINDOW_LEN],
            cursor: 0,
            read_count: 0,
        }
    }

    /// Accepted readings since boot (saturating).
    pub fn read_count(&self) -> u32 {
        self.read_count
    }

    pub fn is_full(&self) -> bool {
        self.read_count as usize >= SAMPLE_WINDOW_LEN
    }

    /// Store `ppm` and return the slot it was written to.
    fn push(&mut self, ppm: f32) -> usize {
        let slot = self.cursor;
        self.buf[slot] = ppm;
        self.read_count = self.read_count.saturating_add(1);
        self.cursor = (slot + 1) % SAMPLE_WINDOW_LEN;
        slot
    }

    /// Value `back` samples before `slot`.
    fn behind(&self, slot: usize, back: usize) -> f32 {
        self.buf[(slot + SAMPLE_WINDOW_LEN - back % SAMPLE_WINDOW_LEN) % SAMPLE_WINDOW_LEN]
    }

    /// Newest minus oldest, once the window is full.
    fn window_delta(&self, newest: usize) -> Option<f32> {
        self.is_full()
            .then(|| self.buf[newest] - self.buf[(newest + 1) % SAMPLE_WINDOW_LEN])
    }

    /// Newest minus the reading [`SHORT_SPAN`] samples earlier.
    fn short_delta(&self, newest: usize) -> Option<f32> {
        (self.read_count as usize > SHORT_SPAN)
            .then(|| self.buf[newest] - self.behind(newest, SHORT_SPAN))
    }

    /// Most recently stored value.
    pub fn latest(&self) -> Option<f32> {
        (self.read_count > 0).then(|| self.behind(self.cursor, 1))
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

// ── Detector ──────────────────────────────────────────────────

/// Timestamps and streak counter updated on every accepted reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalibrationState {
    pub last_time_above_400_ms: u64,
    pub last_time_below_500_ms: u64,
    pub below_drift_streak: u32,
}

/// Which trigger asked for calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationRule {
    CleanAir,
    Drift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationDecision {
    None,
    CalibrateNow(CalibrationRule),
}

impl CalibrationDecision {
    pub fn is_calibrate(self) -> bool {
        matches!(self, Self::CalibrateNow(_))
    }
}

/// Outcome of feeding one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Dropped by the warm-up or validity guard; nothing was recorded.
    Discarded,
    Accepted(CalibrationDecision),
}

impl Acceptance {
    pub fn decision(self) -> CalibrationDecision {
        match self {
            Self::Discarded => CalibrationDecision::None,
            Self::Accepted(d) => d,
        }
    }
}

pub struct DriftCalibrationDetector {
    window: SampleWindow,
    state: CalibrationState,
    thresholds: CalibrationThresholds,
}

impl DriftCalibrationDetector {
    pub fn new(thresholds: CalibrationThresholds) -> Self {
        Self {
            window: SampleWindow::new(),
            state: CalibrationState::default(),
            thresholds,
        }
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Feed one CO2 reading taken at `now_ms`.
    pub fn accept(&mut self, ppm: f32, now_ms: u64) -> Acceptance {
        if ppm.is_nan() || ppm <= 0.0 {
            debug!("Calibration: discarding invalid reading {}", ppm);
            return Acceptance::Discarded;
        }
        if self.window.read_count() <= WARMUP_READINGS && ppm > WARMUP_MAX_PPM {
            debug!(
                "Calibration: discarding warm-up reading {} (#{})",
                ppm,
                self.window.read_count() + 1
            );
            return Acceptance::Discarded;
        }

        let slot = self.window.push(ppm);

        if ppm > CLEAN_AIR_PPM {
            self.state.last_time_above_400_ms = now_ms;
        }
        if ppm < FRESH_AIR_PPM {
            self.state.last_time_below_500_ms = now_ms;
        }

        let t = &self.thresholds;

        if let Some(s1) = self.window.short_delta(slot) {
            if s1 < t.short_drift_ppm {
                self.state.below_drift_streak = self.state.below_drift_streak.saturating_add(1);
            } else {
                self.state.below_drift_streak = 0;
            }
        }

        let clean_air =
            now_ms.saturating_sub(self.state.last_time_above_400_ms) > t.clean_air_ms;

        let drift = self.window.window_delta(slot).is_some_and(|ss| {
            self.state.below_drift_streak >= t.drift_streak
                && ss < t.window_drift_ppm
                && now_ms.saturating_sub(self.state.last_time_below_500_ms) > t.no_fresh_air_ms
        });

        let decision = if clean_air {
            info!("Calibration: no reading above 400 ppm for {} ms", t.clean_air_ms);
            CalibrationDecision::CalibrateNow(CalibrationRule::CleanAir)
        } else if drift {
            info!(
                "Calibration: downward drift for {} readings",
                self.state.below_drift_streak
            );
            CalibrationDecision::CalibrateNow(CalibrationRule::Drift)
        } else {
            CalibrationDecision::None
        };
        Acceptance::Accepted(decision)
    }
}
