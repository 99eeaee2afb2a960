//! Measurement → LED tier mapping.
//!
//! Pure lookup tables.  CO2 drives three indicators, temperature four.
//! Bands are half-open and matched in ascending order with strict `<`, so a
//! value sitting exactly on a boundary belongs to the higher band.
//!
//! ```text
//!  strip position   0   1   2   3   4   5   6   7
//!                  └── temperature ─┘  │  └ CO2 ─┘
//!                                   status
//! ```

use serde::{Deserialize, Serialize};

/// Number of pixels on the strip.
pub const STRIP_LEN: usize = 8;
/// First strip position of the temperature indicators.
pub const TEMPERATURE_BASE: usize = 0;
/// First strip position of the CO2 indicators.
pub const CO2_BASE: usize = 5;
/// Indicator that blinks on a sensor fault.
pub const SENSOR_FAULT_POSITION: usize = 2;
/// Indicator that blinks on a network fault.
pub const NETWORK_FAULT_POSITION: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorFamily {
    Green,
    Yellow,
    Orange,
    Red,
    Blue,
    Cyan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Low,
    Mid,
    High,
}

/// What one indicator shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedTier {
    Off,
    Lit(ColorFamily, Level),
}

/// RGB triple as sent to the strip driver.
pub type Rgb = (u8, u8, u8);

impl LedTier {
    /// Fixed RGB value for this tier.
    pub const fn rgb(self) -> Rgb {
        use ColorFamily::{Blue, Cyan, Green, Orange, Red, Yellow};
        use Level::{High, Low, Mid};
        match self {
            Self::Off => (0, 0, 0),
            Self::Lit(Green, Low) => (0, 20, 0),
            Self::Lit(Green, Mid) => (0, 40, 0),
            Self::Lit(Green, High) => (0, 80, 0),
            Self::Lit(Yellow, Low) => (40, 32, 0),
            Self::Lit(Yellow, Mid) => (80, 64, 0),
            Self::Lit(Yellow, High) => (120, 96, 0),
            Self::Lit(Orange, Low) => (64, 16, 0),
            Self::Lit(Orange, Mid) => (128, 32, 0),
            Self::Lit(Orange, High) => (255, 64, 0),
            Self::Lit(Red, Low) => (64, 0, 0),
            Self::Lit(Red, Mid) => (128, 0, 0),
            Self::Lit(Red, High) => (255, 0, 0),
            Self::Lit(Blue, Low) => (0, 0, 40),
            Self::Lit(Blue, Mid) => (0, 0, 80),
            Self::Lit(Blue, High) => (0, 0, 160),
            Self::Lit(Cyan, Low) => (0, 20, 40),
            Self::Lit(Cyan, Mid) => (0, 40, 80),
            Self::Lit(Cyan, High) => (0, 80, 160),
        }
    }

    pub const fn is_lit(self) -> bool {
        matches!(self, Self::Lit(..))
    }
}

const OFF: LedTier = LedTier::Off;
const fn lit(c: ColorFamily, l: Level) -> LedTier {
    LedTier::Lit(c, l)
}

const YL: LedTier = lit(ColorFamily::Yellow, Level::Low);
const YM: LedTier = lit(ColorFamily::Yellow, Level::Mid);
const YH: LedTier = lit(ColorFamily::Yellow, Level::High);
const OL: LedTier = lit(ColorFamily::Orange, Level::Low);
const OM: LedTier = lit(ColorFamily::Orange, Level::Mid);
const OH: LedTier = lit(ColorFamily::Orange, Level::High);
const RL: LedTier = lit(ColorFamily::Red, Level::Low);
const RM: LedTier = lit(ColorFamily::Red, Level::Mid);
const RH: LedTier = lit(ColorFamily::Red, Level::High);
const BL: LedTier = lit(ColorFamily::Blue, Level::Low);
const BH: LedTier = lit(ColorFamily::Blue, Level::High);
const CL: LedTier = lit(ColorFamily::Cyan, Level::Low);
const CM: LedTier = lit(ColorFamily::Cyan, Level::Mid);
const CH: LedTier = lit(ColorFamily::Cyan, Level::High);
const GL: LedTier = lit(ColorFamily::Green, Level::Low);

/// `(upper bound, indicators)`; the last row catches everything else.
const CO2_BANDS: [(f32, [LedTier; 3]); 12] = [
    (800.0, [OFF, OFF, OFF]),
    (1000.0, [YL, OFF, OFF]),
    (1200.0, [YM, OFF, OFF]),
    (1400.0, [YH, OFF, OFF]),
    (1600.0, [YH, OL, OFF]),
    (1800.0, [YH, OM, OFF]),
    (2000.0, [YH, OH, OFF]),
    (2200.0, [YH, OH, RL]),
    (2400.0, [YH, OH, RM]),
    (2600.0, [YH, OH, RH]),
    (2800.0, [YH, RH, RH]),
    (3000.0, [OH, RH, RH]),
];
const CO2_MAX: [LedTier; 3] = [RH, RH, RH];

const TEMPERATURE_BANDS: [(f32, [LedTier; 4]); 9] = [
    (17.0, [BH, CH, GL, OFF]),
    (18.0, [BL, CH, GL, OFF]),
    (19.0, [OFF, CH, GL, OFF]),
    (20.0, [OFF, CM, GL, OFF]),
    (21.0, [OFF, CL, GL, OFF]),
    (25.0, [OFF, OFF, GL, OFF]),
    (26.0, [OFF, OFF, GL, RL]),
    (27.0, [OFF, OFF, GL, RM]),
    (60.0, [OFF, OFF, GL, RH]),
];

/// Indicator tiers for a CO2 concentration in ppm.
///
/// NaN falls through every band and maps to the maximum tier.
pub fn classify_co2(ppm: f32) -> [LedTier; 3] {
    CO2_BANDS
        .iter()
        .find(|(upper, _)| ppm < *upper)
        .map_or(CO2_MAX, |(_, tiers)| *tiers)
}

/// Indicator tiers for a temperature in °C, or `None` when the value is at
/// or above 60 °C (or NaN) and the current indicators should be kept.
pub fn classify_temperature(temp_c: f32) -> Option<[LedTier; 4]> {
    TEMPERATURE_BANDS
        .iter()
        .find(|(upper, _)| temp_c < *upper)
        .map(|(_, tiers)| *tiers)
}

/// Strip contents right after boot: status and centre temperature pixel
/// green, everything else dark.
pub fn boot_frame() -> [LedTier; STRIP_LEN] {
    let mut frame = [LedTier::Off; STRIP_LEN];
    frame[SENSOR_FAULT_POSITION] = GL;
    frame[NETWORK_FAULT_POSITION] = GL;
    frame
}

/// Tier shown by a fault indicator in the given blink phase.
pub const fn fault_tier(phase_on: bool) -> LedTier {
    if phase_on { RH } else { OFF }
}

/// Tier a fault indicator returns to once the fault clears.
pub const HEALTHY_TIER: LedTier = GL;
