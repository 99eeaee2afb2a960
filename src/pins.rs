//! GPIO / peripheral pin assignments for the CO2 Ampel board (ESP32 DevKit).
//!
//! Single source of truth; drivers reference this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// MH-Z19B CO2 sensor (UART2, 9600 8N1)
// ---------------------------------------------------------------------------

pub const MHZ19_RX_GPIO: i32 = 16;
pub const MHZ19_TX_GPIO: i32 = 17;
/// Native to the sensor.
pub const MHZ19_BAUD: u32 = 9_600;

// ---------------------------------------------------------------------------
// BME280 (I2C0, default ESP32 Wire pins)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
pub const I2C_FREQ_HZ: u32 = 100_000;

// ---------------------------------------------------------------------------
// WS2811 status strip (RMT channel 0)
// ---------------------------------------------------------------------------

pub const LED_DATA_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// Setup-portal button (BOOT, active-low with pull-up)
// ---------------------------------------------------------------------------

pub const PORTAL_BUTTON_GPIO: i32 = 0;
