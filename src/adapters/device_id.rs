//! Device identity derived from the ESP32 factory MAC address.
//!
//! The chip id packs the last three MAC bytes into a decimal number
//! (`mac[5] | mac[4] << 8 | mac[3] << 16`).  It is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - Part of the device name `CO2 Ampel <chip id>`, used as telemetry tag,
//!   BLE name, portal SSID and WiFi hostname
//! - Part of the portal password `pass<chip id>`

use core::fmt::Write;

/// Device name, e.g. `CO2 Ampel 13302526` (at most 18 chars).
pub type DeviceName = heapless::String<32>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

pub const NAME_PREFIX: &str = "CO2 Ampel ";

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn chip_id(mac: &MacAddress) -> u32 {
    u32::from(mac[5]) | u32::from(mac[4]) << 8 | u32::from(mac[3]) << 16
}

/// `CO2 Ampel <chip id>`.
pub fn device_name(mac: &MacAddress) -> DeviceName {
    let mut name = DeviceName::new();
    let _ = write!(name, "{}{}", NAME_PREFIX, chip_id(mac));
    name
}

/// Password of the setup portal's access point.
pub fn portal_password(mac: &MacAddress) -> heapless::String<16> {
    let mut pass = heapless::String::<16>::new();
    let _ = write!(pass, "pass{}", chip_id(mac));
    pass
}
