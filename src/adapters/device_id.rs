//! Device identity derived from the ESP32 factory MAC address.
//!
//! The MAC is reported verbatim by `GET_DEVICE`. On the host a fixed
//! address stands in so discovery replies are deterministic in tests.

use crate::link::DeviceInfo;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

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

/// Identity reported to the companion: `name` plus this chip's MAC.
pub fn device_info(name: &str) -> DeviceInfo {
    DeviceInfo::new(name, read_mac())
}
