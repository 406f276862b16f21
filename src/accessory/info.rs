//! Static accessory information.

/// Descriptive metadata published on the AccessoryInformation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub serial_number: &'static str,
}

pub const ACCESSORY_INFO: AccessoryInfo = AccessoryInfo {
    manufacturer: "Navision.guru",
    model: "Switch2Sensor",
    serial_number: "2021-04-11",
};
