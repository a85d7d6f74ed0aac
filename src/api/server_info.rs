use super::DeviceType;
use serde::{Deserialize, Serialize};

/// One entry of the `/management/v1/configureddevices` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfiguredDevice {
    /// Device name.
    #[serde(rename = "DeviceName")]
    pub name: String,
    /// Device category.
    #[serde(rename = "DeviceType")]
    pub ty: DeviceType,
    /// Index of the device within its category.
    #[serde(rename = "DeviceNumber")]
    pub number: usize,
    /// Stable identifier of the physical device.
    #[serde(rename = "UniqueID")]
    pub unique_id: String,
}

/// General information about the server, served from `/management/v1/description`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInfo {
    /// Server name.
    pub server_name: String,
    /// Manufacturer name.
    pub manufacturer: String,
    /// Manufacturer version.
    pub manufacturer_version: String,
    /// Server location.
    pub location: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            server_name: env!("CARGO_PKG_NAME").to_owned(),
            manufacturer: env!("CARGO_PKG_AUTHORS").to_owned(),
            manufacturer_version: env!("CARGO_PKG_VERSION").to_owned(),
            location: "Unknown".to_owned(),
        }
    }
}
