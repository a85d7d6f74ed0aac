/*!
Typed device API surface.

Each device category gets a behavior trait ([`Camera`], [`Telescope`],
[`Focuser`], [`FilterWheel`], [`Rotator`], [`Switch`]) with one async method
per Alpaca operation. Methods default to `NOT_IMPLEMENTED` so drivers only
spell out the capabilities their hardware actually has; the HTTP layer binds
route names to these methods in `server::dispatch`.
*/

mod device;
pub use device::Device;

mod camera;
pub use camera::{Camera, CameraState, SensorType};

mod telescope;
pub use telescope::{
    AlignmentMode, AxisRate, DriveRate, EquatorialSystem, GuideDirection, PierSide, Telescope,
    TelescopeAxis,
};

mod filter_wheel;
pub use filter_wheel::FilterWheel;

mod focuser;
pub use focuser::Focuser;

mod rotator;
pub use rotator::Rotator;

mod switch;
pub use switch::Switch;

mod image_array;
pub(crate) use image_array::IMAGE_BYTES_TYPE;
pub use image_array::{ImageArray, ImageBytesResponse, TransmissionElementType};

mod server_info;
pub use server_info::{ConfiguredDevice, ServerInfo};

mod time_repr;
pub(crate) use time_repr::Iso8601Time;

use serde::{Deserialize, Serialize};

/// Device categories supported by the hub.
///
/// Serialized in PascalCase (the form used by the management API); URL path
/// segments use the all-lowercase form, see [`DeviceType::from_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// Camera.
    Camera,
    /// Telescope mount.
    Telescope,
    /// Focuser.
    Focuser,
    /// Filter wheel.
    FilterWheel,
    /// Rotator.
    Rotator,
    /// Switch bank (power/dew controller).
    Switch,
}

impl DeviceType {
    /// All categories, in registry iteration order.
    pub const ALL: [Self; 6] = [
        Self::Camera,
        Self::Telescope,
        Self::Focuser,
        Self::FilterWheel,
        Self::Rotator,
        Self::Switch,
    ];

    /// Parse the lowercase URL path segment form.
    pub fn from_path(segment: &str) -> Option<Self> {
        Some(match segment {
            "camera" => Self::Camera,
            "telescope" => Self::Telescope,
            "focuser" => Self::Focuser,
            "filterwheel" => Self::FilterWheel,
            "rotator" => Self::Rotator,
            "switch" => Self::Switch,
            _ => return None,
        })
    }

    /// The lowercase path segment for this category.
    pub const fn as_path(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Telescope => "telescope",
            Self::Focuser => "focuser",
            Self::FilterWheel => "filterwheel",
            Self::Rotator => "rotator",
            Self::Switch => "switch",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_roundtrip() {
        for ty in DeviceType::ALL {
            assert_eq!(DeviceType::from_path(ty.as_path()), Some(ty));
        }
        assert_eq!(DeviceType::from_path("dome"), None);
        assert_eq!(DeviceType::from_path("Camera"), None);
    }

    #[test]
    fn management_form_is_pascal_case() {
        let json = serde_json::to_value(DeviceType::FilterWheel).unwrap();
        assert_eq!(json, "FilterWheel");
    }
}
