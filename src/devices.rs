use crate::api::{
    Camera, ConfiguredDevice, Device, DeviceType, FilterWheel, Focuser, Rotator, Switch, Telescope,
};
use std::sync::Arc;

/// A registered device, tagged by category.
///
/// The tag is the registry's source of truth: every HTTP route pattern
/// matches the variant it expects, so a camera action can never reach a
/// focuser handle.
#[derive(Debug, Clone)]
pub enum TypedDevice {
    /// A camera.
    Camera(Arc<dyn Camera>),
    /// A telescope mount.
    Telescope(Arc<dyn Telescope>),
    /// A focuser.
    Focuser(Arc<dyn Focuser>),
    /// A filter wheel.
    FilterWheel(Arc<dyn FilterWheel>),
    /// A rotator.
    Rotator(Arc<dyn Rotator>),
    /// A switch bank.
    Switch(Arc<dyn Switch>),
}

impl TypedDevice {
    /// The category this device is registered under.
    pub fn device_type(&self) -> DeviceType {
        match self {
            Self::Camera(_) => DeviceType::Camera,
            Self::Telescope(_) => DeviceType::Telescope,
            Self::Focuser(_) => DeviceType::Focuser,
            Self::FilterWheel(_) => DeviceType::FilterWheel,
            Self::Rotator(_) => DeviceType::Rotator,
            Self::Switch(_) => DeviceType::Switch,
        }
    }

    /// Access the capability set common to all devices.
    pub fn as_device(&self) -> &dyn Device {
        match self {
            Self::Camera(device) => device.as_ref(),
            Self::Telescope(device) => device.as_ref(),
            Self::Focuser(device) => device.as_ref(),
            Self::FilterWheel(device) => device.as_ref(),
            Self::Rotator(device) => device.as_ref(),
            Self::Switch(device) => device.as_ref(),
        }
    }

    /// The management-API record for this device at the given index.
    pub fn to_configured_device(&self, number: usize) -> ConfiguredDevice {
        let device = self.as_device();
        ConfiguredDevice {
            name: device.static_name().to_owned(),
            ty: self.device_type(),
            number,
            unique_id: device.unique_id().to_owned(),
        }
    }
}

/// Devices registered on the hub, by category and index.
///
/// The index of a device within its category is stable for the server's
/// lifetime; `(category, index)` is the device's addressable identity.
#[derive(Debug, Default)]
pub struct Devices {
    cameras: Vec<TypedDevice>,
    telescopes: Vec<TypedDevice>,
    focusers: Vec<TypedDevice>,
    filter_wheels: Vec<TypedDevice>,
    rotators: Vec<TypedDevice>,
    switches: Vec<TypedDevice>,
}

impl Devices {
    fn storage(&self, ty: DeviceType) -> &Vec<TypedDevice> {
        match ty {
            DeviceType::Camera => &self.cameras,
            DeviceType::Telescope => &self.telescopes,
            DeviceType::Focuser => &self.focusers,
            DeviceType::FilterWheel => &self.filter_wheels,
            DeviceType::Rotator => &self.rotators,
            DeviceType::Switch => &self.switches,
        }
    }

    /// Register a device.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn register(&mut self, device: TypedDevice) {
        let storage = match device.device_type() {
            DeviceType::Camera => &mut self.cameras,
            DeviceType::Telescope => &mut self.telescopes,
            DeviceType::Focuser => &mut self.focusers,
            DeviceType::FilterWheel => &mut self.filter_wheels,
            DeviceType::Rotator => &mut self.rotators,
            DeviceType::Switch => &mut self.switches,
        };
        storage.push(device);
    }

    /// Retrieve a device by category and index within the category.
    pub fn get(&self, ty: DeviceType, number: usize) -> Option<&TypedDevice> {
        self.storage(ty).get(number)
    }

    /// Number of devices in the given category.
    pub fn count(&self, ty: DeviceType) -> usize {
        self.storage(ty).len()
    }

    /// Iterate over all devices with their per-category numbers, in
    /// category order.
    pub fn iter_all(&self) -> impl Iterator<Item = (&TypedDevice, usize)> {
        DeviceType::ALL
            .into_iter()
            .flat_map(|ty| self.storage(ty).iter().enumerate().map(|(n, d)| (d, n)))
    }
}

impl Extend<TypedDevice> for Devices {
    fn extend<T: IntoIterator<Item = TypedDevice>>(&mut self, iter: T) {
        for device in iter {
            self.register(device);
        }
    }
}

impl FromIterator<TypedDevice> for Devices {
    fn from_iter<T: IntoIterator<Item = TypedDevice>>(iter: T) -> Self {
        let mut devices = Self::default();
        devices.extend(iter);
        devices
    }
}
