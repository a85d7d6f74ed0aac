use super::Device;
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::time::SystemTime;

/// Mount alignment geometries.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum AlignmentMode {
    /// Altitude-azimuth alignment.
    AltAz = 0,
    /// Polar (equatorial) alignment.
    Polar = 1,
    /// German equatorial alignment.
    GermanPolar = 2,
}

/// Equatorial coordinate systems.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum EquatorialSystem {
    /// Custom or unknown equinox.
    Other = 0,
    /// Topocentric coordinates of the current epoch.
    Topocentric = 1,
    /// J2000 equator and equinox.
    J2000 = 2,
}

/// Well-known tracking rates.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum DriveRate {
    /// Sidereal tracking (15.041 arcseconds per second).
    Sidereal = 0,
    /// Lunar tracking.
    Lunar = 1,
    /// Solar tracking.
    Solar = 2,
    /// King rate (sidereal corrected for refraction).
    King = 3,
}

/// Pulse-guide directions.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum GuideDirection {
    /// North (+declination).
    North = 0,
    /// South (-declination).
    South = 1,
    /// East (+right ascension).
    East = 2,
    /// West (-right ascension).
    West = 3,
}

/// Side of the mount the optical tube is on.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum PierSide {
    /// Normal pointing state: mount on the east side of pier, looking west.
    East = 0,
    /// Through-the-pole pointing state: mount on the west side, looking east.
    West = 1,
    /// Unknown or indeterminate.
    Unknown = -1,
}

/// Mount motion axes.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr, IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum TelescopeAxis {
    /// Right ascension / azimuth axis.
    Primary = 0,
    /// Declination / altitude axis.
    Secondary = 1,
}

/// A rate range supported by `move_axis`, in degrees per second.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AxisRate {
    /// The slowest supported rate.
    pub minimum: f64,
    /// The fastest supported rate.
    pub maximum: f64,
}

/// Telescope-mount-specific methods.
#[async_trait]
pub trait Telescope: Device {
    /// The alignment geometry of this mount.
    async fn alignment_mode(&self) -> ASCOMResult<AlignmentMode> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The altitude above the local horizon of the mount's current position, in degrees.
    async fn altitude(&self) -> ASCOMResult<f64>;

    /// The azimuth of the mount's current position, in degrees (North-referenced, East positive).
    async fn azimuth(&self) -> ASCOMResult<f64>;

    /// Whether the mount is at its home position.
    async fn at_home(&self) -> ASCOMResult<bool>;

    /// Whether the mount is at its park position.
    async fn at_park(&self) -> ASCOMResult<bool>;

    /// Whether this mount can find its home position.
    async fn can_find_home(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this mount can be parked.
    async fn can_park(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this mount can be pulse guided.
    async fn can_pulse_guide(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether the guide rates can be changed.
    async fn can_set_guide_rates(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether tracking can be switched on and off.
    async fn can_set_tracking(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this mount can slew to equatorial coordinates synchronously.
    async fn can_slew(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this mount can slew to equatorial coordinates asynchronously.
    async fn can_slew_async(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this mount can sync to equatorial coordinates.
    async fn can_sync(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this mount can be unparked.
    async fn can_unpark(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// The declination of the mount's current position, in degrees.
    async fn declination(&self) -> ASCOMResult<f64>;

    /// The declination tracking rate offset, in arcseconds per second.
    async fn declination_rate(&self) -> ASCOMResult<f64> {
        Ok(0.0)
    }

    /// The right ascension of the mount's current position, in hours.
    async fn right_ascension(&self) -> ASCOMResult<f64>;

    /// The right ascension tracking rate offset, in arcseconds per second.
    async fn right_ascension_rate(&self) -> ASCOMResult<f64> {
        Ok(0.0)
    }

    /// The equatorial coordinate system used by this mount.
    async fn equatorial_system(&self) -> ASCOMResult<EquatorialSystem> {
        Ok(EquatorialSystem::Topocentric)
    }

    /// The declination guide rate, in degrees per second.
    async fn guide_rate_declination(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the declination guide rate, in degrees per second.
    async fn set_guide_rate_declination(&self, _rate: f64) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The right ascension guide rate, in degrees per second.
    async fn guide_rate_right_ascension(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the right ascension guide rate, in degrees per second.
    async fn set_guide_rate_right_ascension(&self, _rate: f64) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Whether a pulse-guide command is currently in progress.
    async fn is_pulse_guiding(&self) -> ASCOMResult<bool> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The pointing state of the mount.
    async fn side_of_pier(&self) -> ASCOMResult<PierSide> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The local apparent sidereal time, in hours.
    async fn sidereal_time(&self) -> ASCOMResult<f64>;

    /// The elevation above mean sea level of the observing site, in meters.
    async fn site_elevation(&self) -> ASCOMResult<f64>;

    /// Sets the elevation of the observing site.
    async fn set_site_elevation(&self, elevation: f64) -> ASCOMResult;

    /// The geodetic latitude of the observing site, in degrees (positive North).
    async fn site_latitude(&self) -> ASCOMResult<f64>;

    /// Sets the latitude of the observing site.
    async fn set_site_latitude(&self, latitude: f64) -> ASCOMResult;

    /// The longitude of the observing site, in degrees (positive East).
    async fn site_longitude(&self) -> ASCOMResult<f64>;

    /// Sets the longitude of the observing site.
    async fn set_site_longitude(&self, longitude: f64) -> ASCOMResult;

    /// Whether the mount is currently slewing to a target.
    async fn slewing(&self) -> ASCOMResult<bool>;

    /// The declination of the current target, in degrees.
    ///
    /// Reading fails until a target declination has been set.
    async fn target_declination(&self) -> ASCOMResult<f64>;

    /// Sets the declination of the target.
    async fn set_target_declination(&self, target_declination: f64) -> ASCOMResult;

    /// The right ascension of the current target, in hours.
    ///
    /// Reading fails until a target right ascension has been set.
    async fn target_right_ascension(&self) -> ASCOMResult<f64>;

    /// Sets the right ascension of the target.
    async fn set_target_right_ascension(&self, target_right_ascension: f64) -> ASCOMResult;

    /// Whether the mount is tracking.
    async fn tracking(&self) -> ASCOMResult<bool>;

    /// Switches sidereal tracking on and off.
    async fn set_tracking(&self, tracking: bool) -> ASCOMResult;

    /// The current tracking rate of the mount.
    async fn tracking_rate(&self) -> ASCOMResult<DriveRate>;

    /// Sets the tracking rate of the mount.
    async fn set_tracking_rate(&self, tracking_rate: DriveRate) -> ASCOMResult;

    /// The tracking rates supported by this mount.
    async fn tracking_rates(&self) -> ASCOMResult<Vec<DriveRate>>;

    /// The UTC date and time of the mount's internal clock.
    async fn utc_date(&self) -> ASCOMResult<SystemTime>;

    /// Sets the UTC date and time of the mount's internal clock.
    async fn set_utc_date(&self, utc_date: SystemTime) -> ASCOMResult;

    /// Immediately stops a slew in progress.
    async fn abort_slew(&self) -> ASCOMResult;

    /// The rate ranges supported by `move_axis` for the given axis.
    async fn axis_rates(&self, axis: TelescopeAxis) -> ASCOMResult<Vec<AxisRate>>;

    /// Whether the given axis can be moved with `move_axis`.
    async fn can_move_axis(&self, _axis: TelescopeAxis) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Moves the mount's home position.
    async fn find_home(&self) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Moves the mount about the given axis at the given rate, in degrees per second.
    ///
    /// Rate `0` stops motion about the axis.
    async fn move_axis(&self, axis: TelescopeAxis, rate: f64) -> ASCOMResult;

    /// Moves the mount to its park position and sets `at_park`.
    async fn park(&self) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Takes the mount out of the parked state.
    async fn unpark(&self) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Pulse guides in the given direction for the given duration in milliseconds.
    async fn pulse_guide(&self, _direction: GuideDirection, _duration_ms: u32) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Slews to the given equatorial coordinates and blocks until the slew completes.
    async fn slew_to_coordinates(&self, right_ascension: f64, declination: f64) -> ASCOMResult;

    /// Starts a slew to the given equatorial coordinates and returns immediately.
    async fn slew_to_coordinates_async(
        &self,
        right_ascension: f64,
        declination: f64,
    ) -> ASCOMResult;

    /// Slews to the current target and blocks until the slew completes.
    async fn slew_to_target(&self) -> ASCOMResult;

    /// Starts a slew to the current target and returns immediately.
    async fn slew_to_target_async(&self) -> ASCOMResult;

    /// Matches the mount's coordinates to the given equatorial coordinates.
    async fn sync_to_coordinates(&self, right_ascension: f64, declination: f64) -> ASCOMResult;

    /// Matches the mount's coordinates to the current target.
    async fn sync_to_target(&self) -> ASCOMResult;
}
