//! The vendor SDK boundary.
//!
//! The hub treats the camera vendor's library as an opaque provider of
//! open/close/read-frame/set-parameter/read-temperature calls behind
//! [`CameraSdk`]. All methods may block (vendor libraries usually do), so
//! the driver calls them on the blocking thread pool.

use crate::ASCOMError;
use std::fmt::Debug;
use thiserror::Error;

/// Failure reported by the vendor library.
#[derive(Debug, Clone, Error)]
#[error("SDK error: {0}")]
pub struct SdkError(pub String);

impl SdkError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<SdkError> for ASCOMError {
    fn from(err: SdkError) -> Self {
        Self::driver_error(err)
    }
}

/// Result type for SDK calls.
pub type SdkResult<T> = Result<T, SdkError>;

/// Tunable camera parameters, in the style of vendor control ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlParam {
    /// Exposure duration, in microseconds.
    Exposure,
    /// Sensor gain, in hardware units.
    Gain,
    /// Sensor black-level offset, in hardware units.
    Offset,
    /// USB bus throughput throttle.
    UsbTraffic,
    /// Cooler target temperature, in degrees Celsius.
    CoolerTargetTemp,
    /// Cooler drive strength, 0-255 PWM.
    CoolerPwm,
    /// Current sensor temperature, in degrees Celsius (read-only).
    CurrentTemp,
}

/// Static sensor description probed at open time.
#[derive(Debug, Clone)]
pub struct ChipInfo {
    /// Sensor model name, e.g. `IMX571`.
    pub sensor_name: String,
    /// Full frame width in unbinned pixels.
    pub image_width: u32,
    /// Full frame height in unbinned pixels.
    pub image_height: u32,
    /// Physical pixel width in microns.
    pub pixel_width: f64,
    /// Physical pixel height in microns.
    pub pixel_height: f64,
    /// Sample depth, 8 or 16.
    pub bits_per_pixel: u32,
    /// Largest supported symmetric bin factor.
    pub max_bin: u32,
    /// Whether a mechanical shutter is fitted.
    pub has_shutter: bool,
    /// Whether a thermoelectric cooler is fitted.
    pub has_cooler: bool,
    /// Gain of the A/D conversion, in electrons per ADU.
    pub electrons_per_adu: f64,
    /// Full well capacity, in electrons.
    pub full_well_capacity: f64,
}

/// A rectangle in unbinned sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
}

/// A raw frame as delivered by the SDK.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in samples, at the binning active during readout.
    pub width: u32,
    /// Height in samples.
    pub height: u32,
    /// Sample depth, 8 or 16.
    pub bits_per_pixel: u32,
    /// Samples in readout order, 16-bit samples little-endian.
    pub data: Vec<u8>,
}

/// One physical camera as exposed by the vendor library.
pub trait CameraSdk: Send + Sync + Debug {
    /// Acquires the hardware handle.
    fn open(&self) -> SdkResult<()>;

    /// Releases the hardware handle.
    fn close(&self) -> SdkResult<()>;

    /// A stable identifier for the physical camera (vendor serial number).
    fn serial(&self) -> String;

    /// Sensor description at the current readout mode.
    fn chip_info(&self) -> SdkResult<ChipInfo>;

    /// Names of the sensor readout presets.
    fn readout_modes(&self) -> SdkResult<Vec<String>>;

    /// Selects a readout preset.
    fn set_readout_mode(&self, index: u32) -> SdkResult<()>;

    /// The overscan-cropped sub-rectangle of the sensor.
    fn effective_area(&self) -> SdkResult<Area>;

    /// Sets the symmetric bin factor.
    fn set_bin(&self, bin: u32) -> SdkResult<()>;

    /// Sets the capture region, in binned pixels.
    fn set_resolution(&self, area: Area) -> SdkResult<()>;

    /// Reads a parameter value.
    fn param(&self, param: ControlParam) -> SdkResult<f64>;

    /// Writes a parameter value.
    fn set_param(&self, param: ControlParam, value: f64) -> SdkResult<()>;

    /// `(min, max, step)` for a parameter.
    fn param_limits(&self, param: ControlParam) -> SdkResult<(f64, f64, f64)>;

    /// Begins integrating a single frame.
    fn start_exposure(&self) -> SdkResult<()>;

    /// Cancels an in-progress integration.
    fn cancel_exposure(&self) -> SdkResult<()>;

    /// Digitizes and downloads the integrated frame.
    fn read_frame(&self) -> SdkResult<Frame>;

    /// Number of slots in the through-the-camera filter wheel, 0 if none.
    fn filter_wheel_slots(&self) -> u32 {
        0
    }

    /// Current filter wheel slot.
    fn filter_wheel_position(&self) -> SdkResult<u32> {
        Err(SdkError::new("No filter wheel attached"))
    }

    /// Rotates the filter wheel to the given slot.
    fn set_filter_wheel_position(&self, _slot: u32) -> SdkResult<()> {
        Err(SdkError::new("No filter wheel attached"))
    }
}
