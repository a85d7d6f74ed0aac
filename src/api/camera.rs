use super::{Device, ImageArray};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::time::SystemTime;

/// Camera operational states.
#[derive(
    Debug,
    Default,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Serialize_repr,
    Deserialize_repr,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum CameraState {
    /// At idle state, available to start exposure.
    #[default]
    Idle = 0,
    /// Exposure started but waiting (for shutter, trigger, filter wheel, etc.).
    Waiting = 1,
    /// Exposure currently in progress.
    Exposing = 2,
    /// Sensor array is being read out (digitized).
    Reading = 3,
    /// Downloading data to host.
    Download = 4,
    /// Camera error condition serious enough to prevent further operations.
    Error = 5,
}

/// Sensor layout as reported by `sensortype`.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Serialize_repr,
    Deserialize_repr,
    IntoPrimitive,
    TryFromPrimitive,
)]
#[repr(i32)]
pub enum SensorType {
    /// Single-plane monochrome sensor.
    Monochrome = 0,
    /// Colour sensor without a Bayer encoding.
    Color = 1,
    /// RGGB Bayer encoding.
    Rggb = 2,
    /// CMYG Bayer encoding.
    Cmyg = 3,
    /// CMYG2 Bayer encoding.
    Cmyg2 = 4,
    /// LRGB TRUESENSE Bayer encoding.
    Lrgb = 5,
}

/// Camera-specific methods.
#[async_trait]
pub trait Camera: Device {
    /// Returns the X offset of the Bayer matrix, as defined in `SensorType`.
    async fn bayer_offset_x(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the Y offset of the Bayer matrix, as defined in `SensorType`.
    async fn bayer_offset_y(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the binning factor for the X axis.
    async fn bin_x(&self) -> ASCOMResult<i32>;

    /// Sets the binning factor for the X axis.
    async fn set_bin_x(&self, bin_x: i32) -> ASCOMResult;

    /// Returns the binning factor for the Y axis.
    async fn bin_y(&self) -> ASCOMResult<i32>;

    /// Sets the binning factor for the Y axis.
    async fn set_bin_y(&self, bin_y: i32) -> ASCOMResult;

    /// Returns the current camera operational state.
    async fn camera_state(&self) -> ASCOMResult<CameraState>;

    /// Returns the width of the CCD camera chip in unbinned pixels.
    async fn camera_xsize(&self) -> ASCOMResult<i32>;

    /// Returns the height of the CCD camera chip in unbinned pixels.
    async fn camera_ysize(&self) -> ASCOMResult<i32>;

    /// Whether the camera can abort exposures, discarding the data.
    async fn can_abort_exposure(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether the camera supports differing bin factors on X and Y.
    async fn can_asymmetric_bin(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether the camera has a fast readout mode.
    async fn can_fast_readout(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether the camera's cooler power level is available.
    async fn can_get_cooler_power(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this camera supports pulse guiding.
    async fn can_pulse_guide(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether this camera supports setting the CCD temperature set-point.
    async fn can_set_ccd_temperature(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Whether the camera can stop an exposure early, keeping the data.
    async fn can_stop_exposure(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Returns the current CCD temperature in degrees Celsius.
    async fn ccd_temperature(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the current cooler on/off state.
    async fn cooler_on(&self) -> ASCOMResult<bool> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Turns the camera cooler on and off.
    async fn set_cooler_on(&self, _cooler_on: bool) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the present cooler power level, in percent.
    async fn cooler_power(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the gain of the camera in photoelectrons per A/D unit.
    async fn electrons_per_adu(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the maximum exposure time supported by `start_exposure`, in seconds.
    async fn exposure_max(&self) -> ASCOMResult<f64>;

    /// Returns the minimum exposure time supported by `start_exposure`, in seconds.
    async fn exposure_min(&self) -> ASCOMResult<f64>;

    /// Returns the smallest increment in exposure time supported by `start_exposure`.
    async fn exposure_resolution(&self) -> ASCOMResult<f64>;

    /// Returns whether fast readout mode is enabled.
    async fn fast_readout(&self) -> ASCOMResult<bool> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets whether fast readout mode is enabled.
    async fn set_fast_readout(&self, _fast_readout: bool) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Reports the full well capacity of the camera, in electrons, at the
    /// current camera settings.
    async fn full_well_capacity(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The camera's gain, either as an index into `gains` or in raw hardware
    /// units, depending on which mode the driver operates in.
    async fn gain(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the camera's gain.
    async fn set_gain(&self, _gain: i32) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Maximum gain value in hardware units. Only available in value mode.
    async fn gain_max(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Minimum gain value in hardware units. Only available in value mode.
    async fn gain_min(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Discrete gain labels. Only available in index mode.
    async fn gains(&self) -> ASCOMResult<Vec<String>> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Whether this camera has a mechanical shutter.
    async fn has_shutter(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Returns the current heat sink (ambient) temperature in degrees Celsius.
    async fn heat_sink_temperature(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the last captured frame as a packed 2-D pixel array.
    async fn image_array(&self) -> ASCOMResult<ImageArray>;

    /// Whether a frame is available for download via `image_array`.
    async fn image_ready(&self) -> ASCOMResult<bool>;

    /// Whether the camera is currently in a pulse-guide operation.
    async fn is_pulse_guiding(&self) -> ASCOMResult<bool> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Reports the actual exposure duration in seconds of the last exposure.
    async fn last_exposure_duration(&self) -> ASCOMResult<f64>;

    /// Reports the actual start time of the last exposure (UTC).
    async fn last_exposure_start_time(&self) -> ASCOMResult<SystemTime>;

    /// Reports the maximum ADU value the camera can produce.
    async fn max_adu(&self) -> ASCOMResult<i32>;

    /// Returns the maximum allowed binning for the X camera axis.
    async fn max_bin_x(&self) -> ASCOMResult<i32>;

    /// Returns the maximum allowed binning for the Y camera axis.
    async fn max_bin_y(&self) -> ASCOMResult<i32>;

    /// Returns the current subframe width, in binned pixels.
    async fn num_x(&self) -> ASCOMResult<i32>;

    /// Sets the current subframe width, in binned pixels.
    async fn set_num_x(&self, num_x: i32) -> ASCOMResult;

    /// Returns the current subframe height, in binned pixels.
    async fn num_y(&self) -> ASCOMResult<i32>;

    /// Sets the current subframe height, in binned pixels.
    async fn set_num_y(&self, num_y: i32) -> ASCOMResult;

    /// The camera's offset, in raw hardware units.
    async fn offset(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the camera's offset.
    async fn set_offset(&self, _offset: i32) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Maximum offset value in hardware units.
    async fn offset_max(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Minimum offset value in hardware units.
    async fn offset_min(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Discrete offset labels. Only available in index mode.
    async fn offsets(&self) -> ASCOMResult<Vec<String>> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Percentage of the current operation that is complete.
    async fn percent_completed(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the width of the CCD chip pixels in microns.
    async fn pixel_size_x(&self) -> ASCOMResult<f64>;

    /// Returns the height of the CCD chip pixels in microns.
    async fn pixel_size_y(&self) -> ASCOMResult<f64>;

    /// Index into `readout_modes` of the currently selected sensor preset.
    async fn readout_mode(&self) -> ASCOMResult<i32> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Selects a sensor readout preset by index into `readout_modes`.
    async fn set_readout_mode(&self, _readout_mode: i32) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Names of the readout presets supported by the sensor.
    async fn readout_modes(&self) -> ASCOMResult<Vec<String>> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The name of the sensor, e.g. as reported by the vendor SDK.
    async fn sensor_name(&self) -> ASCOMResult<String> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The type of colour information returned by the camera sensor.
    async fn sensor_type(&self) -> ASCOMResult<SensorType> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Returns the current cooler set-point in degrees Celsius.
    async fn set_ccd_temperature(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the camera's cooler set-point in degrees Celsius.
    async fn set_set_ccd_temperature(&self, _set_ccd_temperature: f64) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Starts an exposure; use `image_ready` to check when the exposure is complete.
    async fn start_exposure(&self, duration: f64, light: bool) -> ASCOMResult;

    /// Returns the X coordinate of the subframe start position, in binned pixels.
    async fn start_x(&self) -> ASCOMResult<i32>;

    /// Sets the X coordinate of the subframe start position.
    async fn set_start_x(&self, start_x: i32) -> ASCOMResult;

    /// Returns the Y coordinate of the subframe start position, in binned pixels.
    async fn start_y(&self) -> ASCOMResult<i32>;

    /// Sets the Y coordinate of the subframe start position.
    async fn set_start_y(&self, start_y: i32) -> ASCOMResult;

    /// Aborts the current exposure, if any, discarding the data.
    async fn abort_exposure(&self) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Stops the current exposure early, keeping the data collected so far.
    async fn stop_exposure(&self) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The duration of individual sub-exposures, in seconds.
    async fn sub_exposure_duration(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the duration of individual sub-exposures.
    async fn set_sub_exposure_duration(&self, _sub_exposure_duration: f64) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }
}
