//! Binding of Alpaca route names to typed device operations.
//!
//! Stage 2 of the request pipeline: the device identity has already been
//! resolved, so each function here matches `(method, action)` against the
//! operations of one device category, coerces PUT parameters and invokes
//! the trait method. Unknown actions fall through to the common device
//! operations and finally to a 400.

use super::error::{Error, Result};
use super::params::{ActionParams, OpaqueParams};
use super::response::OpaqueResponse;
use crate::api::{
    Camera, Device, DeviceType, DriveRate, FilterWheel, Focuser, GuideDirection, Iso8601Time,
    Rotator, Switch, Telescope, TelescopeAxis,
};
use crate::devices::{Devices, TypedDevice};
use crate::{ASCOMError, ASCOMResult};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Put,
}

use Method::{Get, Put};

fn to_response<T: Debug + serde::Serialize>(result: ASCOMResult<T>) -> ASCOMResult<OpaqueResponse> {
    result.map(OpaqueResponse::new)
}

/// Extract a required parameter, turning coercion failures into the in-band
/// `INVALID_VALUE` the surrounding match arm returns.
macro_rules! param {
    ($params:ident, $name:literal) => {
        match $params.extract($name) {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        }
    };
    // Integer-coded enum parameters.
    ($params:ident, $name:literal as $ty:ty) => {
        match $params
            .extract::<i32>($name)
            .and_then(|raw| <$ty>::try_from(raw).map_err(|_| {
                ASCOMError::invalid_value(format_args!("Invalid {} value {raw}", $name))
            })) {
            Ok(value) => value,
            Err(err) => return Some(Err(err)),
        }
    };
}

/// Dispatch an action to the device at `(device_type, device_number)`.
pub(crate) async fn handle_action(
    devices: &Devices,
    device_type: DeviceType,
    device_number: usize,
    action: &str,
    params: ActionParams,
) -> Result<ASCOMResult<OpaqueResponse>> {
    let device = devices
        .get(device_type, device_number)
        .ok_or_else(|| Error::UnknownDeviceNumber {
            ty: device_type,
            number: device_number.to_string(),
        })?;

    let (method, mut params) = match params {
        ActionParams::Get(params) => (Get, params),
        ActionParams::Put(params) => (Put, params),
    };
    let params = &mut params;

    let response = match device {
        TypedDevice::Camera(camera) => camera_action(camera.as_ref(), method, action, params).await,
        TypedDevice::Telescope(telescope) => {
            telescope_action(telescope.as_ref(), method, action, params).await
        }
        TypedDevice::Focuser(focuser) => {
            focuser_action(focuser.as_ref(), method, action, params).await
        }
        TypedDevice::FilterWheel(wheel) => {
            filter_wheel_action(wheel.as_ref(), method, action, params).await
        }
        TypedDevice::Rotator(rotator) => {
            rotator_action(rotator.as_ref(), method, action, params).await
        }
        TypedDevice::Switch(switch) => switch_action(switch.as_ref(), method, action, params).await,
    };

    if let Some(result) = response {
        return Ok(result);
    }
    common_action(device.as_device(), method, action, params)
        .await
        .ok_or_else(|| Error::UnknownAction {
            device_type,
            action: action.to_owned(),
        })
}

async fn common_action(
    device: &dyn Device,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "connected") => to_response(device.connected().await),
        (Put, "connected") => {
            let connected = param!(params, "Connected");
            to_response(device.set_connected(connected).await)
        }
        (Get, "description") => to_response(device.description().await),
        (Get, "driverinfo") => to_response(device.driver_info().await),
        (Get, "driverversion") => to_response(device.driver_version().await),
        (Get, "interfaceversion") => to_response(device.interface_version().await),
        (Get, "name") => to_response(device.name().await),
        (Get, "supportedactions") => to_response(device.supported_actions().await),
        (Put, "action") => {
            let name = param!(params, "Action");
            let parameters = param!(params, "Parameters");
            to_response(device.action(name, parameters).await)
        }
        (Put, "commandblind") => {
            let command = param!(params, "Command");
            let raw = param!(params, "Raw");
            to_response(device.command_blind(command, raw).await)
        }
        (Put, "commandbool") => {
            let command = param!(params, "Command");
            let raw = param!(params, "Raw");
            to_response(device.command_bool(command, raw).await)
        }
        (Put, "commandstring") => {
            let command = param!(params, "Command");
            let raw = param!(params, "Raw");
            to_response(device.command_string(command, raw).await)
        }
        _ => return None,
    })
}

#[allow(clippy::too_many_lines)]
async fn camera_action(
    device: &dyn Camera,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "bayeroffsetx") => to_response(device.bayer_offset_x().await),
        (Get, "bayeroffsety") => to_response(device.bayer_offset_y().await),
        (Get, "binx") => to_response(device.bin_x().await),
        (Put, "binx") => {
            let bin_x = param!(params, "BinX");
            to_response(device.set_bin_x(bin_x).await)
        }
        (Get, "biny") => to_response(device.bin_y().await),
        (Put, "biny") => {
            let bin_y = param!(params, "BinY");
            to_response(device.set_bin_y(bin_y).await)
        }
        (Get, "camerastate") => to_response(device.camera_state().await),
        (Get, "cameraxsize") => to_response(device.camera_xsize().await),
        (Get, "cameraysize") => to_response(device.camera_ysize().await),
        (Get, "canabortexposure") => to_response(device.can_abort_exposure().await),
        (Get, "canasymmetricbin") => to_response(device.can_asymmetric_bin().await),
        (Get, "canfastreadout") => to_response(device.can_fast_readout().await),
        (Get, "cangetcoolerpower") => to_response(device.can_get_cooler_power().await),
        (Get, "canpulseguide") => to_response(device.can_pulse_guide().await),
        (Get, "cansetccdtemperature") => to_response(device.can_set_ccd_temperature().await),
        (Get, "canstopexposure") => to_response(device.can_stop_exposure().await),
        (Get, "ccdtemperature") => to_response(device.ccd_temperature().await),
        (Get, "cooleron") => to_response(device.cooler_on().await),
        (Put, "cooleron") => {
            let cooler_on = param!(params, "CoolerOn");
            to_response(device.set_cooler_on(cooler_on).await)
        }
        (Get, "coolerpower") => to_response(device.cooler_power().await),
        (Get, "electronsperadu") => to_response(device.electrons_per_adu().await),
        (Get, "exposuremax") => to_response(device.exposure_max().await),
        (Get, "exposuremin") => to_response(device.exposure_min().await),
        (Get, "exposureresolution") => to_response(device.exposure_resolution().await),
        (Get, "fastreadout") => to_response(device.fast_readout().await),
        (Put, "fastreadout") => {
            let fast_readout = param!(params, "FastReadout");
            to_response(device.set_fast_readout(fast_readout).await)
        }
        (Get, "fullwellcapacity") => to_response(device.full_well_capacity().await),
        (Get, "gain") => to_response(device.gain().await),
        (Put, "gain") => {
            let gain = param!(params, "Gain");
            to_response(device.set_gain(gain).await)
        }
        (Get, "gainmax") => to_response(device.gain_max().await),
        (Get, "gainmin") => to_response(device.gain_min().await),
        (Get, "gains") => to_response(device.gains().await),
        (Get, "hasshutter") => to_response(device.has_shutter().await),
        (Get, "heatsinktemperature") => to_response(device.heat_sink_temperature().await),
        // The binary imagebytes form is negotiated one layer up, before
        // dispatch; this is the JSON fallback. `imagearrayvariant` is
        // soft-deprecated but must keep answering.
        (Get, "imagearray" | "imagearrayvariant") => to_response(device.image_array().await),
        (Get, "imageready") => to_response(device.image_ready().await),
        (Get, "ispulseguiding") => to_response(device.is_pulse_guiding().await),
        (Get, "lastexposureduration") => to_response(device.last_exposure_duration().await),
        (Get, "lastexposurestarttime") => to_response(
            device
                .last_exposure_start_time()
                .await
                .map(Iso8601Time::from),
        ),
        (Get, "maxadu") => to_response(device.max_adu().await),
        (Get, "maxbinx") => to_response(device.max_bin_x().await),
        (Get, "maxbiny") => to_response(device.max_bin_y().await),
        (Get, "numx") => to_response(device.num_x().await),
        (Put, "numx") => {
            let num_x = param!(params, "NumX");
            to_response(device.set_num_x(num_x).await)
        }
        (Get, "numy") => to_response(device.num_y().await),
        (Put, "numy") => {
            let num_y = param!(params, "NumY");
            to_response(device.set_num_y(num_y).await)
        }
        (Get, "offset") => to_response(device.offset().await),
        (Put, "offset") => {
            let offset = param!(params, "Offset");
            to_response(device.set_offset(offset).await)
        }
        (Get, "offsetmax") => to_response(device.offset_max().await),
        (Get, "offsetmin") => to_response(device.offset_min().await),
        (Get, "offsets") => to_response(device.offsets().await),
        (Get, "percentcompleted") => to_response(device.percent_completed().await),
        (Get, "pixelsizex") => to_response(device.pixel_size_x().await),
        (Get, "pixelsizey") => to_response(device.pixel_size_y().await),
        (Get, "readoutmode") => to_response(device.readout_mode().await),
        (Put, "readoutmode") => {
            let readout_mode = param!(params, "ReadoutMode");
            to_response(device.set_readout_mode(readout_mode).await)
        }
        (Get, "readoutmodes") => to_response(device.readout_modes().await),
        (Get, "sensorname") => to_response(device.sensor_name().await),
        (Get, "sensortype") => to_response(device.sensor_type().await),
        (Get, "setccdtemperature") => to_response(device.set_ccd_temperature().await),
        (Put, "setccdtemperature") => {
            let temperature = param!(params, "SetCCDTemperature");
            to_response(device.set_set_ccd_temperature(temperature).await)
        }
        (Put, "startexposure") => {
            let duration = param!(params, "Duration");
            let light = param!(params, "Light");
            to_response(device.start_exposure(duration, light).await)
        }
        (Get, "startx") => to_response(device.start_x().await),
        (Put, "startx") => {
            let start_x = param!(params, "StartX");
            to_response(device.set_start_x(start_x).await)
        }
        (Get, "starty") => to_response(device.start_y().await),
        (Put, "starty") => {
            let start_y = param!(params, "StartY");
            to_response(device.set_start_y(start_y).await)
        }
        (Put, "abortexposure") => to_response(device.abort_exposure().await),
        (Put, "stopexposure") => to_response(device.stop_exposure().await),
        (Get, "subexposureduration") => to_response(device.sub_exposure_duration().await),
        (Put, "subexposureduration") => {
            let duration = param!(params, "SubExposureDuration");
            to_response(device.set_sub_exposure_duration(duration).await)
        }
        _ => return None,
    })
}

#[allow(clippy::too_many_lines)]
async fn telescope_action(
    device: &dyn Telescope,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "alignmentmode") => to_response(device.alignment_mode().await),
        (Get, "altitude") => to_response(device.altitude().await),
        (Get, "azimuth") => to_response(device.azimuth().await),
        (Get, "athome") => to_response(device.at_home().await),
        (Get, "atpark") => to_response(device.at_park().await),
        (Get, "canfindhome") => to_response(device.can_find_home().await),
        (Get, "canmoveaxis") => {
            let axis = param!(params, "Axis" as TelescopeAxis);
            to_response(device.can_move_axis(axis).await)
        }
        (Get, "canpark") => to_response(device.can_park().await),
        (Get, "canpulseguide") => to_response(device.can_pulse_guide().await),
        (Get, "cansetguiderates") => to_response(device.can_set_guide_rates().await),
        (Get, "cansettracking") => to_response(device.can_set_tracking().await),
        (Get, "canslew") => to_response(device.can_slew().await),
        (Get, "canslewasync") => to_response(device.can_slew_async().await),
        (Get, "cansync") => to_response(device.can_sync().await),
        (Get, "canunpark") => to_response(device.can_unpark().await),
        (Get, "declination") => to_response(device.declination().await),
        (Get, "declinationrate") => to_response(device.declination_rate().await),
        (Get, "equatorialsystem") => to_response(device.equatorial_system().await),
        (Get, "guideratedeclination") => to_response(device.guide_rate_declination().await),
        (Put, "guideratedeclination") => {
            let rate = param!(params, "GuideRateDeclination");
            to_response(device.set_guide_rate_declination(rate).await)
        }
        (Get, "guideraterightascension") => {
            to_response(device.guide_rate_right_ascension().await)
        }
        (Put, "guideraterightascension") => {
            let rate = param!(params, "GuideRateRightAscension");
            to_response(device.set_guide_rate_right_ascension(rate).await)
        }
        (Get, "ispulseguiding") => to_response(device.is_pulse_guiding().await),
        (Get, "rightascension") => to_response(device.right_ascension().await),
        (Get, "rightascensionrate") => to_response(device.right_ascension_rate().await),
        (Get, "sideofpier") => to_response(device.side_of_pier().await),
        (Get, "siderealtime") => to_response(device.sidereal_time().await),
        (Get, "siteelevation") => to_response(device.site_elevation().await),
        (Put, "siteelevation") => {
            let elevation = param!(params, "SiteElevation");
            to_response(device.set_site_elevation(elevation).await)
        }
        (Get, "sitelatitude") => to_response(device.site_latitude().await),
        (Put, "sitelatitude") => {
            let latitude = param!(params, "SiteLatitude");
            to_response(device.set_site_latitude(latitude).await)
        }
        (Get, "sitelongitude") => to_response(device.site_longitude().await),
        (Put, "sitelongitude") => {
            let longitude = param!(params, "SiteLongitude");
            to_response(device.set_site_longitude(longitude).await)
        }
        (Get, "slewing") => to_response(device.slewing().await),
        (Get, "targetdeclination") => to_response(device.target_declination().await),
        (Put, "targetdeclination") => {
            let target = param!(params, "TargetDeclination");
            to_response(device.set_target_declination(target).await)
        }
        (Get, "targetrightascension") => to_response(device.target_right_ascension().await),
        (Put, "targetrightascension") => {
            let target = param!(params, "TargetRightAscension");
            to_response(device.set_target_right_ascension(target).await)
        }
        (Get, "tracking") => to_response(device.tracking().await),
        (Put, "tracking") => {
            let tracking = param!(params, "Tracking");
            to_response(device.set_tracking(tracking).await)
        }
        (Get, "trackingrate") => to_response(device.tracking_rate().await),
        (Put, "trackingrate") => {
            let rate = param!(params, "TrackingRate" as DriveRate);
            to_response(device.set_tracking_rate(rate).await)
        }
        (Get, "trackingrates") => to_response(device.tracking_rates().await),
        (Get, "utcdate") => to_response(device.utc_date().await.map(Iso8601Time::from)),
        (Put, "utcdate") => {
            let raw: String = param!(params, "UTCDate");
            match Iso8601Time::parse(&raw) {
                Ok(utc_date) => to_response(device.set_utc_date(utc_date).await),
                Err(err) => Err(ASCOMError::invalid_value(format_args!(
                    "Invalid UTCDate {raw:?}: {err}"
                ))),
            }
        }
        (Put, "abortslew") => to_response(device.abort_slew().await),
        (Get, "axisrates") => {
            let axis = param!(params, "Axis" as TelescopeAxis);
            to_response(device.axis_rates(axis).await)
        }
        (Put, "findhome") => to_response(device.find_home().await),
        (Put, "moveaxis") => {
            let axis = param!(params, "Axis" as TelescopeAxis);
            let rate = param!(params, "Rate");
            to_response(device.move_axis(axis, rate).await)
        }
        (Put, "park") => to_response(device.park().await),
        (Put, "unpark") => to_response(device.unpark().await),
        (Put, "pulseguide") => {
            let direction = param!(params, "Direction" as GuideDirection);
            let duration = param!(params, "Duration");
            to_response(device.pulse_guide(direction, duration).await)
        }
        (Put, "slewtocoordinates") => {
            let right_ascension = param!(params, "RightAscension");
            let declination = param!(params, "Declination");
            to_response(device.slew_to_coordinates(right_ascension, declination).await)
        }
        (Put, "slewtocoordinatesasync") => {
            let right_ascension = param!(params, "RightAscension");
            let declination = param!(params, "Declination");
            to_response(
                device
                    .slew_to_coordinates_async(right_ascension, declination)
                    .await,
            )
        }
        (Put, "slewtotarget") => to_response(device.slew_to_target().await),
        (Put, "slewtotargetasync") => to_response(device.slew_to_target_async().await),
        (Put, "synctocoordinates") => {
            let right_ascension = param!(params, "RightAscension");
            let declination = param!(params, "Declination");
            to_response(device.sync_to_coordinates(right_ascension, declination).await)
        }
        (Put, "synctotarget") => to_response(device.sync_to_target().await),
        _ => return None,
    })
}

async fn focuser_action(
    device: &dyn Focuser,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "absolute") => to_response(device.absolute().await),
        (Get, "ismoving") => to_response(device.is_moving().await),
        (Get, "maxincrement") => to_response(device.max_increment().await),
        (Get, "maxstep") => to_response(device.max_step().await),
        (Get, "position") => to_response(device.position().await),
        (Get, "stepsize") => to_response(device.step_size().await),
        (Get, "tempcomp") => to_response(device.temp_comp().await),
        (Put, "tempcomp") => {
            let temp_comp = param!(params, "TempComp");
            to_response(device.set_temp_comp(temp_comp).await)
        }
        (Get, "tempcompavailable") => to_response(device.temp_comp_available().await),
        (Get, "temperature") => to_response(device.temperature().await),
        (Put, "halt") => to_response(device.halt().await),
        (Put, "move") => {
            let position = param!(params, "Position");
            to_response(device.move_to(position).await)
        }
        _ => return None,
    })
}

async fn filter_wheel_action(
    device: &dyn FilterWheel,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "focusoffsets") => to_response(device.focus_offsets().await),
        (Get, "names") => to_response(device.names().await),
        (Get, "position") => to_response(device.position().await),
        (Put, "position") => {
            let position = param!(params, "Position");
            to_response(device.set_position(position).await)
        }
        _ => return None,
    })
}

async fn rotator_action(
    device: &dyn Rotator,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "canreverse") => to_response(device.can_reverse().await),
        (Get, "ismoving") => to_response(device.is_moving().await),
        (Get, "mechanicalposition") => to_response(device.mechanical_position().await),
        (Get, "position") => to_response(device.position().await),
        (Get, "reverse") => to_response(device.reversed().await),
        (Put, "reverse") => {
            let reverse = param!(params, "Reverse");
            to_response(device.set_reversed(reverse).await)
        }
        (Get, "stepsize") => to_response(device.step_size().await),
        (Get, "targetposition") => to_response(device.target_position().await),
        (Put, "halt") => to_response(device.halt().await),
        (Put, "move") => {
            let position = param!(params, "Position");
            to_response(device.move_relative(position).await)
        }
        (Put, "moveabsolute") => {
            let position = param!(params, "Position");
            to_response(device.move_absolute(position).await)
        }
        (Put, "movemechanical") => {
            let position = param!(params, "Position");
            to_response(device.move_mechanical(position).await)
        }
        (Put, "sync") => {
            let position = param!(params, "Position");
            to_response(device.sync(position).await)
        }
        _ => return None,
    })
}

async fn switch_action(
    device: &dyn Switch,
    method: Method,
    action: &str,
    params: &mut OpaqueParams,
) -> Option<ASCOMResult<OpaqueResponse>> {
    Some(match (method, action) {
        (Get, "maxswitch") => to_response(device.max_switch().await),
        (Get, "canwrite") => {
            let id = param!(params, "Id");
            to_response(device.can_write(id).await)
        }
        (Get, "getswitch") => {
            let id = param!(params, "Id");
            to_response(device.get_switch(id).await)
        }
        (Get, "getswitchdescription") => {
            let id = param!(params, "Id");
            to_response(device.get_switch_description(id).await)
        }
        (Get, "getswitchname") => {
            let id = param!(params, "Id");
            to_response(device.get_switch_name(id).await)
        }
        (Get, "getswitchvalue") => {
            let id = param!(params, "Id");
            to_response(device.get_switch_value(id).await)
        }
        (Get, "minswitchvalue") => {
            let id = param!(params, "Id");
            to_response(device.min_switch_value(id).await)
        }
        (Get, "maxswitchvalue") => {
            let id = param!(params, "Id");
            to_response(device.max_switch_value(id).await)
        }
        (Get, "switchstep") => {
            let id = param!(params, "Id");
            to_response(device.switch_step(id).await)
        }
        (Put, "setswitch") => {
            let id = param!(params, "Id");
            let state = param!(params, "State");
            to_response(device.set_switch(id, state).await)
        }
        (Put, "setswitchname") => {
            let id = param!(params, "Id");
            let name = param!(params, "Name");
            to_response(device.set_switch_name(id, name).await)
        }
        (Put, "setswitchvalue") => {
            let id = param!(params, "Id");
            let value = param!(params, "Value");
            to_response(device.set_switch_value(id, value).await)
        }
        _ => return None,
    })
}
