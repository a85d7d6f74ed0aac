//! In-process stand-in for a vendor camera library.
//!
//! Produces deterministic gradient frames so the exposure pipeline, image
//! packing and both wire forms can be exercised without hardware. Doubles
//! as the `--simulated-camera` device of the hub binary.

use super::sdk::{Area, CameraSdk, ChipInfo, ControlParam, Frame, SdkError, SdkResult};
use std::sync::Mutex;

const SENSOR_WIDTH: u32 = 64;
const SENSOR_HEIGHT: u32 = 48;
/// Overscan border on each edge of the simulated sensor.
const OVERSCAN: u32 = 4;

#[derive(Debug)]
struct SimState {
    open: bool,
    bin: u32,
    resolution: Area,
    readout_mode: u32,
    gain: f64,
    offset: f64,
    exposure_us: f64,
    usb_traffic: f64,
    cooler_target: f64,
    cooler_pwm: f64,
    temperature: f64,
    exposing: bool,
    frame_counter: u32,
    filter_position: u32,
}

/// A simulated 16-bit monochrome camera with a 5-slot filter wheel.
#[derive(Debug)]
pub struct SimulatedCamera {
    state: Mutex<SimState>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self {
            state: Mutex::new(SimState {
                open: false,
                bin: 1,
                resolution: Area {
                    start_x: 0,
                    start_y: 0,
                    width: SENSOR_WIDTH - 2 * OVERSCAN,
                    height: SENSOR_HEIGHT - 2 * OVERSCAN,
                },
                readout_mode: 0,
                gain: 26.0,
                offset: 30.0,
                exposure_us: 10_000.0,
                usb_traffic: 20.0,
                cooler_target: 0.0,
                cooler_pwm: 0.0,
                temperature: 21.5,
                exposing: false,
                frame_counter: 0,
                filter_position: 0,
            }),
        }
    }
}

impl SimulatedCamera {
    fn with_open<T>(&self, f: impl FnOnce(&mut SimState) -> SdkResult<T>) -> SdkResult<T> {
        let mut state = self.state.lock().expect("simulator state poisoned");
        if !state.open {
            return Err(SdkError::new("Camera is not open"));
        }
        f(&mut state)
    }
}

impl CameraSdk for SimulatedCamera {
    fn open(&self) -> SdkResult<()> {
        self.state.lock().expect("simulator state poisoned").open = true;
        Ok(())
    }

    fn close(&self) -> SdkResult<()> {
        self.state.lock().expect("simulator state poisoned").open = false;
        Ok(())
    }

    fn serial(&self) -> String {
        "SIM-0001".to_owned()
    }

    fn chip_info(&self) -> SdkResult<ChipInfo> {
        self.with_open(|_| {
            Ok(ChipInfo {
                sensor_name: "SIM285".to_owned(),
                image_width: SENSOR_WIDTH,
                image_height: SENSOR_HEIGHT,
                pixel_width: 6.45,
                pixel_height: 6.45,
                bits_per_pixel: 16,
                max_bin: 2,
                has_shutter: false,
                has_cooler: true,
                electrons_per_adu: 0.45,
                full_well_capacity: 18_000.0,
            })
        })
    }

    fn readout_modes(&self) -> SdkResult<Vec<String>> {
        self.with_open(|_| Ok(vec!["Standard".to_owned(), "High Gain".to_owned()]))
    }

    fn set_readout_mode(&self, index: u32) -> SdkResult<()> {
        self.with_open(|state| {
            if index > 1 {
                return Err(SdkError::new("No such readout mode"));
            }
            state.readout_mode = index;
            Ok(())
        })
    }

    fn effective_area(&self) -> SdkResult<Area> {
        self.with_open(|_| {
            Ok(Area {
                start_x: OVERSCAN,
                start_y: OVERSCAN,
                width: SENSOR_WIDTH - 2 * OVERSCAN,
                height: SENSOR_HEIGHT - 2 * OVERSCAN,
            })
        })
    }

    fn set_bin(&self, bin: u32) -> SdkResult<()> {
        self.with_open(|state| {
            if !(1..=2).contains(&bin) {
                return Err(SdkError::new("Unsupported bin factor"));
            }
            state.bin = bin;
            Ok(())
        })
    }

    fn set_resolution(&self, area: Area) -> SdkResult<()> {
        self.with_open(|state| {
            state.resolution = area;
            Ok(())
        })
    }

    fn param(&self, param: ControlParam) -> SdkResult<f64> {
        self.with_open(|state| {
            Ok(match param {
                ControlParam::Exposure => state.exposure_us,
                ControlParam::Gain => state.gain,
                ControlParam::Offset => state.offset,
                ControlParam::UsbTraffic => state.usb_traffic,
                ControlParam::CoolerTargetTemp => state.cooler_target,
                ControlParam::CoolerPwm => state.cooler_pwm,
                ControlParam::CurrentTemp => {
                    // Drift towards the target while the cooler runs.
                    if state.cooler_pwm > 0.0 {
                        state.temperature += (state.cooler_target - state.temperature) * 0.25;
                    }
                    state.temperature
                }
            })
        })
    }

    fn set_param(&self, param: ControlParam, value: f64) -> SdkResult<()> {
        self.with_open(|state| {
            match param {
                ControlParam::Exposure => state.exposure_us = value,
                ControlParam::Gain => state.gain = value,
                ControlParam::Offset => state.offset = value,
                ControlParam::UsbTraffic => state.usb_traffic = value,
                ControlParam::CoolerTargetTemp => {
                    state.cooler_target = value;
                    if state.cooler_pwm == 0.0 {
                        state.cooler_pwm = 128.0;
                    }
                }
                ControlParam::CoolerPwm => state.cooler_pwm = value,
                ControlParam::CurrentTemp => {
                    return Err(SdkError::new("Temperature is read-only"));
                }
            }
            Ok(())
        })
    }

    fn param_limits(&self, param: ControlParam) -> SdkResult<(f64, f64, f64)> {
        self.with_open(|_| {
            Ok(match param {
                ControlParam::Exposure => (1_000.0, 3_600_000_000.0, 1_000.0),
                ControlParam::Gain => (0.0, 100.0, 1.0),
                ControlParam::Offset => (0.0, 255.0, 1.0),
                ControlParam::UsbTraffic => (0.0, 60.0, 1.0),
                ControlParam::CoolerTargetTemp => (-40.0, 20.0, 0.1),
                ControlParam::CoolerPwm => (0.0, 255.0, 1.0),
                ControlParam::CurrentTemp => (-50.0, 60.0, 0.1),
            })
        })
    }

    fn start_exposure(&self) -> SdkResult<()> {
        self.with_open(|state| {
            state.exposing = true;
            Ok(())
        })
    }

    fn cancel_exposure(&self) -> SdkResult<()> {
        self.with_open(|state| {
            state.exposing = false;
            Ok(())
        })
    }

    fn read_frame(&self) -> SdkResult<Frame> {
        self.with_open(|state| {
            state.exposing = false;
            state.frame_counter = state.frame_counter.wrapping_add(1);
            let width = state.resolution.width;
            let height = state.resolution.height;
            let mut data = Vec::with_capacity((width * height * 2) as usize);
            for y in 0..height {
                for x in 0..width {
                    #[allow(clippy::cast_possible_truncation)]
                    let sample =
                        ((x + y * width + state.frame_counter) % u32::from(u16::MAX)) as u16;
                    data.extend_from_slice(&sample.to_le_bytes());
                }
            }
            Ok(Frame {
                width,
                height,
                bits_per_pixel: 16,
                data,
            })
        })
    }

    fn filter_wheel_slots(&self) -> u32 {
        5
    }

    fn filter_wheel_position(&self) -> SdkResult<u32> {
        self.with_open(|state| Ok(state.filter_position))
    }

    fn set_filter_wheel_position(&self, slot: u32) -> SdkResult<()> {
        self.with_open(|state| {
            if slot >= 5 {
                return Err(SdkError::new("No such filter slot"));
            }
            state.filter_position = slot;
            Ok(())
        })
    }
}
