//! Vendor-SDK-backed camera driver and its exposure engine.
//!
//! The driver owns two background tasks while connected: a cooler loop that
//! re-asserts the set-point and refreshes temperature caches about once a
//! second, and a transient exposure task that walks the
//! `IDLE -> EXPOSING -> READING -> IDLE` state machine and swaps the packed
//! frame buffer in under the device mutex.

pub mod sdk;
mod sim;
pub use sim::SimulatedCamera;

mod filter_wheel;
pub use filter_wheel::CameraFilterWheel;

use crate::api::{Camera, CameraState, Device, ImageArray, SensorType};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use sdk::{Area, CameraSdk, ChipInfo, ControlParam, SdkResult};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Cooler set-point reassertion interval.
const COOLER_INTERVAL: Duration = Duration::from_secs(1);
/// Default USB bus throughput throttle applied at connect.
const DEFAULT_USB_TRAFFIC: f64 = 20.0;

/// Sensors whose effective-area report doubles the row count; their
/// height is halved after the overscan calculation.
const HALF_HEIGHT_SENSORS: &[&str] = &["IMX492"];

/// How a tunable (gain or offset) is presented to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPresentation {
    /// Clients see a list of discrete labels and write an index into it.
    Index,
    /// Clients read and write raw hardware units bounded by min/max.
    Value,
}

/// Resolved presentation of a tunable after probing hardware limits.
#[derive(Debug, Clone)]
enum ControlMode {
    Index { labels: Vec<String> },
    Value { min: i32, max: i32 },
}

impl ControlMode {
    #[allow(clippy::cast_possible_truncation)]
    fn probe(presentation: ControlPresentation, limits: (f64, f64, f64)) -> Self {
        let (min, max, _step) = limits;
        match presentation {
            ControlPresentation::Index => Self::Index {
                labels: ((min as i64)..=(max as i64))
                    .map(|value| value.to_string())
                    .collect(),
            },
            ControlPresentation::Value => Self::Value {
                min: min as i32,
                max: max as i32,
            },
        }
    }

    /// Translate a client-facing value into hardware units.
    fn to_hardware(&self, value: i32, what: &str) -> ASCOMResult<f64> {
        match self {
            Self::Index { labels } => {
                let index = usize::try_from(value).ok().filter(|&i| i < labels.len());
                let Some(index) = index else {
                    return Err(ASCOMError::invalid_value(format_args!(
                        "{what} index {value} is out of range"
                    )));
                };
                // Labels are stringified hardware values, so a list starting
                // at "1" transparently bridges 1-based hardware indices.
                labels[index].parse().map_err(|_| {
                    ASCOMError::invalid_value(format_args!("{what} label is not numeric"))
                })
            }
            Self::Value { min, max } => {
                if (*min..=*max).contains(&value) {
                    Ok(f64::from(value))
                } else {
                    Err(ASCOMError::invalid_value(format_args!(
                        "{what} {value} is not within {min} - {max}"
                    )))
                }
            }
        }
    }

    /// Translate a hardware reading into the client-facing value.
    #[allow(clippy::cast_possible_truncation)]
    fn from_hardware(&self, hardware: f64) -> i32 {
        match self {
            Self::Index { labels } => {
                let raw = format!("{}", hardware as i64);
                i32::try_from(
                    labels
                        .iter()
                        .position(|label| *label == raw)
                        .unwrap_or(0),
                )
                .unwrap_or(0)
            }
            Self::Value { .. } => hardware as i32,
        }
    }
}

#[derive(Debug)]
struct ExposureControl {
    stop: Arc<Notify>,
    abort: CancellationToken,
}

#[derive(Debug, Default)]
struct CamState {
    camera_state: CameraState,
    chip: Option<ChipInfo>,
    readout_modes: Vec<String>,
    readout_mode: u32,
    bin: u32,
    bin_changed: bool,
    start_x: u32,
    start_y: u32,
    num_x: u32,
    num_y: u32,
    effective: Option<Area>,
    gain_mode: Option<ControlMode>,
    offset_mode: Option<ControlMode>,
    gain: i32,
    offset: i32,
    exposure_min: f64,
    exposure_max: f64,
    exposure_step: f64,
    cooler_on: bool,
    set_point: f64,
    cached_temperature: f64,
    cached_cooler_power: f64,
    fast_readout: bool,
    last_exposure_duration: Option<f64>,
    last_exposure_start: Option<SystemTime>,
    exposure_started: Option<Instant>,
    current_duration: f64,
    image: Option<ImageArray>,
    image_ready: bool,
    exposure_ctl: Option<ExposureControl>,
}

#[derive(Debug)]
struct Connection {
    cancel: CancellationToken,
    tasks: TaskTracker,
}

/// A cooled camera behind a vendor SDK handle.
#[derive(Debug)]
pub struct SdkCamera {
    name: String,
    unique_id: String,
    sdk: Arc<dyn CameraSdk>,
    include_overscan: bool,
    gain_presentation: ControlPresentation,
    offset_presentation: ControlPresentation,
    state: Arc<Mutex<CamState>>,
    connection: RwLock<Option<Connection>>,
}

/// Runs a blocking SDK call on the blocking pool.
async fn blocking<T: Send + 'static>(
    sdk: &Arc<dyn CameraSdk>,
    f: impl FnOnce(&dyn CameraSdk) -> SdkResult<T> + Send + 'static,
) -> ASCOMResult<T> {
    let sdk = Arc::clone(sdk);
    tokio::task::spawn_blocking(move || f(sdk.as_ref()))
        .await
        .map_err(|err| ASCOMError::driver_error(format_args!("SDK call panicked: {err}")))?
        .map_err(Into::into)
}

fn lock_state(state: &Mutex<CamState>) -> MutexGuard<'_, CamState> {
    state.lock().expect("camera state poisoned")
}

impl SdkCamera {
    /// Creates a camera driver over the given SDK handle.
    pub fn new(
        name: impl Into<String>,
        sdk: Arc<dyn CameraSdk>,
        include_overscan: bool,
        gain_presentation: ControlPresentation,
        offset_presentation: ControlPresentation,
    ) -> Self {
        let unique_id = sdk.serial();
        Self {
            name: name.into(),
            unique_id,
            sdk,
            include_overscan,
            gain_presentation,
            offset_presentation,
            state: Arc::new(Mutex::new(CamState {
                bin: 1,
                ..CamState::default()
            })),
            connection: RwLock::new(None),
        }
    }

    /// The SDK handle shared with a nested filter wheel device.
    pub fn sdk_handle(&self) -> Arc<dyn CameraSdk> {
        Arc::clone(&self.sdk)
    }

    fn lock(&self) -> MutexGuard<'_, CamState> {
        lock_state(&self.state)
    }

    fn ensure_connected(&self) -> ASCOMResult {
        if self
            .connection
            .read()
            .expect("connection lock poisoned")
            .is_some()
        {
            Ok(())
        } else {
            Err(ASCOMError::NOT_CONNECTED)
        }
    }

    fn chip(&self) -> ASCOMResult<ChipInfo> {
        self.ensure_connected()?;
        self.lock()
            .chip
            .clone()
            .ok_or_else(|| ASCOMError::driver_error("Sensor information was never probed"))
    }

    /// (Re)derives the overscan-cropped capture geometry and resets the ROI.
    async fn derive_geometry(&self) -> ASCOMResult {
        let chip = blocking(&self.sdk, |sdk| CameraSdk::chip_info(sdk)).await?;
        let mut effective = if self.include_overscan {
            Area {
                start_x: 0,
                start_y: 0,
                width: chip.image_width,
                height: chip.image_height,
            }
        } else {
            blocking(&self.sdk, |sdk| CameraSdk::effective_area(sdk)).await?
        };

        // Model-specific report quirk: some sensors double the row count in
        // their effective-area report.
        if HALF_HEIGHT_SENSORS.contains(&chip.sensor_name.as_str())
            && effective.height > effective.width
        {
            tracing::debug!(
                sensor = chip.sensor_name,
                "Halving reported effective height"
            );
            effective.height /= 2;
        }

        let mut state = self.lock();
        let bin = state.bin;
        state.chip = Some(chip);
        state.effective = Some(effective);
        state.start_x = 0;
        state.start_y = 0;
        state.num_x = effective.width / bin;
        state.num_y = effective.height / bin;
        Ok(())
    }

    async fn initialize(&self) -> ASCOMResult {
        let readout_modes = blocking(&self.sdk, |sdk| CameraSdk::readout_modes(sdk)).await?;
        let readout_mode = self.lock().readout_mode;
        blocking(&self.sdk, move |sdk| sdk.set_readout_mode(readout_mode)).await?;
        let bin = self.lock().bin;
        blocking(&self.sdk, move |sdk| sdk.set_bin(bin)).await?;
        self.derive_geometry().await?;

        let gain_limits = blocking(&self.sdk, |sdk| sdk.param_limits(ControlParam::Gain)).await?;
        let offset_limits =
            blocking(&self.sdk, |sdk| sdk.param_limits(ControlParam::Offset)).await?;
        let exposure_limits =
            blocking(&self.sdk, |sdk| sdk.param_limits(ControlParam::Exposure)).await?;
        let gain_hw = blocking(&self.sdk, |sdk| sdk.param(ControlParam::Gain)).await?;
        let offset_hw = blocking(&self.sdk, |sdk| sdk.param(ControlParam::Offset)).await?;
        blocking(&self.sdk, |sdk| {
            sdk.set_param(ControlParam::UsbTraffic, DEFAULT_USB_TRAFFIC)
        })
        .await?;

        let mut state = self.lock();
        let gain_mode = ControlMode::probe(self.gain_presentation, gain_limits);
        let offset_mode = ControlMode::probe(self.offset_presentation, offset_limits);
        state.gain = gain_mode.from_hardware(gain_hw);
        state.offset = offset_mode.from_hardware(offset_hw);
        state.gain_mode = Some(gain_mode);
        state.offset_mode = Some(offset_mode);
        state.readout_modes = readout_modes;
        // Exposure limits arrive in microseconds.
        state.exposure_min = exposure_limits.0 / 1e6;
        state.exposure_max = exposure_limits.1 / 1e6;
        state.exposure_step = exposure_limits.2 / 1e6;
        Ok(())
    }

    fn gain_mode(&self) -> ASCOMResult<ControlMode> {
        self.ensure_connected()?;
        self.lock()
            .gain_mode
            .clone()
            .ok_or_else(|| ASCOMError::driver_error("Gain limits were never probed"))
    }

    fn offset_mode(&self) -> ASCOMResult<ControlMode> {
        self.ensure_connected()?;
        self.lock()
            .offset_mode
            .clone()
            .ok_or_else(|| ASCOMError::driver_error("Offset limits were never probed"))
    }

    /// Spawns the transient exposure task.
    fn spawn_exposure_task(&self, duration: f64) -> ASCOMResult {
        let connection = self.connection.read().expect("connection lock poisoned");
        let Some(connection) = connection.as_ref() else {
            return Err(ASCOMError::NOT_CONNECTED);
        };

        let stop = Arc::new(Notify::new());
        let abort = connection.cancel.child_token();
        {
            let mut state = self.lock();
            state.exposure_ctl = Some(ExposureControl {
                stop: Arc::clone(&stop),
                abort: abort.clone(),
            });
        }

        let sdk = Arc::clone(&self.sdk);
        let state = Arc::clone(&self.state);
        let _ = connection.tasks.spawn(async move {
            if let Err(err) = blocking(&sdk, |sdk| CameraSdk::start_exposure(sdk)).await {
                tracing::error!(%err, "Failed to start exposing frame");
                let mut state = lock_state(&state);
                state.camera_state = CameraState::Error;
                state.exposure_ctl = None;
                return;
            }

            tokio::select! {
                () = abort.cancelled() => {
                    tracing::debug!("Exposure aborted");
                    if let Err(err) = blocking(&sdk, |sdk| CameraSdk::cancel_exposure(sdk)).await {
                        tracing::warn!(%err, "Problem cancelling exposure");
                    }
                    let mut state = lock_state(&state);
                    state.camera_state = CameraState::Idle;
                    state.exposure_ctl = None;
                    return;
                }
                () = stop.notified() => tracing::debug!("Exposure stopped early, reading out"),
                () = tokio::time::sleep(Duration::from_secs_f64(duration)) => {}
            }

            lock_state(&state).camera_state = CameraState::Reading;

            match blocking(&sdk, |sdk| CameraSdk::read_frame(sdk)).await {
                Ok(frame) => {
                    let packed = ImageArray::from_raw(
                        frame.width as usize,
                        frame.height as usize,
                        frame.bits_per_pixel,
                        &frame.data,
                    );
                    let mut state = lock_state(&state);
                    match packed {
                        Ok(image) => {
                            state.image = Some(image);
                            state.image_ready = true;
                            state.camera_state = CameraState::Idle;
                        }
                        Err(err) => {
                            tracing::error!(%err, "Frame buffer does not match geometry");
                            state.camera_state = CameraState::Error;
                        }
                    }
                    state.exposure_ctl = None;
                }
                Err(err) => {
                    tracing::error!(%err, "Problem reading frame from camera");
                    let mut state = lock_state(&state);
                    state.camera_state = CameraState::Error;
                    state.exposure_ctl = None;
                }
            }
        });
        Ok(())
    }
}

#[async_trait]
impl Device for SdkCamera {
    fn static_name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    async fn connected(&self) -> ASCOMResult<bool> {
        Ok(self
            .connection
            .read()
            .expect("connection lock poisoned")
            .is_some())
    }

    async fn set_connected(&self, connected: bool) -> ASCOMResult {
        if connected == self.connected().await? {
            tracing::warn!(connected, "set_connected called but already in that state");
            return Ok(());
        }

        if connected {
            blocking(&self.sdk, |sdk| CameraSdk::open(sdk)).await?;
            if let Err(err) = self.initialize().await {
                let _ = blocking(&self.sdk, |sdk| CameraSdk::close(sdk)).await;
                return Err(err);
            }

            let cancel = CancellationToken::new();
            let tasks = TaskTracker::new();
            {
                let sdk = Arc::clone(&self.sdk);
                let state = Arc::clone(&self.state);
                let cancel = cancel.clone();
                let _ = tasks.spawn(async move {
                    loop {
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(COOLER_INTERVAL) => {}
                        }
                        let (cooler_on, set_point, reading) = {
                            let state = lock_state(&state);
                            (
                                state.cooler_on,
                                state.set_point,
                                state.camera_state == CameraState::Reading,
                            )
                        };
                        // The SDK can't take cooler traffic while a frame is
                        // being digitized.
                        if reading {
                            continue;
                        }
                        if cooler_on {
                            if let Err(err) = blocking(&sdk, move |sdk| {
                                sdk.set_param(ControlParam::CoolerTargetTemp, set_point)
                            })
                            .await
                            {
                                tracing::warn!(%err, "Problem re-asserting cooler set-point");
                            }
                        }
                        if let Ok(temperature) =
                            blocking(&sdk, |sdk| sdk.param(ControlParam::CurrentTemp)).await
                        {
                            lock_state(&state).cached_temperature = temperature;
                        }
                        if let Ok(pwm) =
                            blocking(&sdk, |sdk| sdk.param(ControlParam::CoolerPwm)).await
                        {
                            lock_state(&state).cached_cooler_power = pwm / 255.0 * 100.0;
                        }
                    }
                    tracing::debug!("Cooler loop stopped");
                });
            }

            *self.connection.write().expect("connection lock poisoned") = Some(Connection {
                cancel,
                tasks,
            });
        } else {
            let connection = self
                .connection
                .write()
                .expect("connection lock poisoned")
                .take();
            if let Some(connection) = connection {
                connection.cancel.cancel();
                connection.tasks.close();
                connection.tasks.wait().await;
            }
            blocking(&self.sdk, |sdk| CameraSdk::close(sdk)).await?;
            *self.lock() = CamState {
                bin: 1,
                ..CamState::default()
            };
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Cooled astronomy camera".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " camera driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl Camera for SdkCamera {
    async fn bin_x(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(i32::try_from(self.lock().bin).expect("bin factor fits in i32"))
    }

    async fn set_bin_x(&self, bin_x: i32) -> ASCOMResult {
        let chip = self.chip()?;
        let bin = u32::try_from(bin_x)
            .ok()
            .filter(|&bin| bin >= 1 && bin <= chip.max_bin)
            .ok_or_else(|| {
                ASCOMError::invalid_value(format_args!(
                    "Bin factor {bin_x} is not within 1 - {}",
                    chip.max_bin
                ))
            })?;
        let mut state = self.lock();
        if state.bin != bin {
            state.bin = bin;
            state.bin_changed = true;
            if let Some(effective) = state.effective {
                state.start_x = 0;
                state.start_y = 0;
                state.num_x = effective.width / bin;
                state.num_y = effective.height / bin;
            }
        }
        Ok(())
    }

    async fn bin_y(&self) -> ASCOMResult<i32> {
        self.bin_x().await
    }

    async fn set_bin_y(&self, bin_y: i32) -> ASCOMResult {
        // Binning is symmetric; both axes share one factor.
        self.set_bin_x(bin_y).await
    }

    async fn camera_state(&self) -> ASCOMResult<CameraState> {
        self.ensure_connected()?;
        Ok(self.lock().camera_state)
    }

    async fn camera_xsize(&self) -> ASCOMResult<i32> {
        Ok(i32::try_from(self.chip()?.image_width).expect("chip width fits in i32"))
    }

    async fn camera_ysize(&self) -> ASCOMResult<i32> {
        Ok(i32::try_from(self.chip()?.image_height).expect("chip height fits in i32"))
    }

    async fn can_abort_exposure(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_get_cooler_power(&self) -> ASCOMResult<bool> {
        Ok(self.chip()?.has_cooler)
    }

    async fn can_set_ccd_temperature(&self) -> ASCOMResult<bool> {
        Ok(self.chip()?.has_cooler)
    }

    async fn can_stop_exposure(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn ccd_temperature(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        if self.lock().camera_state == CameraState::Reading {
            return Ok(self.lock().cached_temperature);
        }
        let temperature = blocking(&self.sdk, |sdk| sdk.param(ControlParam::CurrentTemp)).await?;
        self.lock().cached_temperature = temperature;
        Ok(temperature)
    }

    async fn cooler_on(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().cooler_on)
    }

    async fn set_cooler_on(&self, cooler_on: bool) -> ASCOMResult {
        self.ensure_connected()?;
        self.lock().cooler_on = cooler_on;
        if !cooler_on {
            blocking(&self.sdk, |sdk| sdk.set_param(ControlParam::CoolerPwm, 0.0)).await?;
        }
        Ok(())
    }

    async fn cooler_power(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        if self.lock().camera_state == CameraState::Reading {
            return Ok(self.lock().cached_cooler_power);
        }
        let pwm = blocking(&self.sdk, |sdk| sdk.param(ControlParam::CoolerPwm)).await?;
        let percent = pwm / 255.0 * 100.0;
        self.lock().cached_cooler_power = percent;
        Ok(percent)
    }

    async fn electrons_per_adu(&self) -> ASCOMResult<f64> {
        Ok(self.chip()?.electrons_per_adu)
    }

    async fn exposure_max(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().exposure_max)
    }

    async fn exposure_min(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().exposure_min)
    }

    async fn exposure_resolution(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().exposure_step)
    }

    async fn fast_readout(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().fast_readout)
    }

    async fn set_fast_readout(&self, fast_readout: bool) -> ASCOMResult {
        self.ensure_connected()?;
        self.lock().fast_readout = fast_readout;
        Ok(())
    }

    async fn full_well_capacity(&self) -> ASCOMResult<f64> {
        Ok(self.chip()?.full_well_capacity)
    }

    async fn gain(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(self.lock().gain)
    }

    async fn set_gain(&self, gain: i32) -> ASCOMResult {
        let hardware = self.gain_mode()?.to_hardware(gain, "Gain")?;
        blocking(&self.sdk, move |sdk| {
            sdk.set_param(ControlParam::Gain, hardware)
        })
        .await?;
        self.lock().gain = gain;
        Ok(())
    }

    async fn gain_max(&self) -> ASCOMResult<i32> {
        match self.gain_mode()? {
            ControlMode::Value { max, .. } => Ok(max),
            ControlMode::Index { .. } => Err(ASCOMError::NOT_IMPLEMENTED),
        }
    }

    async fn gain_min(&self) -> ASCOMResult<i32> {
        match self.gain_mode()? {
            ControlMode::Value { min, .. } => Ok(min),
            ControlMode::Index { .. } => Err(ASCOMError::NOT_IMPLEMENTED),
        }
    }

    async fn gains(&self) -> ASCOMResult<Vec<String>> {
        match self.gain_mode()? {
            ControlMode::Index { labels } => Ok(labels),
            ControlMode::Value { .. } => Err(ASCOMError::NOT_IMPLEMENTED),
        }
    }

    async fn has_shutter(&self) -> ASCOMResult<bool> {
        Ok(self.chip()?.has_shutter)
    }

    async fn heat_sink_temperature(&self) -> ASCOMResult<f64> {
        self.ccd_temperature().await
    }

    async fn image_array(&self) -> ASCOMResult<ImageArray> {
        self.ensure_connected()?;
        let state = self.lock();
        if !state.image_ready {
            return Err(ASCOMError::invalid_operation("No image is ready"));
        }
        state
            .image
            .clone()
            .ok_or_else(|| ASCOMError::invalid_operation("No image is ready"))
    }

    async fn image_ready(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        let state = self.lock();
        Ok(state.camera_state == CameraState::Idle && state.image_ready)
    }

    async fn last_exposure_duration(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        self.lock()
            .last_exposure_duration
            .ok_or_else(|| ASCOMError::invalid_operation("No exposure has been taken"))
    }

    async fn last_exposure_start_time(&self) -> ASCOMResult<SystemTime> {
        self.ensure_connected()?;
        self.lock()
            .last_exposure_start
            .ok_or_else(|| ASCOMError::invalid_operation("No exposure has been taken"))
    }

    async fn max_adu(&self) -> ASCOMResult<i32> {
        let bits = self.chip()?.bits_per_pixel;
        Ok((1_i32 << bits) - 1)
    }

    async fn max_bin_x(&self) -> ASCOMResult<i32> {
        Ok(i32::try_from(self.chip()?.max_bin).expect("bin factor fits in i32"))
    }

    async fn max_bin_y(&self) -> ASCOMResult<i32> {
        self.max_bin_x().await
    }

    async fn num_x(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(i32::try_from(self.lock().num_x).expect("subframe width fits in i32"))
    }

    async fn set_num_x(&self, num_x: i32) -> ASCOMResult {
        self.ensure_connected()?;
        let num_x = u32::try_from(num_x).ok().filter(|&n| n >= 1).ok_or_else(|| {
            ASCOMError::invalid_value(format_args!("NumX {num_x} is not positive"))
        })?;
        self.lock().num_x = num_x;
        Ok(())
    }

    async fn num_y(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(i32::try_from(self.lock().num_y).expect("subframe height fits in i32"))
    }

    async fn set_num_y(&self, num_y: i32) -> ASCOMResult {
        self.ensure_connected()?;
        let num_y = u32::try_from(num_y).ok().filter(|&n| n >= 1).ok_or_else(|| {
            ASCOMError::invalid_value(format_args!("NumY {num_y} is not positive"))
        })?;
        self.lock().num_y = num_y;
        Ok(())
    }

    async fn offset(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(self.lock().offset)
    }

    async fn set_offset(&self, offset: i32) -> ASCOMResult {
        let hardware = self.offset_mode()?.to_hardware(offset, "Offset")?;
        blocking(&self.sdk, move |sdk| {
            sdk.set_param(ControlParam::Offset, hardware)
        })
        .await?;
        self.lock().offset = offset;
        Ok(())
    }

    async fn offset_max(&self) -> ASCOMResult<i32> {
        match self.offset_mode()? {
            ControlMode::Value { max, .. } => Ok(max),
            ControlMode::Index { .. } => Err(ASCOMError::NOT_IMPLEMENTED),
        }
    }

    async fn offset_min(&self) -> ASCOMResult<i32> {
        match self.offset_mode()? {
            ControlMode::Value { min, .. } => Ok(min),
            ControlMode::Index { .. } => Err(ASCOMError::NOT_IMPLEMENTED),
        }
    }

    async fn offsets(&self) -> ASCOMResult<Vec<String>> {
        match self.offset_mode()? {
            ControlMode::Index { labels } => Ok(labels),
            ControlMode::Value { .. } => Err(ASCOMError::NOT_IMPLEMENTED),
        }
    }

    async fn percent_completed(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        let state = self.lock();
        Ok(match state.camera_state {
            CameraState::Exposing => {
                let elapsed = state
                    .exposure_started
                    .map_or(0.0, |started| started.elapsed().as_secs_f64());
                #[allow(clippy::cast_possible_truncation)]
                let percent = ((elapsed / state.current_duration.max(f64::EPSILON)) * 100.0)
                    .min(100.0) as i32;
                percent
            }
            CameraState::Reading | CameraState::Download => 100,
            _ if state.image_ready => 100,
            _ => 0,
        })
    }

    async fn pixel_size_x(&self) -> ASCOMResult<f64> {
        Ok(self.chip()?.pixel_width)
    }

    async fn pixel_size_y(&self) -> ASCOMResult<f64> {
        Ok(self.chip()?.pixel_height)
    }

    async fn readout_mode(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(i32::try_from(self.lock().readout_mode).expect("readout mode fits in i32"))
    }

    async fn set_readout_mode(&self, readout_mode: i32) -> ASCOMResult {
        self.ensure_connected()?;
        let modes = self.lock().readout_modes.len();
        let index = u32::try_from(readout_mode)
            .ok()
            .filter(|&index| (index as usize) < modes)
            .ok_or_else(|| {
                ASCOMError::invalid_value(format_args!("Unknown readout mode {readout_mode}"))
            })?;
        blocking(&self.sdk, move |sdk| sdk.set_readout_mode(index)).await?;
        self.lock().readout_mode = index;
        // A mode switch can change the usable sensor area.
        self.derive_geometry().await
    }

    async fn readout_modes(&self) -> ASCOMResult<Vec<String>> {
        self.ensure_connected()?;
        Ok(self.lock().readout_modes.clone())
    }

    async fn sensor_name(&self) -> ASCOMResult<String> {
        Ok(self.chip()?.sensor_name)
    }

    async fn sensor_type(&self) -> ASCOMResult<SensorType> {
        self.ensure_connected()?;
        Ok(SensorType::Monochrome)
    }

    async fn set_ccd_temperature(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().set_point)
    }

    async fn set_set_ccd_temperature(&self, set_ccd_temperature: f64) -> ASCOMResult {
        self.ensure_connected()?;
        if !(-50.0..=50.0).contains(&set_ccd_temperature) {
            return Err(ASCOMError::invalid_value(
                "Set-point must be between -50 and 50 degrees C",
            ));
        }
        self.lock().set_point = set_ccd_temperature;
        let cooler_on = self.lock().cooler_on;
        if cooler_on {
            blocking(&self.sdk, move |sdk| {
                sdk.set_param(ControlParam::CoolerTargetTemp, set_ccd_temperature)
            })
            .await?;
        }
        Ok(())
    }

    async fn start_exposure(&self, duration: f64, light: bool) -> ASCOMResult {
        self.ensure_connected()?;

        let (bin, bin_changed, area) = {
            let state = self.lock();
            if state.camera_state != CameraState::Idle {
                return Err(ASCOMError::invalid_operation(
                    "An exposure is already in progress",
                ));
            }
            if !(state.exposure_min..=state.exposure_max).contains(&duration) {
                return Err(ASCOMError::invalid_value(format_args!(
                    "Exposure duration of {duration} is not within {} - {} seconds",
                    state.exposure_min, state.exposure_max
                )));
            }
            let effective = state
                .effective
                .ok_or_else(|| ASCOMError::driver_error("Capture geometry was never derived"))?;
            let max_width = effective.width / state.bin;
            let max_height = effective.height / state.bin;
            if state.start_x + state.num_x > max_width || state.start_y + state.num_y > max_height
            {
                return Err(ASCOMError::invalid_value(format_args!(
                    "Subframe {}+{} x {}+{} exceeds the effective area {max_width} x {max_height}",
                    state.start_x, state.num_x, state.start_y, state.num_y
                )));
            }
            (
                state.bin,
                state.bin_changed,
                Area {
                    start_x: state.start_x,
                    start_y: state.start_y,
                    width: state.num_x,
                    height: state.num_y,
                },
            )
        };
        tracing::debug!(duration, light, ?area, "Starting exposure");

        if bin_changed {
            blocking(&self.sdk, move |sdk| sdk.set_bin(bin)).await?;
            self.lock().bin_changed = false;
        }
        blocking(&self.sdk, move |sdk| sdk.set_resolution(area)).await?;
        let microseconds = duration * 1e6;
        blocking(&self.sdk, move |sdk| {
            sdk.set_param(ControlParam::Exposure, microseconds)
        })
        .await?;

        {
            let mut state = self.lock();
            state.camera_state = CameraState::Exposing;
            state.image_ready = false;
            state.image = None;
            state.last_exposure_duration = Some(duration);
            state.last_exposure_start = Some(SystemTime::now());
            state.exposure_started = Some(Instant::now());
            state.current_duration = duration;
        }
        self.spawn_exposure_task(duration)
    }

    async fn start_x(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(i32::try_from(self.lock().start_x).expect("subframe origin fits in i32"))
    }

    async fn set_start_x(&self, start_x: i32) -> ASCOMResult {
        self.ensure_connected()?;
        let start_x = u32::try_from(start_x).map_err(|_| {
            ASCOMError::invalid_value(format_args!("StartX {start_x} is negative"))
        })?;
        self.lock().start_x = start_x;
        Ok(())
    }

    async fn start_y(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(i32::try_from(self.lock().start_y).expect("subframe origin fits in i32"))
    }

    async fn set_start_y(&self, start_y: i32) -> ASCOMResult {
        self.ensure_connected()?;
        let start_y = u32::try_from(start_y).map_err(|_| {
            ASCOMError::invalid_value(format_args!("StartY {start_y} is negative"))
        })?;
        self.lock().start_y = start_y;
        Ok(())
    }

    async fn abort_exposure(&self) -> ASCOMResult {
        self.ensure_connected()?;
        let ctl = self.lock().exposure_ctl.take();
        if let Some(ctl) = ctl {
            ctl.abort.cancel();
        }
        Ok(())
    }

    async fn stop_exposure(&self) -> ASCOMResult {
        self.ensure_connected()?;
        let state = self.lock();
        if let Some(ctl) = state.exposure_ctl.as_ref() {
            ctl.stop.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ASCOMErrorCode;

    async fn connected_camera() -> SdkCamera {
        let camera = SdkCamera::new(
            "test camera",
            Arc::new(SimulatedCamera::default()),
            false,
            ControlPresentation::Index,
            ControlPresentation::Value,
        );
        camera.set_connected(true).await.unwrap();
        camera
    }

    async fn wait_for_image(camera: &SdkCamera) {
        for _ in 0..400 {
            if camera.image_ready().await.unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("image never became ready");
    }

    #[tokio::test]
    async fn exposure_produces_a_packed_frame() {
        let camera = connected_camera().await;
        camera.set_num_x(4).await.unwrap();
        camera.set_num_y(2).await.unwrap();
        camera.set_start_x(0).await.unwrap();
        camera.set_start_y(0).await.unwrap();

        assert!(!camera.image_ready().await.unwrap());
        camera.start_exposure(0.01, true).await.unwrap();
        wait_for_image(&camera).await;

        assert_eq!(camera.camera_state().await.unwrap(), CameraState::Idle);
        let image = camera.image_array().await.unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
        let max_adu = camera.max_adu().await.unwrap();
        for x in 0..4 {
            for y in 0..2 {
                let sample = image.get(x, y);
                assert!(sample >= 0 && sample <= max_adu);
            }
        }
        assert!((camera.last_exposure_duration().await.unwrap() - 0.01).abs() < f64::EPSILON);
        let _ = camera.last_exposure_start_time().await.unwrap();
    }

    #[tokio::test]
    async fn exposure_bounds_are_inclusive() {
        let camera = connected_camera().await;
        let min = camera.exposure_min().await.unwrap();
        let max = camera.exposure_max().await.unwrap();

        let below = camera.start_exposure(min - 1e-6, true).await.unwrap_err();
        assert_eq!(below.code, ASCOMErrorCode::INVALID_VALUE);
        let above = camera.start_exposure(max + 1e-3, true).await.unwrap_err();
        assert_eq!(above.code, ASCOMErrorCode::INVALID_VALUE);

        // The boundary values themselves must start.
        camera.start_exposure(min, true).await.unwrap();
        wait_for_image(&camera).await;
    }

    #[tokio::test]
    async fn subframe_outside_effective_area_is_rejected() {
        let camera = connected_camera().await;
        let num_x = camera.num_x().await.unwrap();
        camera.set_start_x(1).await.unwrap();
        camera.set_num_x(num_x).await.unwrap();
        let err = camera.start_exposure(0.01, true).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        assert_eq!(camera.camera_state().await.unwrap(), CameraState::Idle);
    }

    #[tokio::test]
    async fn binning_is_symmetric_and_bounded() {
        let camera = connected_camera().await;
        camera.set_bin_x(2).await.unwrap();
        assert_eq!(camera.bin_x().await.unwrap(), 2);
        assert_eq!(camera.bin_y().await.unwrap(), 2);
        // Bin change rescales the subframe to the full effective area.
        assert_eq!(camera.num_x().await.unwrap(), 28);
        assert_eq!(camera.num_y().await.unwrap(), 20);

        let err = camera.set_bin_y(3).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        let err = camera.set_bin_x(0).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
    }

    #[tokio::test]
    async fn gain_index_mode_and_offset_value_mode() {
        let camera = connected_camera().await;

        let labels = camera.gains().await.unwrap();
        assert_eq!(labels.len(), 101);
        assert_eq!(camera.gain_min().await.unwrap_err().code, ASCOMErrorCode::NOT_IMPLEMENTED);
        camera.set_gain(40).await.unwrap();
        assert_eq!(camera.gain().await.unwrap(), 40);
        let err = camera.set_gain(101).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);

        assert_eq!(camera.offsets().await.unwrap_err().code, ASCOMErrorCode::NOT_IMPLEMENTED);
        assert_eq!(camera.offset_min().await.unwrap(), 0);
        assert_eq!(camera.offset_max().await.unwrap(), 255);
        camera.set_offset(60).await.unwrap();
        assert_eq!(camera.offset().await.unwrap(), 60);
        let err = camera.set_offset(256).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
    }

    #[tokio::test]
    async fn abort_discards_the_exposure() {
        let camera = connected_camera().await;
        camera.start_exposure(30.0, true).await.unwrap();
        assert_eq!(camera.camera_state().await.unwrap(), CameraState::Exposing);
        camera.abort_exposure().await.unwrap();

        for _ in 0..100 {
            if camera.camera_state().await.unwrap() == CameraState::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(camera.camera_state().await.unwrap(), CameraState::Idle);
        assert!(!camera.image_ready().await.unwrap());
    }

    #[tokio::test]
    async fn stop_reads_out_early() {
        let camera = connected_camera().await;
        camera.start_exposure(30.0, true).await.unwrap();
        camera.stop_exposure().await.unwrap();
        wait_for_image(&camera).await;
        assert!(camera.image_array().await.is_ok());
    }

    #[tokio::test]
    async fn reads_before_first_exposure_are_refused() {
        let camera = connected_camera().await;
        for code in [
            camera.image_array().await.unwrap_err().code,
            camera.last_exposure_duration().await.unwrap_err().code,
            camera.last_exposure_start_time().await.unwrap_err().code,
        ] {
            assert_eq!(code, ASCOMErrorCode::INVALID_OPERATION);
        }
    }

    #[tokio::test]
    async fn cooler_setpoint_and_power() {
        let camera = connected_camera().await;
        assert!(!camera.cooler_on().await.unwrap());
        camera.set_set_ccd_temperature(-10.0).await.unwrap();
        camera.set_cooler_on(true).await.unwrap();
        assert!(camera.cooler_on().await.unwrap());
        assert!((camera.set_ccd_temperature().await.unwrap() + 10.0).abs() < f64::EPSILON);
        let err = camera.set_set_ccd_temperature(-60.0).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        // Switching the cooler off drives the PWM to zero.
        camera.set_cooler_on(false).await.unwrap();
        assert!((camera.cooler_power().await.unwrap()).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn disconnected_camera_fails_fast() {
        let camera = SdkCamera::new(
            "test camera",
            Arc::new(SimulatedCamera::default()),
            false,
            ControlPresentation::Index,
            ControlPresentation::Value,
        );
        assert_eq!(
            camera.start_exposure(0.01, true).await.unwrap_err().code,
            ASCOMErrorCode::NOT_CONNECTED
        );
        assert_eq!(
            camera.bin_x().await.unwrap_err().code,
            ASCOMErrorCode::NOT_CONNECTED
        );
    }
}
