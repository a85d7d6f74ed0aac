//! Serial driver for LX200-dialect equatorial mounts.
//!
//! The mount is a single-port serial device; all typed operations are
//! translated into `#`-terminated ASCII exchanges by [`commands`] and
//! [`responses`]. While connected, a background poller refreshes a snapshot
//! of the pointing state every second; HTTP handlers read the snapshot
//! under the device mutex rather than touching the port.

mod commands;
mod responses;

use super::DeviceConnection;
use crate::api::{
    AlignmentMode, AxisRate, Device, DriveRate, GuideDirection, PierSide, Telescope, TelescopeAxis,
};
use crate::transport::{ReadExpectation, SerialConfig, SerialTransport, Transport};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::OffsetComponents;
use responses::{DateMdy, Hms, SignedDms, SignedHm};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, SystemTime};

/// Degrees per second of the sidereal rate; the mount expresses move rates
/// as multiples of it.
const SIDEREAL_RATE: f64 = 0.0042;
/// Longest single guide emission the firmware accepts, in milliseconds.
const MAX_GUIDE_MS: u32 = 3000;
/// Poll interval while blocking on an in-progress slew.
const SLEW_POLL: Duration = Duration::from_millis(100);
/// Background snapshot refresh interval.
const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Backoff before retrying a tracking command that acked badly.
const TRACKING_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Firmware encoding quirks, kept in one place.
///
/// The mount stores the UTC offset and the site longitude with their signs
/// inverted relative to the conventional encoding. Both directions of both
/// values go through these adapters so the inversion stays interoperable
/// with the vendor's own software.
mod quirks {
    pub(super) fn invert_utc_offset_sign(minutes: i64) -> i64 {
        -minutes
    }

    pub(super) fn invert_longitude_sign(degrees: f64) -> f64 {
        -degrees
    }
}

/// Pointing state refreshed by the background poller.
#[derive(Debug, Default, Clone, Copy)]
struct MountSnapshot {
    right_ascension: f64,
    declination: f64,
    altitude: f64,
    azimuth: f64,
    tracking: bool,
    slewing: bool,
    at_home: bool,
}

#[derive(Debug)]
struct MountState {
    parked: bool,
    /// Driver-initiated axis motion, set before the status report catches up.
    moving: bool,
    active_pulse_guides: u32,
    tracking_rate: DriveRate,
    target_right_ascension: Option<f64>,
    target_declination: Option<f64>,
    site_elevation: f64,
    snapshot: MountSnapshot,
}

impl Default for MountState {
    fn default() -> Self {
        Self {
            parked: false,
            moving: false,
            active_pulse_guides: 0,
            tracking_rate: DriveRate::Sidereal,
            target_right_ascension: None,
            target_declination: None,
            site_elevation: 0.0,
            snapshot: MountSnapshot::default(),
        }
    }
}

/// An LX200-dialect equatorial mount on a serial port.
#[derive(Debug)]
pub struct SerialMount {
    name: String,
    device_path: String,
    state: Arc<Mutex<MountState>>,
    connection: RwLock<Option<DeviceConnection>>,
}

/// Whether a `:GU#` status report indicates the mount is in motion.
fn status_indicates_motion(status: &str) -> bool {
    status.ends_with("2#") || status.ends_with("4#")
}

async fn reply(transport: &dyn Transport, command: &str) -> ASCOMResult<String> {
    let raw = transport
        .exchange(command.as_bytes(), ReadExpectation::Terminated(b'#'))
        .await?;
    String::from_utf8(raw)
        .map_err(|err| ASCOMError::driver_error(format_args!("Mount sent non-ASCII reply: {err}")))
}

async fn refresh_snapshot(
    transport: &dyn Transport,
    state: &Mutex<MountState>,
) -> ASCOMResult<()> {
    let right_ascension = Hms::parse(&reply(transport, commands::GET_CURRENT_RA).await?)?;
    let declination = SignedDms::parse(&reply(transport, commands::GET_CURRENT_DEC).await?)?;
    let altitude = SignedDms::parse(&reply(transport, commands::GET_ALTITUDE).await?)?;
    let azimuth = SignedDms::parse(&reply(transport, commands::GET_AZIMUTH).await?)?;
    let tracking =
        responses::parse_standard(&reply(transport, commands::GET_TRACKING_STATUS).await?)? == 1;
    let status = reply(transport, commands::GET_STATUS).await?;

    let mut state = state.lock().expect("mount state poisoned");
    state.snapshot = MountSnapshot {
        right_ascension: right_ascension.to_decimal(),
        declination: declination.to_decimal(),
        altitude: altitude.to_decimal(),
        azimuth: azimuth.to_decimal(),
        tracking,
        slewing: status_indicates_motion(&status),
        at_home: status.contains('H'),
    };
    Ok(())
}

/// Wire fields for a UTC offset in minutes (sign already inverted).
fn timezone_fields(wire_offset_minutes: i64) -> (bool, u32, u32) {
    let negative = wire_offset_minutes < 0;
    let magnitude = wire_offset_minutes.unsigned_abs();
    #[allow(clippy::cast_possible_truncation)]
    let hours = (magnitude / 60) as u32;
    let minutes = if magnitude % 60 == 30 { 30 } else { 0 };
    (negative, hours, minutes)
}

impl SerialMount {
    /// Creates a driver for the mount on the given serial device path.
    ///
    /// Nothing is opened until `set_connected(true)`.
    pub fn new(name: impl Into<String>, device_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_path: device_path.into(),
            state: Arc::new(Mutex::new(MountState::default())),
            connection: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let mount = Self::new("test mount", "/dev/null");
        *mount.connection.write().expect("connection lock poisoned") =
            Some(DeviceConnection::new(transport));
        mount
    }

    fn lock(&self) -> MutexGuard<'_, MountState> {
        self.state.lock().expect("mount state poisoned")
    }

    fn transport(&self) -> ASCOMResult<Arc<dyn Transport>> {
        self.connection
            .read()
            .expect("connection lock poisoned")
            .as_ref()
            .map(|connection| Arc::clone(&connection.transport))
            .ok_or(ASCOMError::NOT_CONNECTED)
    }

    fn ensure_connected(&self) -> ASCOMResult {
        self.transport().map(|_| ())
    }

    fn ensure_not_parked(&self) -> ASCOMResult {
        if self.lock().parked {
            Err(ASCOMError::invalid_operation("Mount is parked"))
        } else {
            Ok(())
        }
    }

    async fn command_reply(&self, command: &str) -> ASCOMResult<String> {
        let transport = self.transport()?;
        reply(transport.as_ref(), command).await
    }

    async fn command_no_reply(&self, command: &str) -> ASCOMResult {
        let transport = self.transport()?;
        let _ = transport
            .exchange(command.as_bytes(), ReadExpectation::None)
            .await?;
        Ok(())
    }

    /// Sends a command that acks with a single `1`/`0` byte.
    async fn command_ack(&self, command: &str) -> ASCOMResult {
        if self.command_raw_ack(command).await? {
            Ok(())
        } else {
            Err(ASCOMError::driver_error(format_args!(
                "Mount rejected command {command}"
            )))
        }
    }

    async fn command_raw_ack(&self, command: &str) -> ASCOMResult<bool> {
        let transport = self.transport()?;
        let raw = transport
            .exchange(command.as_bytes(), ReadExpectation::Exact(1))
            .await?;
        Ok(raw == b"1")
    }

    async fn tracking_status(&self) -> ASCOMResult<bool> {
        let raw = self.command_reply(commands::GET_TRACKING_STATUS).await?;
        Ok(responses::parse_standard(&raw)? == 1)
    }

    /// Polls the live status report every 100 ms until motion stops.
    async fn block_while_moving(&self) -> ASCOMResult {
        loop {
            tokio::time::sleep(SLEW_POLL).await;
            let status = self.command_reply(commands::GET_STATUS).await?;
            if !status_indicates_motion(&status) {
                break;
            }
        }
        self.lock().moving = false;
        Ok(())
    }

    fn decompose_right_ascension(right_ascension: f64) -> ASCOMResult<Hms> {
        if !(0.0..24.0).contains(&right_ascension) {
            return Err(ASCOMError::invalid_value(format_args!(
                "Right ascension {right_ascension} is not within 0 and 24 hours"
            )));
        }
        let mut fields = Hms::from_decimal(right_ascension);
        // Carry at the top of the range wraps around the clock.
        fields.hours %= 24;
        Ok(fields)
    }

    fn decompose_declination(declination: f64) -> ASCOMResult<SignedDms> {
        if !(-90.0..=90.0).contains(&declination) {
            return Err(ASCOMError::invalid_value(format_args!(
                "Declination {declination} is not within -90 and 90 degrees"
            )));
        }
        Ok(SignedDms::from_decimal(declination))
    }

    /// Issues the composite set-target-and-goto and records the targets.
    async fn start_slew(&self, right_ascension: f64, declination: f64) -> ASCOMResult {
        self.ensure_not_parked()?;
        let ra_fields = Self::decompose_right_ascension(right_ascension)?;
        let dec_fields = Self::decompose_declination(declination)?;
        let command = commands::set_target_and_goto(
            ra_fields.hours,
            ra_fields.minutes,
            ra_fields.seconds,
            dec_fields.negative,
            dec_fields.degrees,
            dec_fields.minutes,
            dec_fields.seconds,
        )?;
        if !self.command_raw_ack(&command).await? {
            return Err(ASCOMError::driver_error("Mount refused the slew command"));
        }
        let mut state = self.lock();
        state.target_right_ascension = Some(right_ascension);
        state.target_declination = Some(declination);
        state.moving = true;
        Ok(())
    }

    fn stored_targets(&self) -> ASCOMResult<(f64, f64)> {
        let state = self.lock();
        match (state.target_right_ascension, state.target_declination) {
            (Some(right_ascension), Some(declination)) => Ok((right_ascension, declination)),
            _ => Err(ASCOMError::invalid_operation("Target has not been set")),
        }
    }
}

#[async_trait]
impl Device for SerialMount {
    fn static_name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.device_path
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
            let transport: Arc<dyn Transport> = Arc::new(
                SerialTransport::open(&self.device_path, SerialConfig::BAUD_9600).map_err(
                    |err| {
                        ASCOMError::driver_error(format_args!(
                            "Problem opening serial connection at {}: {err}",
                            self.device_path
                        ))
                    },
                )?,
            );
            let version = reply(transport.as_ref(), commands::GET_VERSION).await?;
            tracing::debug!(version, "Connected to mount");

            let connection = DeviceConnection::new(Arc::clone(&transport));
            {
                let state = Arc::clone(&self.state);
                connection.spawn_poller(POLL_INTERVAL, move || {
                    let transport = Arc::clone(&transport);
                    let state = Arc::clone(&state);
                    async move {
                        if let Err(err) = refresh_snapshot(transport.as_ref(), &state).await {
                            tracing::warn!(%err, "Problem refreshing mount state");
                        }
                    }
                });
            }

            *self.connection.write().expect("connection lock poisoned") = Some(connection);
        } else {
            let connection = self
                .connection
                .write()
                .expect("connection lock poisoned")
                .take();
            if let Some(connection) = connection {
                connection.shutdown().await;
            }
            // State is rebuilt from hardware on the next connect.
            *self.lock() = MountState::default();
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("LX200-dialect equatorial mount".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " serial mount driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl Telescope for SerialMount {
    async fn alignment_mode(&self) -> ASCOMResult<AlignmentMode> {
        Ok(AlignmentMode::Polar)
    }

    async fn altitude(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().snapshot.altitude)
    }

    async fn azimuth(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().snapshot.azimuth)
    }

    async fn at_home(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().snapshot.at_home)
    }

    async fn at_park(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().parked)
    }

    async fn can_find_home(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_park(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_pulse_guide(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_guide_rates(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_set_tracking(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_slew(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_slew_async(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_sync(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn can_unpark(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn declination(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().snapshot.declination)
    }

    async fn right_ascension(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().snapshot.right_ascension)
    }

    async fn guide_rate_declination(&self) -> ASCOMResult<f64> {
        let raw = self.command_reply(commands::GET_GUIDE_RATE).await?;
        let fraction: f64 = raw.trim_end_matches('#').parse().map_err(|_| {
            ASCOMError::driver_error(format_args!("Unparseable guide rate {raw:?}"))
        })?;
        Ok(fraction * SIDEREAL_RATE)
    }

    async fn set_guide_rate_declination(&self, rate: f64) -> ASCOMResult {
        let fraction = rate / SIDEREAL_RATE;
        self.command_no_reply(&commands::set_guide_rate(fraction)?)
            .await
    }

    async fn guide_rate_right_ascension(&self) -> ASCOMResult<f64> {
        self.guide_rate_declination().await
    }

    async fn set_guide_rate_right_ascension(&self, rate: f64) -> ASCOMResult {
        self.set_guide_rate_declination(rate).await
    }

    async fn is_pulse_guiding(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().active_pulse_guides > 0)
    }

    async fn side_of_pier(&self) -> ASCOMResult<PierSide> {
        let raw = self.command_reply(commands::GET_CARDINAL_DIRECTION).await?;
        Ok(match raw.trim_end_matches('#') {
            "E" => PierSide::East,
            "W" => PierSide::West,
            _ => PierSide::Unknown,
        })
    }

    async fn sidereal_time(&self) -> ASCOMResult<f64> {
        let raw = self.command_reply(commands::GET_SIDEREAL_TIME).await?;
        Ok(Hms::parse(&raw)?.to_decimal())
    }

    async fn site_elevation(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().site_elevation)
    }

    async fn set_site_elevation(&self, elevation: f64) -> ASCOMResult {
        self.ensure_connected()?;
        if !(-300.0..=10_000.0).contains(&elevation) {
            return Err(ASCOMError::invalid_value(
                "Elevation must be between -300 and 10000 meters",
            ));
        }
        self.lock().site_elevation = elevation;
        Ok(())
    }

    async fn site_latitude(&self) -> ASCOMResult<f64> {
        let raw = self.command_reply(commands::GET_LATITUDE).await?;
        Ok(SignedDms::parse(&raw)?.to_decimal())
    }

    async fn set_site_latitude(&self, latitude: f64) -> ASCOMResult {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ASCOMError::invalid_value(
                "Latitude must be between -90 and 90 degrees",
            ));
        }
        let fields = SignedDms::from_decimal(latitude);
        self.command_ack(&commands::set_latitude(
            fields.negative,
            fields.degrees,
            fields.minutes,
            fields.seconds,
        )?)
        .await
    }

    async fn site_longitude(&self) -> ASCOMResult<f64> {
        let raw = self.command_reply(commands::GET_LONGITUDE).await?;
        Ok(quirks::invert_longitude_sign(
            SignedDms::parse(&raw)?.to_decimal(),
        ))
    }

    async fn set_site_longitude(&self, longitude: f64) -> ASCOMResult {
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ASCOMError::invalid_value(
                "Longitude must be between -180 and 180 degrees",
            ));
        }
        let fields = SignedDms::from_decimal(quirks::invert_longitude_sign(longitude));
        self.command_ack(&commands::set_longitude(
            fields.negative,
            fields.degrees,
            fields.minutes,
            fields.seconds,
        )?)
        .await
    }

    async fn slewing(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        let state = self.lock();
        Ok(state.moving || state.snapshot.slewing)
    }

    async fn target_declination(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        self.lock()
            .target_declination
            .ok_or_else(|| ASCOMError::invalid_operation("Target declination has not been set"))
    }

    async fn set_target_declination(&self, target_declination: f64) -> ASCOMResult {
        let fields = Self::decompose_declination(target_declination)?;
        self.command_ack(&commands::set_target_dec(
            fields.negative,
            fields.degrees,
            fields.minutes,
            fields.seconds,
        )?)
        .await?;
        self.lock().target_declination = Some(target_declination);
        Ok(())
    }

    async fn target_right_ascension(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        self.lock()
            .target_right_ascension
            .ok_or_else(|| {
                ASCOMError::invalid_operation("Target right ascension has not been set")
            })
    }

    async fn set_target_right_ascension(&self, target_right_ascension: f64) -> ASCOMResult {
        let fields = Self::decompose_right_ascension(target_right_ascension)?;
        self.command_ack(&commands::set_target_ra(
            fields.hours,
            fields.minutes,
            fields.seconds,
        )?)
        .await?;
        self.lock().target_right_ascension = Some(target_right_ascension);
        Ok(())
    }

    async fn tracking(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().snapshot.tracking)
    }

    /// Sets tracking, tolerating the firmware's transient nack race.
    ///
    /// The mount occasionally acks a tracking command with an error while
    /// nevertheless transitioning correctly, so a bad ack is verified
    /// against the reported status; a true mismatch gets one retry after a
    /// 2 s backoff before surfacing a driver error.
    async fn set_tracking(&self, tracking: bool) -> ASCOMResult {
        let command = if tracking {
            commands::START_TRACKING
        } else {
            commands::STOP_TRACKING
        };

        if self.command_raw_ack(command).await? {
            self.lock().snapshot.tracking = tracking;
            return Ok(());
        }

        let reported = self.tracking_status().await?;
        tracing::warn!(requested = tracking, reported, "Tracking command acked badly");
        if reported == tracking {
            self.lock().snapshot.tracking = tracking;
            return Ok(());
        }

        tokio::time::sleep(TRACKING_RETRY_DELAY).await;
        if self.command_raw_ack(command).await? || self.tracking_status().await? == tracking {
            tracing::info!("Tracking retry succeeded, ignore previous warning");
            self.lock().snapshot.tracking = tracking;
            return Ok(());
        }

        Err(ASCOMError::driver_error(format_args!(
            "Failed to set tracking status to {tracking}"
        )))
    }

    async fn tracking_rate(&self) -> ASCOMResult<DriveRate> {
        self.ensure_connected()?;
        Ok(self.lock().tracking_rate)
    }

    async fn set_tracking_rate(&self, tracking_rate: DriveRate) -> ASCOMResult {
        let command = match tracking_rate {
            DriveRate::Sidereal => commands::TRACK_RATE_SIDEREAL,
            DriveRate::Lunar => commands::TRACK_RATE_LUNAR,
            DriveRate::Solar => commands::TRACK_RATE_SOLAR,
            DriveRate::King => commands::TRACK_RATE_KING,
        };
        self.command_no_reply(command).await?;
        self.lock().tracking_rate = tracking_rate;
        Ok(())
    }

    async fn tracking_rates(&self) -> ASCOMResult<Vec<DriveRate>> {
        Ok(vec![
            DriveRate::Sidereal,
            DriveRate::Lunar,
            DriveRate::Solar,
            DriveRate::King,
        ])
    }

    async fn utc_date(&self) -> ASCOMResult<SystemTime> {
        let timezone = SignedHm::parse(&self.command_reply(commands::GET_TIMEZONE).await?)?;
        let date = DateMdy::parse(&self.command_reply(commands::GET_DATE).await?)?;
        let time = Hms::parse(&self.command_reply(commands::GET_TIME).await?)?;

        let mut wire_offset_minutes = i64::from(timezone.hours) * 60 + i64::from(timezone.minutes);
        if timezone.negative {
            wire_offset_minutes = -wire_offset_minutes;
        }
        let base_offset_minutes = quirks::invert_utc_offset_sign(wire_offset_minutes);

        let local = NaiveDate::from_ymd_opt(
            2000 + i32::try_from(date.year).expect("two-digit year"),
            date.month,
            date.day,
        )
        .and_then(|day| day.and_hms_opt(time.hours, time.minutes, time.seconds))
        .ok_or_else(|| ASCOMError::driver_error("Mount reported an invalid date"))?;

        let utc = Utc
            .from_utc_datetime(&(local - chrono::Duration::minutes(base_offset_minutes)));
        Ok(utc.into())
    }

    /// Writes the mount clock: `:SG`, `:SC`, `:SL`, each ack-verified.
    ///
    /// The transmitted local time never includes the DST hour; the DST flag
    /// is written as 0 and the offset sign goes through the inversion
    /// adapter.
    async fn set_utc_date(&self, utc_date: SystemTime) -> ASCOMResult {
        let utc: chrono::DateTime<Utc> = utc_date.into();
        let zone_name = iana_time_zone::get_timezone()
            .map_err(|err| ASCOMError::driver_error(format_args!("No host timezone: {err}")))?;
        let zone: chrono_tz::Tz = zone_name
            .parse()
            .map_err(|err| ASCOMError::driver_error(format_args!("Bad host timezone: {err}")))?;
        let zoned = utc.with_timezone(&zone);
        let offset = zoned.offset();
        let base_offset_minutes = offset.base_utc_offset().num_minutes();
        let dst_active = !offset.dst_offset().is_zero();

        self.command_ack(&commands::set_daylight_savings(false)).await?;

        let (negative, hours, minutes) =
            timezone_fields(quirks::invert_utc_offset_sign(base_offset_minutes));
        self.command_ack(&commands::set_timezone(negative, hours, minutes)?)
            .await?;

        // Transmit local time without the DST hour.
        let adjusted = if dst_active {
            zoned - chrono::Duration::hours(1)
        } else {
            zoned
        };
        #[allow(clippy::cast_sign_loss)]
        let year = (adjusted.year() % 100) as u32;
        self.command_ack(&commands::set_date(adjusted.month(), adjusted.day(), year)?)
            .await?;
        self.command_ack(&commands::set_time(
            adjusted.hour(),
            adjusted.minute(),
            adjusted.second(),
        )?)
        .await?;
        Ok(())
    }

    async fn abort_slew(&self) -> ASCOMResult {
        self.command_no_reply(commands::STOP_ALL).await?;
        self.lock().moving = false;
        Ok(())
    }

    async fn axis_rates(&self, _axis: TelescopeAxis) -> ASCOMResult<Vec<AxisRate>> {
        Ok(vec![AxisRate {
            minimum: 0.25 * SIDEREAL_RATE,
            maximum: 1440.0 * SIDEREAL_RATE,
        }])
    }

    async fn can_move_axis(&self, _axis: TelescopeAxis) -> ASCOMResult<bool> {
        Ok(true)
    }

    async fn find_home(&self) -> ASCOMResult {
        self.ensure_not_parked()?;
        self.command_no_reply(commands::GO_HOME).await?;
        self.lock().moving = true;
        self.block_while_moving().await
    }

    async fn move_axis(&self, axis: TelescopeAxis, rate: f64) -> ASCOMResult {
        self.ensure_not_parked()?;
        let magnitude = rate.abs();
        if rate != 0.0
            && !(0.25 * SIDEREAL_RATE..=1440.0 * SIDEREAL_RATE).contains(&magnitude)
        {
            return Err(ASCOMError::invalid_value(format_args!(
                "Rate {rate} is not within the acceptable range"
            )));
        }

        let (forward, backward, stop_forward, stop_backward) = match axis {
            TelescopeAxis::Primary => (
                commands::MOVE_EAST,
                commands::MOVE_WEST,
                commands::STOP_EAST,
                commands::STOP_WEST,
            ),
            TelescopeAxis::Secondary => (
                commands::MOVE_NORTH,
                commands::MOVE_SOUTH,
                commands::STOP_NORTH,
                commands::STOP_SOUTH,
            ),
        };

        if rate == 0.0 {
            self.command_no_reply(stop_forward).await?;
            self.command_no_reply(stop_backward).await?;
            self.lock().moving = false;
        } else {
            self.command_no_reply(&commands::set_move_rate(magnitude / SIDEREAL_RATE)?)
                .await?;
            self.command_no_reply(if rate > 0.0 { forward } else { backward })
                .await?;
            self.lock().moving = true;
        }
        Ok(())
    }

    async fn park(&self) -> ASCOMResult {
        if self.lock().parked {
            return Ok(());
        }
        self.command_no_reply(commands::PARK).await?;
        self.lock().moving = true;
        self.block_while_moving().await?;
        self.lock().parked = true;
        Ok(())
    }

    async fn unpark(&self) -> ASCOMResult {
        let _ = self.command_raw_ack(commands::UNPARK).await?;
        self.lock().parked = false;
        Ok(())
    }

    /// Spawns a structured guide task emitting `:Mg` chunks of at most 3 s.
    ///
    /// Guides in opposite axes may overlap; overlapping the same axis is
    /// firmware-undefined and not serialized here.
    async fn pulse_guide(&self, direction: GuideDirection, duration_ms: u32) -> ASCOMResult {
        self.ensure_not_parked()?;
        let cardinal = match direction {
            GuideDirection::East => 'e',
            GuideDirection::West => 'w',
            GuideDirection::North => 'n',
            GuideDirection::South => 's',
        };

        let connection = self.connection.read().expect("connection lock poisoned");
        let Some(connection) = connection.as_ref() else {
            return Err(ASCOMError::NOT_CONNECTED);
        };
        let transport = Arc::clone(&connection.transport);
        let state = Arc::clone(&self.state);
        let cancel = connection.cancel.clone();

        state.lock().expect("mount state poisoned").active_pulse_guides += 1;
        let _ = connection.tasks.spawn(async move {
            let guide = async {
                let mut remaining = duration_ms;
                loop {
                    let chunk = remaining.min(MAX_GUIDE_MS);
                    let command = commands::guide(cardinal, chunk)
                        .expect("chunk length is pre-validated");
                    if let Err(err) = transport
                        .exchange(command.as_bytes(), ReadExpectation::None)
                        .await
                    {
                        tracing::warn!(%err, "Problem sending guide command");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(chunk.into())).await;
                    remaining -= chunk;
                    if remaining == 0 {
                        break;
                    }
                }
            };
            tokio::select! {
                () = cancel.cancelled() => tracing::debug!("Guide task cancelled"),
                () = guide => {}
            }
            state.lock().expect("mount state poisoned").active_pulse_guides -= 1;
        });
        Ok(())
    }

    async fn slew_to_coordinates(&self, right_ascension: f64, declination: f64) -> ASCOMResult {
        self.start_slew(right_ascension, declination).await?;
        self.block_while_moving().await
    }

    async fn slew_to_coordinates_async(
        &self,
        right_ascension: f64,
        declination: f64,
    ) -> ASCOMResult {
        self.start_slew(right_ascension, declination).await
    }

    async fn slew_to_target(&self) -> ASCOMResult {
        self.slew_to_target_async().await?;
        self.block_while_moving().await
    }

    /// Goes to the target the mount already holds from the `:Sr`/`:Sd`
    /// writes.
    async fn slew_to_target_async(&self) -> ASCOMResult {
        self.ensure_not_parked()?;
        let _ = self.stored_targets()?;
        if !self.command_raw_ack(commands::GOTO_TARGET).await? {
            return Err(ASCOMError::driver_error("Mount refused the slew command"));
        }
        self.lock().moving = true;
        Ok(())
    }

    async fn sync_to_coordinates(&self, right_ascension: f64, declination: f64) -> ASCOMResult {
        self.set_target_right_ascension(right_ascension).await?;
        self.set_target_declination(declination).await?;
        self.sync_to_target().await
    }

    async fn sync_to_target(&self) -> ASCOMResult {
        let _ = self.stored_targets()?;
        let raw = self.command_reply(commands::SYNC_TO_TARGET).await?;
        if raw.contains("N/A") {
            Ok(())
        } else {
            Err(ASCOMError::driver_error(format_args!(
                "Mount refused to sync: {raw}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{Reply, ScriptedTransport};
    use crate::ASCOMErrorCode;

    fn mount_with(script: Vec<(&'static [u8], Reply)>) -> (SerialMount, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let mount = SerialMount::with_transport(Arc::<ScriptedTransport>::clone(&transport));
        (mount, transport)
    }

    #[tokio::test]
    async fn set_and_get_latitude() {
        let (mount, transport) = mount_with(vec![
            (b":St+30*33:40#", Reply::Bytes(b"1")),
            (b":Gt#", Reply::Bytes(b"+30*33:40#")),
        ]);
        mount.set_site_latitude(30.561_111).await.unwrap();
        let read_back = mount.site_latitude().await.unwrap();
        assert!((read_back - 30.561_111).abs() <= 1.0 / 3600.0);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn longitude_sign_is_inverted_on_the_wire() {
        let (mount, transport) = mount_with(vec![
            (b":Sg+098*00:00#", Reply::Bytes(b"1")),
            (b":Gg#", Reply::Bytes(b"+098*00:00#")),
        ]);
        // West longitude (negative) transmits with a '+'.
        mount.set_site_longitude(-98.0).await.unwrap();
        assert!((mount.site_longitude().await.unwrap() + 98.0).abs() < 1e-9);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn out_of_range_coordinates_never_touch_the_port() {
        let (mount, transport) = mount_with(vec![]);
        for result in [
            mount.set_site_latitude(90.5).await,
            mount.set_target_right_ascension(24.0).await,
            mount.set_target_declination(-90.1).await,
            mount.slew_to_coordinates_async(25.0, 10.0).await,
        ] {
            assert_eq!(result.unwrap_err().code, ASCOMErrorCode::INVALID_VALUE);
        }
        transport.assert_drained();
    }

    #[tokio::test]
    async fn async_slew_issues_composite_goto_and_records_targets() {
        let (mount, transport) = mount_with(vec![(
            b":SMeq01:02:01&+09*01:02#".as_slice(),
            Reply::Bytes(b"1"),
        )]);
        mount
            .slew_to_coordinates_async(1.033_611, 9.017_222)
            .await
            .unwrap();
        assert!(mount.slewing().await.unwrap());
        assert!((mount.target_right_ascension().await.unwrap() - 1.033_611).abs() < 1e-9);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn slew_to_target_uses_previously_set_targets() {
        let (mount, transport) = mount_with(vec![
            (b":Sr01:02:01#", Reply::Bytes(b"1")),
            (b":Sd+09:01:02#", Reply::Bytes(b"1")),
            (b":MS#", Reply::Bytes(b"1")),
        ]);
        mount.set_target_right_ascension(1.033_611).await.unwrap();
        mount.set_target_declination(9.017_222).await.unwrap();
        mount.slew_to_target_async().await.unwrap();
        assert!(mount.slewing().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test]
    async fn reading_unset_target_is_invalid_operation() {
        let (mount, _) = mount_with(vec![]);
        assert_eq!(
            mount.target_right_ascension().await.unwrap_err().code,
            ASCOMErrorCode::INVALID_OPERATION
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_nack_is_verified_against_status() {
        let (mount, transport) = mount_with(vec![
            (b":Te#", Reply::Bytes(b"0")),
            (b":GAT#", Reply::Bytes(b"1#")),
        ]);
        mount.set_tracking(true).await.unwrap();
        assert!(mount.tracking().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_mismatch_retries_once_after_backoff() {
        let (mount, transport) = mount_with(vec![
            (b":Te#", Reply::Bytes(b"0")),
            (b":GAT#", Reply::Bytes(b"0#")),
            (b":Te#", Reply::Bytes(b"1")),
        ]);
        mount.set_tracking(true).await.unwrap();
        transport.assert_drained();
    }

    #[tokio::test(start_paused = true)]
    async fn tracking_failure_after_retry_is_driver_error() {
        let (mount, transport) = mount_with(vec![
            (b":Td#", Reply::Bytes(b"0")),
            (b":GAT#", Reply::Bytes(b"1#")),
            (b":Td#", Reply::Bytes(b"0")),
            (b":GAT#", Reply::Bytes(b"1#")),
        ]);
        let err = mount.set_tracking(false).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::DRIVER_ERROR);
        transport.assert_drained();
    }

    #[tokio::test(start_paused = true)]
    async fn pulse_guide_chunks_long_requests() {
        let (mount, transport) = mount_with(vec![
            (b":Mge3000#", Reply::Bytes(b"")),
            (b":Mge3000#", Reply::Bytes(b"")),
            (b":Mge1500#", Reply::Bytes(b"")),
        ]);
        mount.pulse_guide(GuideDirection::East, 7500).await.unwrap();
        assert!(mount.is_pulse_guiding().await.unwrap());

        // Paused time auto-advances through the guide task's sleeps.
        for _ in 0..100 {
            tokio::task::yield_now().await;
            if !mount.is_pulse_guiding().await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        assert!(!mount.is_pulse_guiding().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test]
    async fn move_axis_converts_to_sidereal_multiples() {
        let (mount, transport) = mount_with(vec![
            (b":Rv0.25#", Reply::Bytes(b"")),
            (b":Mw#", Reply::Bytes(b"")),
            (b":Qe#", Reply::Bytes(b"")),
            (b":Qw#", Reply::Bytes(b"")),
        ]);
        mount
            .move_axis(TelescopeAxis::Primary, -0.25 * SIDEREAL_RATE)
            .await
            .unwrap();
        assert!(mount.slewing().await.unwrap());
        mount.move_axis(TelescopeAxis::Primary, 0.0).await.unwrap();
        assert!(!mount.slewing().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test]
    async fn parked_mount_refuses_motion() {
        let (mount, transport) = mount_with(vec![]);
        mount.lock().parked = true;
        for result in [
            mount.pulse_guide(GuideDirection::North, 100).await,
            mount.move_axis(TelescopeAxis::Primary, 0.01).await,
            mount.slew_to_coordinates_async(1.0, 2.0).await,
        ] {
            assert_eq!(result.unwrap_err().code, ASCOMErrorCode::INVALID_OPERATION);
        }
        transport.assert_drained();
    }

    #[test]
    fn timezone_wire_fields() {
        // Positive true offsets transmit negative and vice versa.
        assert_eq!(timezone_fields(quirks::invert_utc_offset_sign(300)), (true, 5, 0));
        assert_eq!(
            timezone_fields(quirks::invert_utc_offset_sign(-330)),
            (false, 5, 30)
        );
        assert_eq!(timezone_fields(quirks::invert_utc_offset_sign(0)), (false, 0, 0));
    }

    #[test]
    fn status_motion_detection() {
        assert!(status_indicates_motion("nNG0000000002#"));
        assert!(status_indicates_motion("nNG0000000004#"));
        assert!(!status_indicates_motion("nNG0000000000#"));
    }
}
