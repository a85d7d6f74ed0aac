//! Serial driver for Falcon-class robotic rotators.
//!
//! Protocol: newline-terminated commands at 115200 baud. `FR` returns the
//! colon-delimited status line `FR:{sky}:{mechanical}:{moving}:{reversed}`;
//! `MD:{deg}` moves to a sky angle, `MC:{deg}` to a mechanical angle,
//! `SD:{deg}` syncs, `FN:{0|1}` sets the reverse flag (all echoed back) and
//! `FH` halts with no reply.

use super::{split_status, DeviceConnection};
use crate::api::{Device, Rotator};
use crate::transport::{ReadExpectation, SerialConfig, SerialTransport, Transport};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct RotatorState {
    position: f64,
    mechanical_position: f64,
    moving: bool,
    reversed: bool,
    target_position: f64,
}

/// A Falcon-class rotator on a serial port.
#[derive(Debug)]
pub struct FalconRotator {
    name: String,
    device_path: String,
    state: Arc<Mutex<RotatorState>>,
    connection: RwLock<Option<DeviceConnection>>,
}

async fn exchange_line(transport: &dyn Transport, command: &str) -> ASCOMResult<String> {
    let raw = transport
        .exchange(command.as_bytes(), ReadExpectation::Terminated(b'\n'))
        .await?;
    String::from_utf8(raw).map_err(|err| {
        ASCOMError::driver_error(format_args!("Rotator sent non-ASCII reply: {err}"))
    })
}

async fn refresh(transport: &dyn Transport, state: &Mutex<RotatorState>) -> ASCOMResult<()> {
    let line = exchange_line(transport, "FR\n").await?;
    let fields = split_status(&line);
    if fields.first() != Some(&"FR") || fields.len() < 5 {
        return Err(ASCOMError::driver_error(
            "Did not receive correctly formatted data from rotator",
        ));
    }
    let position = fields[1]
        .parse()
        .map_err(|_| ASCOMError::driver_error("Bad position field"))?;
    let mechanical_position = fields[2]
        .parse()
        .map_err(|_| ASCOMError::driver_error("Bad mechanical position field"))?;
    let moving = fields[3] == "1";
    let reversed = fields[4] == "1";

    let mut state = state.lock().expect("rotator state poisoned");
    state.position = position;
    state.mechanical_position = mechanical_position;
    state.moving = moving;
    state.reversed = reversed;
    Ok(())
}

fn check_angle(what: &str, degrees: f64) -> ASCOMResult {
    if (0.0..360.0).contains(&degrees) {
        Ok(())
    } else {
        Err(ASCOMError::invalid_value(format_args!(
            "{what} {degrees} is not within 0 - 360 degrees"
        )))
    }
}

impl FalconRotator {
    /// Creates a driver for the rotator on the given serial device path.
    pub fn new(name: impl Into<String>, device_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_path: device_path.into(),
            state: Arc::new(Mutex::new(RotatorState::default())),
            connection: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let rotator = Self::new("test rotator", "/dev/null");
        *rotator.connection.write().expect("connection lock poisoned") =
            Some(DeviceConnection::new(transport));
        rotator
    }

    fn lock(&self) -> MutexGuard<'_, RotatorState> {
        self.state.lock().expect("rotator state poisoned")
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

    async fn command_echo(&self, command: &str) -> ASCOMResult {
        let transport = self.transport()?;
        let echo = exchange_line(transport.as_ref(), &format!("{command}\n")).await?;
        if echo.trim_end() == command {
            Ok(())
        } else {
            Err(ASCOMError::driver_error(format_args!(
                "Rotator echoed {echo:?} for {command:?}"
            )))
        }
    }
}

#[async_trait]
impl Device for FalconRotator {
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
                SerialTransport::open(&self.device_path, SerialConfig::BAUD_115200).map_err(
                    |err| {
                        ASCOMError::driver_error(format_args!(
                            "Problem opening serial connection at {}: {err}",
                            self.device_path
                        ))
                    },
                )?,
            );
            let probe = exchange_line(transport.as_ref(), "F#\n").await?;
            tracing::debug!(probe, "Connected to rotator");

            let connection = DeviceConnection::new(Arc::clone(&transport));
            {
                let state = Arc::clone(&self.state);
                connection.spawn_poller(POLL_INTERVAL, move || {
                    let transport = Arc::clone(&transport);
                    let state = Arc::clone(&state);
                    async move {
                        if let Err(err) = refresh(transport.as_ref(), &state).await {
                            tracing::warn!(%err, "Problem refreshing rotator state");
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
            *self.lock() = RotatorState::default();
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Robotic field rotator".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " rotator driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl Rotator for FalconRotator {
    async fn can_reverse(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(true)
    }

    async fn is_moving(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().moving)
    }

    async fn position(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().position)
    }

    async fn mechanical_position(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().mechanical_position)
    }

    async fn reversed(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().reversed)
    }

    async fn set_reversed(&self, reversed: bool) -> ASCOMResult {
        self.command_echo(&format!("FN:{}", u8::from(reversed))).await?;
        self.lock().reversed = reversed;
        Ok(())
    }

    async fn target_position(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().target_position)
    }

    async fn halt(&self) -> ASCOMResult {
        let transport = self.transport()?;
        let _ = transport.exchange(b"FH\n", ReadExpectation::None).await?;
        self.lock().moving = false;
        Ok(())
    }

    async fn move_relative(&self, position: f64) -> ASCOMResult {
        let target = (self.lock().position + position).rem_euclid(360.0);
        self.move_absolute(target).await
    }

    async fn move_absolute(&self, position: f64) -> ASCOMResult {
        check_angle("Position", position)?;
        self.command_echo(&format!("MD:{position:.2}")).await?;
        let mut state = self.lock();
        state.target_position = position;
        state.moving = true;
        Ok(())
    }

    async fn move_mechanical(&self, position: f64) -> ASCOMResult {
        check_angle("Mechanical position", position)?;
        self.command_echo(&format!("MC:{position:.2}")).await?;
        let mut state = self.lock();
        state.target_position = position;
        state.moving = true;
        Ok(())
    }

    async fn sync(&self, position: f64) -> ASCOMResult {
        check_angle("Sync position", position)?;
        self.command_echo(&format!("SD:{position:.2}")).await?;
        self.lock().position = position;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{Reply, ScriptedTransport};
    use crate::ASCOMErrorCode;

    fn rotator_with(
        script: Vec<(&'static [u8], Reply)>,
    ) -> (FalconRotator, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let rotator = FalconRotator::with_transport(Arc::<ScriptedTransport>::clone(&transport));
        (rotator, transport)
    }

    #[tokio::test]
    async fn status_line_is_parsed_into_cached_state() {
        let (rotator, transport) = rotator_with(vec![(
            b"FR\n".as_slice(),
            Reply::Bytes(b"FR:182.50:180.00:0:1\n"),
        )]);
        refresh(transport.as_ref(), &rotator.state).await.unwrap();
        assert!((rotator.position().await.unwrap() - 182.5).abs() < f64::EPSILON);
        assert!((rotator.mechanical_position().await.unwrap() - 180.0).abs() < f64::EPSILON);
        assert!(!rotator.is_moving().await.unwrap());
        assert!(rotator.reversed().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test]
    async fn absolute_move_is_echoed_and_sets_target() {
        let (rotator, transport) = rotator_with(vec![(
            b"MD:90.00\n".as_slice(),
            Reply::Bytes(b"MD:90.00\n"),
        )]);
        rotator.move_absolute(90.0).await.unwrap();
        assert!(rotator.is_moving().await.unwrap());
        assert!((rotator.target_position().await.unwrap() - 90.0).abs() < f64::EPSILON);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn relative_move_wraps_around_the_circle() {
        let (rotator, transport) = rotator_with(vec![(
            b"MD:10.00\n".as_slice(),
            Reply::Bytes(b"MD:10.00\n"),
        )]);
        rotator.lock().position = 350.0;
        rotator.move_relative(20.0).await.unwrap();
        transport.assert_drained();
    }

    #[tokio::test]
    async fn sync_offsets_the_reported_position() {
        let (rotator, transport) = rotator_with(vec![(
            b"SD:12.00\n".as_slice(),
            Reply::Bytes(b"SD:12.00\n"),
        )]);
        rotator.sync(12.0).await.unwrap();
        assert!((rotator.position().await.unwrap() - 12.0).abs() < f64::EPSILON);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn angles_are_validated_before_transmission() {
        let (rotator, transport) = rotator_with(vec![]);
        for result in [
            rotator.move_absolute(360.0).await,
            rotator.move_mechanical(-0.1).await,
            rotator.sync(400.0).await,
        ] {
            assert_eq!(result.unwrap_err().code, ASCOMErrorCode::INVALID_VALUE);
        }
        transport.assert_drained();
    }
}
