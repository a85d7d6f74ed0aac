//! Serial driver for FocusCube-class electronic focusers.
//!
//! Protocol: newline-terminated commands at 115200 baud. `FA` returns the
//! colon-delimited status line `FC3:{position}:{moving}:{temperature}:{_}:{backlash}`,
//! `FM:{n}` moves (echoed back), `FH` halts with no reply.

use super::{split_status, DeviceConnection};
use crate::api::{Device, Focuser};
use crate::transport::{ReadExpectation, SerialConfig, SerialTransport, Transport};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_INCREMENT: i32 = 500;
const MAX_STEP: i32 = 1_000_000;

#[derive(Debug, Default)]
struct FocuserState {
    position: i32,
    moving: bool,
    temperature: f64,
    backlash: i32,
}

/// A FocusCube-class absolute focuser on a serial port.
#[derive(Debug)]
pub struct FocusCubeFocuser {
    name: String,
    device_path: String,
    state: Arc<Mutex<FocuserState>>,
    connection: RwLock<Option<DeviceConnection>>,
}

async fn exchange_line(transport: &dyn Transport, command: &str) -> ASCOMResult<String> {
    let raw = transport
        .exchange(command.as_bytes(), ReadExpectation::Terminated(b'\n'))
        .await?;
    String::from_utf8(raw).map_err(|err| {
        ASCOMError::driver_error(format_args!("Focuser sent non-ASCII reply: {err}"))
    })
}

async fn refresh(transport: &dyn Transport, state: &Mutex<FocuserState>) -> ASCOMResult<()> {
    let line = exchange_line(transport, "FA\n").await?;
    let fields = split_status(&line);
    if fields.first() != Some(&"FC3") || fields.len() < 6 {
        return Err(ASCOMError::driver_error(
            "Did not receive correctly formatted data from focuser",
        ));
    }
    let parsed = FocuserState {
        position: fields[1]
            .parse()
            .map_err(|_| ASCOMError::driver_error("Bad position field"))?,
        moving: fields[2] == "1",
        temperature: fields[3]
            .parse()
            .map_err(|_| ASCOMError::driver_error("Bad temperature field"))?,
        backlash: fields[5]
            .parse()
            .map_err(|_| ASCOMError::driver_error("Bad backlash field"))?,
    };
    *state.lock().expect("focuser state poisoned") = parsed;
    Ok(())
}

impl FocusCubeFocuser {
    /// Creates a driver for the focuser on the given serial device path.
    pub fn new(name: impl Into<String>, device_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device_path: device_path.into(),
            state: Arc::new(Mutex::new(FocuserState::default())),
            connection: RwLock::new(None),
        }
    }

    #[cfg(test)]
    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let focuser = Self::new("test focuser", "/dev/null");
        *focuser.connection.write().expect("connection lock poisoned") =
            Some(DeviceConnection::new(transport));
        focuser
    }

    fn lock(&self) -> MutexGuard<'_, FocuserState> {
        self.state.lock().expect("focuser state poisoned")
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
}

#[async_trait]
impl Device for FocusCubeFocuser {
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
            let probe = exchange_line(transport.as_ref(), "##\r\n").await?;
            tracing::debug!(probe, "Connected to focuser");

            let connection = DeviceConnection::new(Arc::clone(&transport));
            {
                let state = Arc::clone(&self.state);
                connection.spawn_poller(POLL_INTERVAL, move || {
                    let transport = Arc::clone(&transport);
                    let state = Arc::clone(&state);
                    async move {
                        if let Err(err) = refresh(transport.as_ref(), &state).await {
                            tracing::warn!(%err, "Problem refreshing focuser state");
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
            *self.lock() = FocuserState::default();
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Electronic focuser".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " focuser driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl Focuser for FocusCubeFocuser {
    async fn absolute(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(true)
    }

    async fn is_moving(&self) -> ASCOMResult<bool> {
        self.ensure_connected()?;
        Ok(self.lock().moving)
    }

    async fn max_increment(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(MAX_INCREMENT)
    }

    async fn max_step(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(MAX_STEP)
    }

    async fn position(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        Ok(self.lock().position)
    }

    async fn temperature(&self) -> ASCOMResult<f64> {
        self.ensure_connected()?;
        Ok(self.lock().temperature)
    }

    async fn halt(&self) -> ASCOMResult {
        let transport = self.transport()?;
        let _ = transport.exchange(b"FH\n", ReadExpectation::None).await?;
        self.lock().moving = false;
        Ok(())
    }

    async fn move_to(&self, position: i32) -> ASCOMResult {
        if !(0..=MAX_STEP).contains(&position) {
            return Err(ASCOMError::invalid_value(format_args!(
                "Position {position} is not within 0 - {MAX_STEP}"
            )));
        }
        let transport = self.transport()?;
        let command = format!("FM:{position}\n");
        let echo = exchange_line(transport.as_ref(), &command).await?;
        if echo.trim_end() != command.trim_end() {
            return Err(ASCOMError::driver_error(format_args!(
                "Focuser echoed {echo:?} for {command:?}"
            )));
        }
        // The next poll refreshes the position; flag the motion now so a
        // client polling immediately after the move sees it.
        self.lock().moving = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{Reply, ScriptedTransport};
    use crate::ASCOMErrorCode;

    fn focuser_with(
        script: Vec<(&'static [u8], Reply)>,
    ) -> (FocusCubeFocuser, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let focuser =
            FocusCubeFocuser::with_transport(Arc::<ScriptedTransport>::clone(&transport));
        (focuser, transport)
    }

    #[tokio::test]
    async fn status_line_is_parsed_into_cached_state() {
        let (focuser, transport) = focuser_with(vec![(
            b"FA\n".as_slice(),
            Reply::Bytes(b"FC3:12500:0:22.2:0:150\n"),
        )]);
        refresh(transport.as_ref(), &focuser.state).await.unwrap();
        assert_eq!(focuser.position().await.unwrap(), 12_500);
        assert!(!focuser.is_moving().await.unwrap());
        assert!((focuser.temperature().await.unwrap() - 22.2).abs() < f64::EPSILON);
        assert_eq!(focuser.lock().backlash, 150);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn malformed_status_is_a_driver_error() {
        let (focuser, transport) = focuser_with(vec![(
            b"FA\n".as_slice(),
            Reply::Bytes(b"GARBAGE:1:2\n"),
        )]);
        let err = refresh(transport.as_ref(), &focuser.state)
            .await
            .unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::DRIVER_ERROR);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn move_is_echo_verified_and_sets_moving() {
        let (focuser, transport) = focuser_with(vec![(
            b"FM:20000\n".as_slice(),
            Reply::Bytes(b"FM:20000\n"),
        )]);
        focuser.move_to(20_000).await.unwrap();
        assert!(focuser.is_moving().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test]
    async fn echo_mismatch_is_a_driver_error() {
        let (focuser, transport) = focuser_with(vec![(
            b"FM:20000\n".as_slice(),
            Reply::Bytes(b"ERR\n"),
        )]);
        let err = focuser.move_to(20_000).await.unwrap_err();
        assert_eq!(err.code, ASCOMErrorCode::DRIVER_ERROR);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn halt_sends_without_expecting_a_reply() {
        let (focuser, transport) = focuser_with(vec![(b"FH\n".as_slice(), Reply::Bytes(b""))]);
        focuser.lock().moving = true;
        focuser.halt().await.unwrap();
        assert!(!focuser.is_moving().await.unwrap());
        transport.assert_drained();
    }

    #[tokio::test]
    async fn out_of_range_move_is_invalid_value() {
        let (focuser, transport) = focuser_with(vec![]);
        for bad in [-1, MAX_STEP + 1] {
            let err = focuser.move_to(bad).await.unwrap_err();
            assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        }
        transport.assert_drained();
    }

    #[tokio::test]
    async fn disconnected_focuser_fails_fast() {
        let focuser = FocusCubeFocuser::new("f", "/dev/null");
        assert_eq!(
            focuser.position().await.unwrap_err().code,
            ASCOMErrorCode::NOT_CONNECTED
        );
    }
}
