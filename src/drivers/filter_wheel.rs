//! Serial driver for standalone USB filter wheels.
//!
//! Protocol: bare ASCII commands at 9600 baud with fixed-width replies.
//! `VRS` returns an 8-character firmware version, `MXP` the slot count as
//! one digit, `NOW` the current slot as one digit; transmitting a slot
//! digit starts a move and is echoed once the wheel arrives.

use super::DeviceConnection;
use crate::api::{Device, FilterWheel};
use crate::transport::{ReadExpectation, SerialConfig, SerialTransport, Transport};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct WheelState {
    position: i32,
    /// Slot a move was issued towards; cleared when a poll reads it back.
    busy_target: Option<i32>,
}

/// A standalone serial filter wheel.
#[derive(Debug)]
pub struct SerialFilterWheel {
    name: String,
    device_path: String,
    names: Vec<String>,
    focus_offsets: Vec<i32>,
    state: Arc<Mutex<WheelState>>,
    connection: RwLock<Option<DeviceConnection>>,
}

fn parse_slot_digit(raw: &[u8]) -> ASCOMResult<i32> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ASCOMError::driver_error("Filter wheel sent a non-ASCII reply"))?;
    text.trim()
        .parse()
        .map_err(|_| ASCOMError::driver_error(format_args!("Bad slot digit {text:?}")))
}

async fn poll_position(transport: &dyn Transport, state: &Mutex<WheelState>) -> ASCOMResult<()> {
    let raw = transport
        .exchange(b"NOW", ReadExpectation::Exact(1))
        .await?;
    let position = parse_slot_digit(&raw)?;
    let mut state = state.lock().expect("filter wheel state poisoned");
    state.position = position;
    if state.busy_target == Some(position) {
        state.busy_target = None;
    }
    Ok(())
}

impl SerialFilterWheel {
    /// Creates a driver for the wheel on the given serial device path.
    ///
    /// Fails if the configured names and focus offsets disagree in length.
    pub fn new(
        name: impl Into<String>,
        device_path: impl Into<String>,
        names: Vec<String>,
        focus_offsets: Vec<i32>,
    ) -> eyre::Result<Self> {
        eyre::ensure!(!names.is_empty(), "At least one filter name is required");
        eyre::ensure!(
            names.len() == focus_offsets.len(),
            "Filter names and focus offsets differ in length"
        );
        Ok(Self {
            name: name.into(),
            device_path: device_path.into(),
            names,
            focus_offsets,
            state: Arc::new(Mutex::new(WheelState::default())),
            connection: RwLock::new(None),
        })
    }

    #[cfg(test)]
    fn with_transport(transport: Arc<dyn Transport>) -> Self {
        let wheel = Self::new(
            "test wheel",
            "/dev/null",
            ["L", "R", "G", "B", "Ha"].map(str::to_owned).to_vec(),
            vec![0, 10, 10, 12, 40],
        )
        .expect("test configuration is valid");
        *wheel.connection.write().expect("connection lock poisoned") =
            Some(DeviceConnection::new(transport));
        wheel
    }

    fn lock(&self) -> MutexGuard<'_, WheelState> {
        self.state.lock().expect("filter wheel state poisoned")
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
impl Device for SerialFilterWheel {
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
            let version = transport
                .exchange(b"VRS", ReadExpectation::Exact(8))
                .await?;
            tracing::debug!(version = %String::from_utf8_lossy(&version), "Connected to filter wheel");

            let slots = parse_slot_digit(
                &transport.exchange(b"MXP", ReadExpectation::Exact(1)).await?,
            )?;
            if usize::try_from(slots).ok() != Some(self.names.len()) {
                return Err(ASCOMError::driver_error(format_args!(
                    "Wheel reports {slots} slots but {} names are configured",
                    self.names.len()
                )));
            }

            let connection = DeviceConnection::new(Arc::clone(&transport));
            {
                let state = Arc::clone(&self.state);
                connection.spawn_poller(POLL_INTERVAL, move || {
                    let transport = Arc::clone(&transport);
                    let state = Arc::clone(&state);
                    async move {
                        if let Err(err) = poll_position(transport.as_ref(), &state).await {
                            tracing::warn!(%err, "Problem polling filter wheel position");
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
            *self.lock() = WheelState::default();
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Standalone USB filter wheel".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " filter wheel driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl FilterWheel for SerialFilterWheel {
    async fn focus_offsets(&self) -> ASCOMResult<Vec<i32>> {
        self.ensure_connected()?;
        Ok(self.focus_offsets.clone())
    }

    async fn names(&self) -> ASCOMResult<Vec<String>> {
        self.ensure_connected()?;
        Ok(self.names.clone())
    }

    async fn position(&self) -> ASCOMResult<i32> {
        self.ensure_connected()?;
        let state = self.lock();
        if state.busy_target.is_some() {
            Ok(-1)
        } else {
            Ok(state.position)
        }
    }

    async fn set_position(&self, position: i32) -> ASCOMResult {
        let slot = usize::try_from(position)
            .ok()
            .filter(|&slot| slot < self.names.len())
            .ok_or_else(|| {
                ASCOMError::invalid_value(format_args!(
                    "{position} is an invalid filter position"
                ))
            })?;
        let transport = self.transport()?;
        let command = slot.to_string();
        let _ = transport
            .exchange(command.as_bytes(), ReadExpectation::None)
            .await?;
        // Flag the motion now; the poll clears it once the wheel arrives.
        self.lock().busy_target = Some(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{Reply, ScriptedTransport};
    use crate::ASCOMErrorCode;

    fn wheel_with(
        script: Vec<(&'static [u8], Reply)>,
    ) -> (SerialFilterWheel, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let wheel = SerialFilterWheel::with_transport(Arc::<ScriptedTransport>::clone(&transport));
        (wheel, transport)
    }

    #[tokio::test]
    async fn move_reports_busy_until_the_poll_reads_the_target() {
        let (wheel, transport) = wheel_with(vec![
            (b"3".as_slice(), Reply::Bytes(b"")),
            (b"NOW".as_slice(), Reply::Bytes(b"1")),
            (b"NOW".as_slice(), Reply::Bytes(b"3")),
        ]);
        wheel.set_position(3).await.unwrap();
        assert_eq!(wheel.position().await.unwrap(), -1);

        // Still travelling.
        poll_position(transport.as_ref(), &wheel.state)
            .await
            .unwrap();
        assert_eq!(wheel.position().await.unwrap(), -1);

        // Arrived.
        poll_position(transport.as_ref(), &wheel.state)
            .await
            .unwrap();
        assert_eq!(wheel.position().await.unwrap(), 3);
        transport.assert_drained();
    }

    #[tokio::test]
    async fn out_of_range_slots_are_invalid_value() {
        let (wheel, transport) = wheel_with(vec![]);
        for bad in [-1, 5] {
            let err = wheel.set_position(bad).await.unwrap_err();
            assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        }
        transport.assert_drained();
    }

    #[tokio::test]
    async fn names_and_offsets_share_length() {
        let (wheel, _) = wheel_with(vec![]);
        assert_eq!(
            wheel.names().await.unwrap().len(),
            wheel.focus_offsets().await.unwrap().len()
        );
        assert!(SerialFilterWheel::new(
            "bad",
            "/dev/null",
            vec!["L".to_owned()],
            vec![0, 1]
        )
        .is_err());
    }
}
