//! Filter wheel driven through the parent camera's SDK handle.
//!
//! The wheel is a child device: it shares the camera's hardware handle and
//! its lifetime is nested inside the parent camera's.

use super::sdk::CameraSdk;
use crate::api::{Device, FilterWheel};
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct WheelState {
    connected: bool,
    /// Slot a move was issued towards; cleared once the wheel reports it.
    busy_target: Option<u32>,
}

/// A filter wheel attached through the camera body.
#[derive(Debug)]
pub struct CameraFilterWheel {
    name: String,
    unique_id: String,
    sdk: Arc<dyn CameraSdk>,
    names: Vec<String>,
    focus_offsets: Vec<i32>,
    state: Mutex<WheelState>,
}

impl CameraFilterWheel {
    /// Creates the wheel over the parent camera's SDK handle.
    ///
    /// Fails if the camera reports no wheel or the configured names and
    /// focus offsets disagree in length.
    pub fn new(
        name: impl Into<String>,
        sdk: Arc<dyn CameraSdk>,
        names: Vec<String>,
        focus_offsets: Vec<i32>,
    ) -> eyre::Result<Self> {
        let slots = sdk.filter_wheel_slots() as usize;
        eyre::ensure!(slots > 0, "Camera has no filter wheel attached");
        eyre::ensure!(
            names.len() == slots,
            "{} filter names configured for a {slots}-slot wheel",
            names.len()
        );
        eyre::ensure!(
            names.len() == focus_offsets.len(),
            "Filter names and focus offsets differ in length"
        );
        let unique_id = format!("{}-wheel", sdk.serial());
        Ok(Self {
            name: name.into(),
            unique_id,
            sdk,
            names,
            focus_offsets,
            state: Mutex::new(WheelState::default()),
        })
    }

    fn ensure_connected(&self) -> ASCOMResult {
        if self.state.lock().expect("wheel state poisoned").connected {
            Ok(())
        } else {
            Err(ASCOMError::NOT_CONNECTED)
        }
    }

    async fn hardware_position(&self) -> ASCOMResult<u32> {
        let sdk = Arc::clone(&self.sdk);
        tokio::task::spawn_blocking(move || sdk.filter_wheel_position())
            .await
            .map_err(|err| ASCOMError::driver_error(format_args!("SDK call panicked: {err}")))?
            .map_err(Into::into)
    }
}

#[async_trait]
impl Device for CameraFilterWheel {
    fn static_name(&self) -> &str {
        &self.name
    }

    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    async fn connected(&self) -> ASCOMResult<bool> {
        Ok(self.state.lock().expect("wheel state poisoned").connected)
    }

    async fn set_connected(&self, connected: bool) -> ASCOMResult {
        let mut state = self.state.lock().expect("wheel state poisoned");
        state.connected = connected;
        if !connected {
            state.busy_target = None;
        }
        Ok(())
    }

    async fn description(&self) -> ASCOMResult<String> {
        Ok("Through-the-camera filter wheel".to_owned())
    }

    async fn driver_info(&self) -> ASCOMResult<String> {
        Ok(concat!(env!("CARGO_PKG_NAME"), " camera filter wheel driver").to_owned())
    }

    async fn driver_version(&self) -> ASCOMResult<String> {
        Ok(env!("CARGO_PKG_VERSION").to_owned())
    }
}

#[async_trait]
impl FilterWheel for CameraFilterWheel {
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
        let reported = self.hardware_position().await?;
        let mut state = self.state.lock().expect("wheel state poisoned");
        match state.busy_target {
            Some(target) if target != reported => Ok(-1),
            _ => {
                state.busy_target = None;
                Ok(i32::try_from(reported).expect("slot number fits in i32"))
            }
        }
    }

    async fn set_position(&self, position: i32) -> ASCOMResult {
        self.ensure_connected()?;
        let slot = u32::try_from(position)
            .ok()
            .filter(|&slot| (slot as usize) < self.names.len())
            .ok_or_else(|| {
                ASCOMError::invalid_value(format_args!(
                    "{position} is an invalid filter position"
                ))
            })?;
        let sdk = Arc::clone(&self.sdk);
        tokio::task::spawn_blocking(move || sdk.set_filter_wheel_position(slot))
            .await
            .map_err(|err| ASCOMError::driver_error(format_args!("SDK call panicked: {err}")))??;
        self.state.lock().expect("wheel state poisoned").busy_target = Some(slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::camera::SimulatedCamera;
    use crate::ASCOMErrorCode;

    fn wheel() -> CameraFilterWheel {
        let sdk: Arc<dyn CameraSdk> = Arc::new(SimulatedCamera::default());
        sdk.open().unwrap();
        CameraFilterWheel::new(
            "test wheel",
            sdk,
            ["L", "R", "G", "B", "Ha"].map(str::to_owned).to_vec(),
            vec![0, 10, 10, 12, 40],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn names_and_offsets_match_in_length() {
        let wheel = wheel();
        wheel.set_connected(true).await.unwrap();
        assert_eq!(
            wheel.names().await.unwrap().len(),
            wheel.focus_offsets().await.unwrap().len()
        );
    }

    #[test]
    fn mismatched_offsets_are_rejected_at_construction() {
        let sdk: Arc<dyn CameraSdk> = Arc::new(SimulatedCamera::default());
        let result = CameraFilterWheel::new(
            "bad wheel",
            sdk,
            ["L", "R", "G", "B", "Ha"].map(str::to_owned).to_vec(),
            vec![0, 10],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn moves_are_bounded_by_slot_count() {
        let wheel = wheel();
        wheel.set_connected(true).await.unwrap();
        wheel.set_position(3).await.unwrap();
        assert_eq!(wheel.position().await.unwrap(), 3);

        for bad in [-1, 5] {
            let err = wheel.set_position(bad).await.unwrap_err();
            assert_eq!(err.code, ASCOMErrorCode::INVALID_VALUE);
        }
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let wheel = wheel();
        assert_eq!(
            wheel.position().await.unwrap_err().code,
            ASCOMErrorCode::NOT_CONNECTED
        );
    }
}
