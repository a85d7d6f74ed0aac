//! Device-protocol drivers.
//!
//! Every serial driver follows the same shape: `set_connected(true)` opens
//! the port, sends a known-good probe and spawns a background poller that
//! parses the device's status line into cached state; handlers read the
//! cache under the device mutex while writes go out inline on the port.
//! The camera driver follows the same shape over a vendor SDK handle
//! instead of a port.

pub mod camera;
pub mod filter_wheel;
pub mod focuser;
pub mod mount;
pub mod rotator;
pub mod switch;

pub use camera::{CameraFilterWheel, ControlPresentation, SdkCamera, SimulatedCamera};
pub use filter_wheel::SerialFilterWheel;
pub use focuser::FocusCubeFocuser;
pub use mount::SerialMount;
pub use rotator::FalconRotator;
pub use switch::PowerBoxSwitch;

use crate::transport::Transport;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A live device connection: the open transport plus the background tasks
/// tied to its lifetime.
///
/// Shutting down cancels the tasks and waits for them, so no poller can
/// race against the port being released.
#[derive(Debug)]
pub(crate) struct DeviceConnection {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) cancel: CancellationToken,
    pub(crate) tasks: TaskTracker,
}

impl DeviceConnection {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Runs `poll` every `interval` until the connection shuts down.
    pub(crate) fn spawn_poller<F, Fut>(&self, interval: Duration, poll: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let cancel = self.cancel.clone();
        let _ = self.tasks.spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                poll().await;
            }
            tracing::debug!("Device poller stopped");
        });
    }

    /// Stops the background tasks and waits for them to finish.
    ///
    /// Dropping the transport afterwards releases the port.
    pub(crate) async fn shutdown(self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

/// Splits a colon-delimited device status line.
pub(crate) fn split_status(line: &str) -> Vec<&str> {
    line.trim_end_matches(['\r', '\n']).split(':').collect()
}
