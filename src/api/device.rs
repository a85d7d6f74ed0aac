use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;
use std::fmt::Debug;

/// Methods common to all devices.
#[async_trait]
pub trait Device: Debug + Send + Sync {
    /// The device name as registered, without touching hardware.
    fn static_name(&self) -> &str;

    /// A stable identifier for this physical device, typically derived from
    /// the serial device path or the vendor serial number.
    ///
    /// Clients use this to pin to the same hardware across device-number
    /// reorderings between hub restarts.
    fn unique_id(&self) -> &str;

    /// Retrieves the connected state of the device.
    async fn connected(&self) -> ASCOMResult<bool>;

    /// Sets the connected state of the device.
    ///
    /// Connecting acquires the underlying serial port or SDK handle and
    /// spawns the background pollers; disconnecting stops them, waits for
    /// them to finish and releases the port.
    async fn set_connected(&self, connected: bool) -> ASCOMResult;

    /// The description of the device.
    async fn description(&self) -> ASCOMResult<String>;

    /// The description of the driver.
    async fn driver_info(&self) -> ASCOMResult<String>;

    /// A string containing only the major and minor version of the driver.
    async fn driver_version(&self) -> ASCOMResult<String>;

    /// The ASCOM interface version number that this device supports.
    async fn interface_version(&self) -> ASCOMResult<i32> {
        Ok(3)
    }

    /// The name of the device.
    async fn name(&self) -> ASCOMResult<String> {
        Ok(self.static_name().to_owned())
    }

    /// Returns the list of custom action names supported by this driver.
    async fn supported_actions(&self) -> ASCOMResult<Vec<String>> {
        Ok(vec![])
    }

    /// Invokes the named device-specific custom action.
    async fn action(&self, _action: String, _parameters: String) -> ASCOMResult<String> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Transmits an arbitrary string to the device without waiting for a response.
    async fn command_blind(&self, _command: String, _raw: String) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Transmits an arbitrary string to the device and waits for a boolean response.
    async fn command_bool(&self, _command: String, _raw: String) -> ASCOMResult<bool> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Transmits an arbitrary string to the device and waits for a string response.
    async fn command_string(&self, _command: String, _raw: String) -> ASCOMResult<String> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }
}
