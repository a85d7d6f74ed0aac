use super::Device;
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;

/// Switch-bank-specific methods.
///
/// A switch device is an indexed set of channels; a channel may be a simple
/// boolean output, a PWM duty cycle, a read-only sensor reading, or an
/// enumerated setting, as described by its min/max/step.
#[async_trait]
pub trait Switch: Device {
    /// The number of channels in this bank.
    ///
    /// Valid channel ids are `0..max_switch`.
    async fn max_switch(&self) -> ASCOMResult<i32>;

    /// Whether the given channel accepts writes.
    async fn can_write(&self, id: i32) -> ASCOMResult<bool>;

    /// The boolean state of the given channel.
    ///
    /// Analogue channels read as `true` whenever their value is non-zero.
    async fn get_switch(&self, id: i32) -> ASCOMResult<bool>;

    /// A human-readable description of the given channel.
    async fn get_switch_description(&self, id: i32) -> ASCOMResult<String>;

    /// The display name of the given channel.
    async fn get_switch_name(&self, id: i32) -> ASCOMResult<String>;

    /// The analogue value of the given channel.
    async fn get_switch_value(&self, id: i32) -> ASCOMResult<f64>;

    /// The minimum analogue value accepted by the given channel.
    async fn min_switch_value(&self, id: i32) -> ASCOMResult<f64>;

    /// The maximum analogue value accepted by the given channel.
    async fn max_switch_value(&self, id: i32) -> ASCOMResult<f64>;

    /// The analogue resolution of the given channel.
    async fn switch_step(&self, id: i32) -> ASCOMResult<f64>;

    /// Sets the boolean state of the given channel.
    async fn set_switch(&self, id: i32, state: bool) -> ASCOMResult;

    /// Renames the given channel.
    async fn set_switch_name(&self, _id: i32, _name: String) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Sets the analogue value of the given channel.
    async fn set_switch_value(&self, id: i32, value: f64) -> ASCOMResult;
}
