use super::Device;
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;

/// Focuser-specific methods.
#[async_trait]
pub trait Focuser: Device {
    /// Whether the focuser moves to absolute positions.
    async fn absolute(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    /// Whether the focuser is currently moving.
    async fn is_moving(&self) -> ASCOMResult<bool>;

    /// Maximum number of steps allowed in one `move` call.
    async fn max_increment(&self) -> ASCOMResult<i32>;

    /// Maximum step position permitted.
    async fn max_step(&self) -> ASCOMResult<i32>;

    /// Current focuser position, in steps.
    async fn position(&self) -> ASCOMResult<i32>;

    /// Step size in microns, if the focuser knows it.
    async fn step_size(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Whether temperature compensation is active.
    async fn temp_comp(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Switches temperature compensation on and off.
    async fn set_temp_comp(&self, _temp_comp: bool) -> ASCOMResult {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Whether the focuser has temperature compensation at all.
    async fn temp_comp_available(&self) -> ASCOMResult<bool> {
        Ok(false)
    }

    /// Ambient temperature at the focuser, in degrees Celsius.
    async fn temperature(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// Immediately stops any focuser motion.
    async fn halt(&self) -> ASCOMResult;

    /// Moves the focuser to the given absolute position, in steps.
    async fn move_to(&self, position: i32) -> ASCOMResult;
}
