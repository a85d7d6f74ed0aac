use super::Device;
use crate::ASCOMResult;
use async_trait::async_trait;

/// Filter-wheel-specific methods.
#[async_trait]
pub trait FilterWheel: Device {
    /// Focus offsets for each filter slot, in focuser steps.
    ///
    /// Always the same length as `names`.
    async fn focus_offsets(&self) -> ASCOMResult<Vec<i32>>;

    /// Filter names, one per slot.
    async fn names(&self) -> ASCOMResult<Vec<String>>;

    /// The currently selected slot, or `-1` while the wheel is moving.
    async fn position(&self) -> ASCOMResult<i32>;

    /// Rotates the wheel to the given slot.
    async fn set_position(&self, position: i32) -> ASCOMResult;
}
