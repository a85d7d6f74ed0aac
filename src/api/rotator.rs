use super::Device;
use crate::{ASCOMError, ASCOMResult};
use async_trait::async_trait;

/// Rotator-specific methods.
#[async_trait]
pub trait Rotator: Device {
    /// Whether this rotator can reverse its direction of rotation.
    async fn can_reverse(&self) -> ASCOMResult<bool> {
        Ok(true)
    }

    /// Whether the rotator is currently moving.
    async fn is_moving(&self) -> ASCOMResult<bool>;

    /// Current sky position angle in degrees, including any sync offset.
    async fn position(&self) -> ASCOMResult<f64>;

    /// Raw mechanical position angle in degrees, ignoring any sync offset.
    async fn mechanical_position(&self) -> ASCOMResult<f64>;

    /// Whether rotation direction is reversed.
    async fn reversed(&self) -> ASCOMResult<bool>;

    /// Sets whether rotation direction is reversed.
    async fn set_reversed(&self, reversed: bool) -> ASCOMResult;

    /// The minimum rotation step size in degrees, if the rotator knows it.
    async fn step_size(&self) -> ASCOMResult<f64> {
        Err(ASCOMError::NOT_IMPLEMENTED)
    }

    /// The destination angle of the current or last move, in degrees.
    async fn target_position(&self) -> ASCOMResult<f64>;

    /// Immediately stops rotator motion.
    async fn halt(&self) -> ASCOMResult;

    /// Moves by the given number of degrees relative to the current position.
    async fn move_relative(&self, position: f64) -> ASCOMResult;

    /// Moves to the given absolute sky position angle, in degrees.
    async fn move_absolute(&self, position: f64) -> ASCOMResult;

    /// Moves to the given raw mechanical angle, ignoring any sync offset.
    async fn move_mechanical(&self, position: f64) -> ASCOMResult;

    /// Syncs the rotator: the current mechanical angle now reads as `position`.
    async fn sync(&self, position: f64) -> ASCOMResult;
}
