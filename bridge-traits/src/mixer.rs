//! Output gain control.

use async_trait::async_trait;

use crate::error::Result;

/// Adjusts the output level of the audio device.
///
/// Launch failures are reported as [`BridgeError::Io`](crate::error::BridgeError::Io);
/// a mixer that runs but rejects the change reports
/// [`BridgeError::OperationFailed`](crate::error::BridgeError::OperationFailed).
#[async_trait]
pub trait MixerControl: Send + Sync {
    /// Apply a signed change in decibels relative to the current level.
    async fn adjust_gain(&self, delta_db: i32) -> Result<()>;
}
