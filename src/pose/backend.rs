use anyhow::Result;

use super::landmark::PoseLandmarks;

/// Pose estimator trait.
///
/// # Audit Boundary
///
/// Implementations receive raw webcam pixels and MUST NOT:
/// - Store the pixel slice beyond the `estimate` call
/// - Write frames to disk
/// - Transmit frames over the network
///
/// Only the three landmarks used for posture evaluation leave the estimator.
pub trait PoseEstimator: Send {
    /// Estimator identifier.
    fn name(&self) -> &'static str;

    /// Estimate ear/shoulder/hip landmarks on an RGB24 frame.
    ///
    /// `Ok(None)` means no person (or no confident pose) in the frame.
    fn estimate(&mut self, pixels: &[u8], width: u32, height: u32)
        -> Result<Option<PoseLandmarks>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
