//! Frame isolation layer.
//!
//! - `RawFrame`: Opaque container for webcam pixels. Bytes are private.
//! - `InferenceView`: Restricted view that pose estimators receive.
//!
//! A frame lives for exactly one iteration of the detection loop. Pixels are
//! zeroized on drop and there is no API that hands them out: estimators see
//! them only for the duration of `InferenceView::run_estimator`.

use anyhow::Result;
use zeroize::Zeroize;

use crate::pose::{PoseEstimator, PoseLandmarks};

// ----------------------------------------------------------------------------
// RawFrame: Opaque pixel container
// ----------------------------------------------------------------------------

/// Opaque webcam frame. Bytes are private; there is no `.as_bytes()`, no `Clone`.
pub struct RawFrame {
    /// Private RGB24 pixel data. MUST NOT be exposed via any public API.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Per-camera frame counter, starting at 1.
    sequence: u64,
}

impl RawFrame {
    /// Create a new raw frame. Called only by the ingestion layer.
    pub(crate) fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
        }
    }

    /// Synthetic RGB24 frame (a shifting gradient) for `stub://` cameras,
    /// demos and tests.
    pub fn synthetic(width: u32, height: u32, sequence: u64) -> Self {
        let pixel_count = (width as usize) * (height as usize) * 3;
        let data = (0..pixel_count)
            .map(|i| ((i as u64 + sequence) % 256) as u8)
            .collect();
        Self::new(data, width, height, sequence)
    }

    /// Estimators get a restricted view. Cannot extract bytes.
    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// InferenceView: Restricted interface for estimators
// ----------------------------------------------------------------------------

/// Restricted view of a frame for pose estimation.
///
/// `InferenceView` provides dimensions, the frame sequence number and the
/// ability to run an estimator. It has no raw byte access.
pub struct InferenceView<'a> {
    frame: &'a RawFrame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence
    }

    /// Run a pose estimator on this frame.
    ///
    /// Pixels flow in to the estimator; only landmarks flow out.
    pub fn run_estimator<E: PoseEstimator + ?Sized>(
        &self,
        estimator: &mut E,
    ) -> Result<Option<PoseLandmarks>> {
        estimator.estimate(&self.frame.data, self.frame.width, self.frame.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::ScriptedEstimator;

    fn make_test_frame(data: &[u8]) -> RawFrame {
        RawFrame::new(data.to_vec(), 640, 480, 1)
    }

    #[test]
    fn inference_view_provides_metadata() {
        let frame = make_test_frame(b"test pixels");
        let view = frame.inference_view();

        assert_eq!(view.width(), 640);
        assert_eq!(view.height(), 480);
        assert_eq!(view.sequence(), 1);
    }

    #[test]
    fn inference_view_runs_estimator() -> Result<()> {
        let frame = make_test_frame(b"test pixels");
        let mut estimator = ScriptedEstimator::new(vec![None]);

        let landmarks = frame.inference_view().run_estimator(&mut estimator)?;
        assert!(landmarks.is_none());
        assert_eq!(estimator.calls(), 1);
        Ok(())
    }
}
