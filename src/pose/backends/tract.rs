#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::config::SentinelConfig;
use crate::pose::backend::PoseEstimator;
use crate::pose::landmark::{BodySide, PoseLandmarks};

/// MediaPipe / BlazePose keypoint indices.
const LEFT_EAR: usize = 7;
const RIGHT_EAR: usize = 8;
const LEFT_SHOULDER: usize = 11;
const RIGHT_SHOULDER: usize = 12;
const LEFT_HIP: usize = 23;
const RIGHT_HIP: usize = 24;

const MIN_VISIBILITY: f32 = 0.5;

/// Tract-based backend for BlazePose-style ONNX landmark models.
///
/// Expects a single output of shape `[1, N, K]` with `N >= 25` keypoints and
/// `K >= 2` values per keypoint (x, y, optional z, optional visibility).
/// Coordinates may be normalized or in model-input pixels. No network I/O,
/// nothing written to disk beyond model loading.
pub struct TractPoseEstimator {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_width: u32,
    input_height: u32,
    side: BodySide,
}

impl TractPoseEstimator {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            side: BodySide::Left,
        })
    }

    pub fn with_side(mut self, side: BodySide) -> Self {
        self.side = side;
        self
    }

    pub fn from_config(config: &SentinelConfig) -> Result<Box<dyn PoseEstimator>> {
        let model_path = config
            .pose
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("pose.model_path is required for the tract backend"))?;
        let estimator = Self::new(
            model_path,
            config.pose.input_width,
            config.pose.input_height,
        )?
        .with_side(config.pose.side);
        Ok(Box::new(estimator))
    }

    /// Nearest-neighbour resize of an RGB24 frame into a CHW float tensor.
    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let (src_w, src_h) = (width as usize, height as usize);
        let (dst_w, dst_h) = (self.input_width as usize, self.input_height as usize);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, dst_h, dst_w),
            |(_, channel, y, x)| {
                let sx = x * src_w / dst_w;
                let sy = y * src_h / dst_h;
                pixels[(sy * src_w + sx) * 3 + channel] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn extract_landmarks(&self, outputs: TVec<TValue>) -> Result<Option<PoseLandmarks>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[1] <= RIGHT_HIP || shape[2] < 2 {
            return Err(anyhow!("unexpected landmark output shape {:?}", shape));
        }

        let (ear, shoulder, hip) = match self.side {
            BodySide::Left => (LEFT_EAR, LEFT_SHOULDER, LEFT_HIP),
            BodySide::Right => (RIGHT_EAR, RIGHT_SHOULDER, RIGHT_HIP),
        };

        let mut points = [(0.0f32, 0.0f32); 3];
        for (slot, index) in points.iter_mut().zip([ear, shoulder, hip]) {
            if shape[2] > 3 && visibility(view[[0, index, 3]]) < MIN_VISIBILITY {
                return Ok(None);
            }
            *slot = self.normalize(view[[0, index, 0]], view[[0, index, 1]]);
        }

        Ok(Some(PoseLandmarks::new(points[0], points[1], points[2])))
    }

    fn normalize(&self, x: f32, y: f32) -> (f32, f32) {
        // Values well outside 0..1 are model-input pixels.
        if x.abs() > 1.5 || y.abs() > 1.5 {
            (x / self.input_width as f32, y / self.input_height as f32)
        } else {
            (x, y)
        }
    }
}

/// BlazePose emits visibility as a logit; normalized models emit 0..1.
fn visibility(raw: f32) -> f32 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        1.0 / (1.0 + (-raw).exp())
    }
}

impl PoseEstimator for TractPoseEstimator {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn estimate(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<PoseLandmarks>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_landmarks(outputs)
    }
}
