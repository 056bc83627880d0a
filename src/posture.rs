//! Posture metric and evaluation.
//!
//! A `PostureMetric` is derived from the ear, shoulder and hip landmarks of one
//! frame. Evaluation is a disjunction: a closed neck angle OR a head pushed
//! sideways past a width-relative distance is bad posture. No smoothing is
//! applied here; temporal filtering belongs to the debouncer.

use crate::pose::PoseLandmarks;

pub const DEFAULT_ANGLE_THRESHOLD_DEGREES: f32 = 160.0;
pub const DEFAULT_DISTANCE_THRESHOLD_RATIO: f32 = 0.05;

/// Per-frame posture measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostureMetric {
    /// Angle at the shoulder between shoulder->ear and shoulder->hip, 0..=180.
    pub angle_degrees: f32,
    /// Horizontal distance between ear and shoulder, in pixels.
    pub horizontal_offset_px: f32,
    /// Width of the frame the landmarks were scaled to.
    pub frame_width_px: u32,
}

impl PostureMetric {
    /// Derive the metric from normalized landmarks and frame dimensions.
    ///
    /// Returns `None` when the ear or hip coincides with the shoulder, where
    /// the angle is undefined.
    pub fn from_landmarks(landmarks: &PoseLandmarks, width: u32, height: u32) -> Option<Self> {
        let ear = landmarks.ear.to_pixels(width, height);
        let shoulder = landmarks.shoulder.to_pixels(width, height);
        let hip = landmarks.hip.to_pixels(width, height);

        let angle_degrees = angle_at(shoulder, ear, hip)?;
        Some(Self {
            angle_degrees,
            horizontal_offset_px: (ear.0 - shoulder.0).abs(),
            frame_width_px: width,
        })
    }
}

/// Angle in degrees at `vertex` between the rays to `a` and `b`.
fn angle_at(vertex: (f32, f32), a: (f32, f32), b: (f32, f32)) -> Option<f32> {
    let (ux, uy) = (a.0 - vertex.0, a.1 - vertex.1);
    let (vx, vy) = (b.0 - vertex.0, b.1 - vertex.1);
    let norm_u = ux.hypot(uy);
    let norm_v = vx.hypot(vy);
    if norm_u <= f32::EPSILON || norm_v <= f32::EPSILON {
        return None;
    }
    let cos = ((ux * vx + uy * vy) / (norm_u * norm_v)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}

/// Returns true (bad posture) iff the angle is below `angle_threshold` or the
/// horizontal offset exceeds `frame_width_px * distance_threshold_ratio`.
pub fn evaluate(
    metric: &PostureMetric,
    angle_threshold: f32,
    distance_threshold_ratio: f32,
) -> bool {
    let distance_threshold_px = metric.frame_width_px as f32 * distance_threshold_ratio;
    metric.angle_degrees < angle_threshold || metric.horizontal_offset_px > distance_threshold_px
}

/// The two user-adjustable evaluation thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PostureThresholds {
    pub angle_threshold_degrees: f32,
    pub distance_threshold_ratio: f32,
}

impl PostureThresholds {
    pub fn evaluate(&self, metric: &PostureMetric) -> bool {
        evaluate(
            metric,
            self.angle_threshold_degrees,
            self.distance_threshold_ratio,
        )
    }

    pub fn distance_threshold_px(&self, frame_width_px: u32) -> f32 {
        frame_width_px as f32 * self.distance_threshold_ratio
    }
}

impl Default for PostureThresholds {
    fn default() -> Self {
        Self {
            angle_threshold_degrees: DEFAULT_ANGLE_THRESHOLD_DEGREES,
            distance_threshold_ratio: DEFAULT_DISTANCE_THRESHOLD_RATIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(angle_degrees: f32, horizontal_offset_px: f32) -> PostureMetric {
        PostureMetric {
            angle_degrees,
            horizontal_offset_px,
            frame_width_px: 640,
        }
    }

    #[test]
    fn upright_and_centered_is_good() {
        let thresholds = PostureThresholds::default();
        for angle in [160.0, 165.0, 175.0, 180.0] {
            for offset in [0.0, 10.0, 31.9, 32.0] {
                assert!(
                    !thresholds.evaluate(&metric(angle, offset)),
                    "angle={} offset={}",
                    angle,
                    offset
                );
            }
        }
    }

    #[test]
    fn closed_angle_is_bad_regardless_of_offset() {
        for offset in [0.0, 5.0, 32.0, 500.0] {
            assert!(evaluate(&metric(159.9, offset), 160.0, 0.05));
            assert!(evaluate(&metric(90.0, offset), 160.0, 0.05));
        }
    }

    #[test]
    fn large_offset_is_bad_regardless_of_angle() {
        for angle in [90.0, 160.0, 180.0] {
            assert!(evaluate(&metric(angle, 32.1), 160.0, 0.05));
        }
    }

    #[test]
    fn distance_threshold_scales_with_frame_width() {
        let wide = PostureMetric {
            angle_degrees: 175.0,
            horizontal_offset_px: 50.0,
            frame_width_px: 1280,
        };
        assert!(!evaluate(&wide, 160.0, 0.05));
        assert_eq!(PostureThresholds::default().distance_threshold_px(1280), 64.0);
    }

    #[test]
    fn metric_from_seated_pose_matches_angle() {
        for angle in [120.0f32, 150.0, 170.0] {
            let pose = PoseLandmarks::seated(angle, 640, 480);
            let metric = PostureMetric::from_landmarks(&pose, 640, 480).expect("metric");
            assert!(
                (metric.angle_degrees - angle).abs() < 0.01,
                "expected {} got {}",
                angle,
                metric.angle_degrees
            );
            assert_eq!(metric.frame_width_px, 640);
        }
    }

    #[test]
    fn metric_offset_is_horizontal_ear_shoulder_distance() {
        let pose = PoseLandmarks::new((0.45, 0.3), (0.5, 0.5), (0.5, 0.8));
        let metric = PostureMetric::from_landmarks(&pose, 640, 480).expect("metric");
        assert!((metric.horizontal_offset_px - 32.0).abs() < 1e-3);
    }

    #[test]
    fn coincident_landmarks_yield_no_metric() {
        let pose = PoseLandmarks::new((0.5, 0.5), (0.5, 0.5), (0.5, 0.8));
        assert!(PostureMetric::from_landmarks(&pose, 640, 480).is_none());
    }
}
