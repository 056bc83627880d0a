use serde::{Deserialize, Serialize};

/// Body joint a landmark belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LandmarkRole {
    Ear,
    Shoulder,
    Hip,
}

/// A body keypoint in normalized frame coordinates (0..1, origin top-left).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Landmark {
    pub role: LandmarkRole,
    pub x: f32,
    pub y: f32,
}

impl Landmark {
    pub fn new(role: LandmarkRole, x: f32, y: f32) -> Self {
        Self { role, x, y }
    }

    /// Scale to pixel coordinates.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Which side of the body the estimator reads landmarks from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySide {
    #[default]
    Left,
    Right,
}

/// Ear, shoulder and hip of one side of the body, as returned per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseLandmarks {
    pub ear: Landmark,
    pub shoulder: Landmark,
    pub hip: Landmark,
}

impl PoseLandmarks {
    pub fn new(ear: (f32, f32), shoulder: (f32, f32), hip: (f32, f32)) -> Self {
        Self {
            ear: Landmark::new(LandmarkRole::Ear, ear.0, ear.1),
            shoulder: Landmark::new(LandmarkRole::Shoulder, shoulder.0, shoulder.1),
            hip: Landmark::new(LandmarkRole::Hip, hip.0, hip.1),
        }
    }

    /// Synthetic seated pose whose ear-shoulder-hip angle, measured in pixels
    /// of a `width` x `height` frame, is `angle_degrees`.
    ///
    /// The hip sits straight below the shoulder; the ear leans forward as the
    /// angle closes.
    pub fn seated(angle_degrees: f32, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let shoulder = (0.5 * w, 0.55 * h);
        let hip = (shoulder.0, shoulder.1 + 0.3 * h);
        let neck = 0.2 * h;
        let theta = angle_degrees.to_radians();
        let ear = (
            shoulder.0 + neck * theta.sin(),
            shoulder.1 + neck * theta.cos(),
        );
        Self::new(
            (ear.0 / w, ear.1 / h),
            (shoulder.0 / w, shoulder.1 / h),
            (hip.0 / w, hip.1 / h),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        [&self.ear, &self.shoulder, &self.hip].into_iter()
    }
}
