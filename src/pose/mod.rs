mod backend;
mod backends;
mod landmark;
mod registry;

pub use backend::PoseEstimator;
pub use backends::ScriptedEstimator;
pub use landmark::{BodySide, Landmark, LandmarkRole, PoseLandmarks};
pub use registry::{EstimatorFactory, EstimatorRegistry};

#[cfg(feature = "backend-tract")]
pub use backends::TractPoseEstimator;
