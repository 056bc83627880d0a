pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use scripted::ScriptedEstimator;

#[cfg(feature = "backend-tract")]
pub use tract::TractPoseEstimator;
