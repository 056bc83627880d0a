//! Posture Guard
//!
//! Watches a seated user through a webcam and raises an alert once bad
//! posture has lasted longer than a grace period.
//!
//! # Pipeline
//!
//! Every frame runs through the same chain on one thread:
//!
//! 1. **Camera**: paced polling; a frame is opaque (`RawFrame`) and is only
//!    ever shown to the pose estimator through an `InferenceView`.
//! 2. **Pose estimation**: ear, shoulder and hip of one side of the body.
//! 3. **Evaluation**: shoulder angle and ear/shoulder offset against the
//!    current thresholds.
//! 4. **Debounce**: one timer per session; bad posture must persist for the
//!    timeout before it counts.
//! 5. **Dispatch**: the active alert channel (GUI indicator, sound or an
//!    external indicator device) shows the result; the others stay neutral.
//!
//! # Module Structure
//!
//! - `frame`: frame isolation (RawFrame, InferenceView)
//! - `ingest`: webcam sources (`stub://`, V4L2)
//! - `pose`: pose estimator trait, backends and registry
//! - `posture`: posture metric and evaluation
//! - `debounce`: bad-posture debouncer
//! - `alert`: alert channels and dispatcher
//! - `settings`: persisted user settings and the shared snapshot handle
//! - `control`: runtime settings commands
//! - `session`: the detection loop
//! - `config`: static process configuration

pub mod alert;
pub mod config;
pub mod control;
pub mod debounce;
pub mod frame;
pub mod ingest;
pub mod pose;
pub mod posture;
pub mod session;
pub mod settings;
pub mod ui;

pub use alert::{AlertChannel, AlertDispatcher, AlertMethod};
pub use config::SentinelConfig;
pub use debounce::{AlertDebouncer, AlertPhase};
pub use frame::{InferenceView, RawFrame};
pub use ingest::{Camera, CameraConfig, CameraStats};
pub use pose::{EstimatorRegistry, PoseEstimator, PoseLandmarks};
pub use posture::{evaluate, PostureMetric, PostureThresholds};
pub use session::{FrameOutcome, PostureSession, SessionStats};
pub use settings::{PostureSettings, SettingsHandle};
