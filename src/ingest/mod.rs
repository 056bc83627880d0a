//! Webcam frame acquisition.
//!
//! - `stub://<name>`: synthetic frames, always available
//! - V4L2 devices such as `/dev/video0` (feature: ingest-v4l2)
//!
//! Frames are normalized to RGB24 and handed to the detection loop as
//! `RawFrame`s. The ingestion layer never stores or forwards pixels.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{Camera, CameraConfig, CameraStats};
