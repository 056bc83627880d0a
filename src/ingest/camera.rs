//! Paced webcam polling.
//!
//! `Camera::get_frame` is called in a tight loop. When called sooner than one
//! frame interval after the last delivered frame it sleeps out the remainder
//! and returns `None`; the next call then reads a frame. Read failures are
//! also reported as `None` so the caller simply polls again.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::config::CameraSettings;
use crate::frame::RawFrame;

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::V4l2Capture;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// `stub://name` for synthetic frames, otherwise a device path such as
    /// `/dev/video0`.
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

impl From<&CameraSettings> for CameraConfig {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub read_failures: u64,
    pub device: String,
}

pub struct Camera {
    config: CameraConfig,
    backend: CameraBackend,
    frame_interval: Duration,
    last_frame_at: Instant,
    frames_captured: u64,
    read_failures: u64,
}

enum CameraBackend {
    Synthetic { open: bool },
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Capture),
}

impl Camera {
    /// Open the camera. Failure to open a device is an error; a `stub://`
    /// camera always opens.
    pub fn open(config: CameraConfig) -> Result<Self> {
        if config.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        let backend = if config.device.starts_with("stub://") {
            log::info!("camera: opened {} (synthetic)", config.device);
            CameraBackend::Synthetic { open: true }
        } else {
            Self::open_device(&config)?
        };
        Ok(Self {
            frame_interval: Duration::from_secs_f64(1.0 / config.target_fps as f64),
            last_frame_at: Instant::now(),
            config,
            backend,
            frames_captured: 0,
            read_failures: 0,
        })
    }

    #[cfg(feature = "ingest-v4l2")]
    fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
        Ok(CameraBackend::Device(V4l2Capture::open(config)?))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn open_device(config: &CameraConfig) -> Result<CameraBackend> {
        Err(anyhow!(
            "camera {} requires the ingest-v4l2 feature (use stub://<name> for synthetic frames)",
            config.device
        ))
    }

    pub fn is_opened(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic { open } => *open,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(capture) => capture.is_open(),
        }
    }

    /// Next frame, or `None` for a pacing skip or a failed read.
    pub fn get_frame(&mut self) -> Option<RawFrame> {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_frame_at);
        if elapsed < self.frame_interval {
            std::thread::sleep(self.frame_interval - elapsed);
            return None;
        }
        self.last_frame_at = now;

        match self.read_frame() {
            Ok(frame) => {
                self.frames_captured += 1;
                Some(frame)
            }
            Err(err) => {
                self.read_failures += 1;
                log::debug!("camera: frame read failed: {:#}", err);
                None
            }
        }
    }

    fn read_frame(&mut self) -> Result<RawFrame> {
        let sequence = self.frames_captured + 1;
        match &mut self.backend {
            CameraBackend::Synthetic { open: true } => Ok(RawFrame::synthetic(
                self.config.width,
                self.config.height,
                sequence,
            )),
            CameraBackend::Synthetic { open: false } => {
                Err(anyhow!("camera {} is released", self.config.device))
            }
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(capture) => capture.read_frame(sequence),
        }
    }

    /// Release the device. Safe to call more than once.
    pub fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic { open } => {
                if *open {
                    log::info!("camera: released {}", self.config.device);
                }
                *open = false;
            }
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(capture) => capture.release(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frames_captured,
            read_failures: self.read_failures,
            device: self.config.device.clone(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.release();
    }
}
