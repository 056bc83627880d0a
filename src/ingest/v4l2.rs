//! V4L2 webcam capture (`ingest-v4l2` feature).
//!
//! Frames are captured into memory-mapped buffers, copied out and normalized
//! to RGB24 before they become a `RawFrame`. Nothing is written to disk.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::camera::CameraConfig;
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::RawFrame;

const BUFFER_COUNT: u32 = 4;

pub(crate) struct V4l2Capture {
    device_path: String,
    state: Option<V4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Capture {
    pub(crate) fn open(config: &CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open v4l2 device {}", config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"YUYV");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("camera: failed to set format on {}: {}", config.device, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} delivers unsupported format {} (need YUYV or RGB3)",
                config.device,
                format.fourcc
            )
        })?;

        let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!("camera: failed to set fps on {}: {}", config.device, err);
        }

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "camera: opened {} ({}x{} {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            device_path: config.device.clone(),
            state: Some(state),
            format: pixel_format,
            width: format.width,
            height: format.height,
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub(crate) fn read_frame(&mut self, sequence: u64) -> Result<RawFrame> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("camera {} is released", self.device_path))?;
        let rgb = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, self.width, self.height, self.format)
        })?;
        Ok(RawFrame::new(rgb, self.width, self.height, sequence))
    }

    pub(crate) fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("camera: released {}", self.device_path);
        }
    }
}
