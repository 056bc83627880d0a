use anyhow::{anyhow, Result};

/// Capture formats the camera layer can turn into RGB24.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    /// Packed 4:2:2, `Y0 U Y1 V` per pixel pair. The usual webcam default.
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }

    fn frame_len(self, width: u32, height: u32) -> Result<usize> {
        let bytes_per_pixel = match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Yuyv => 2,
        };
        width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(bytes_per_pixel))
            .map(|v| v as usize)
            .ok_or_else(|| anyhow!("{:?} frame dimensions overflow", self))
    }
}

pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let expected = format.frame_len(width, height)?;
    // Drivers may pad the last buffer; anything shorter is a torn frame.
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} frame length mismatch: expected {}, got {}",
            format,
            expected,
            pixels.len()
        ));
    }
    let pixels = &pixels[..expected];
    match format {
        PixelFormat::Rgb24 => Ok(pixels.to_vec()),
        PixelFormat::Yuyv => {
            if width % 2 != 0 {
                return Err(anyhow!("YUYV frames need an even width, got {}", width));
            }
            Ok(yuyv_to_rgb(pixels))
        }
    }
}

fn yuyv_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for chunk in pixels.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
