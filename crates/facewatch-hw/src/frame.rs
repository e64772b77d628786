//! Captured frames and raw pixel-format conversion to 8-bit luma.

use image::GrayImage;

/// Pixel formats the camera layer can turn into luma.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, Y every other byte.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grey => 1,
            PixelFormat::Yuyv | PixelFormat::Y16 => 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{format:?} buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// A grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Luma bytes, row-major, `width * height` long.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn into_image(self) -> Option<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data)
    }
}

/// Convert a raw driver buffer into `width * height` luma bytes.
pub fn to_luma(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * format.bytes_per_pixel();
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            format,
            expected,
            actual: buf.len(),
        });
    }
    let buf = &buf[..expected];

    Ok(match format {
        PixelFormat::Grey => buf.to_vec(),
        PixelFormat::Yuyv => buf.iter().step_by(2).copied().collect(),
        // Keep the high byte of each little-endian sample.
        PixelFormat::Y16 => buf.chunks_exact(2).map(|px| px[1]).collect(),
    })
}
