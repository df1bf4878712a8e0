//! Raw V4L2 buffer decoding into 8-bit luma images.

use image::GrayImage;

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRACTION: f32 = 0.95;

/// Pixels below this level count as near-black.
const DARK_LEVEL: u8 = 32;

#[derive(Debug, thiserror::Error)]
pub enum PixelError {
    #[error("{format} buffer too short for {width}x{height}: expected {expected} bytes, got {actual}")]
    ShortBuffer {
        format: &'static str,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Pixel layouts the camera may negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed YUYV 4:2:2; luma is every even byte.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale, reduced to its high byte.
    Y16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Grey => 1,
            PixelFormat::Yuyv | PixelFormat::Y16 => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            PixelFormat::Yuyv => "YUYV",
            PixelFormat::Grey => "GREY",
            PixelFormat::Y16 => "Y16",
        }
    }

    /// Decode one raw buffer. Bytes past the expected frame size are ignored.
    pub fn to_luma(self, buf: &[u8], width: u32, height: u32) -> Result<GrayImage, PixelError> {
        let pixels = width as usize * height as usize;
        let expected = pixels * self.bytes_per_pixel();
        let short = |actual: usize| PixelError::ShortBuffer {
            format: self.label(),
            width,
            height,
            expected,
            actual,
        };
        if buf.len() < expected {
            return Err(short(buf.len()));
        }

        let luma: Vec<u8> = match self {
            PixelFormat::Grey => buf[..expected].to_vec(),
            PixelFormat::Yuyv => buf[..expected].iter().step_by(2).copied().collect(),
            PixelFormat::Y16 => buf[..expected].chunks_exact(2).map(|px| px[1]).collect(),
        };
        let decoded = luma.len();
        GrayImage::from_raw(width, height, luma).ok_or_else(|| short(decoded))
    }
}

/// True when more than `fraction` of the pixels are near-black.
/// An image with no pixels is dark.
pub fn is_dark(image: &GrayImage, fraction: f32) -> bool {
    let raw = image.as_raw();
    if raw.is_empty() {
        return true;
    }
    let dark = raw.iter().filter(|&&p| p < DARK_LEVEL).count();
    (dark as f32 / raw.len() as f32) > fraction
}
