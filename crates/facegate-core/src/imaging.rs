//! Grayscale conversion, resampling and face cropping.

use crate::types::BoundingBox;
use image::{DynamicImage, GrayImage, Luma};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CropError {
    #[error("face region {width}x{height} at ({x}, {y}) has no area inside the {frame_width}x{frame_height} frame")]
    EmptyRegion {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Resize a row-major 8-bit grayscale buffer with bilinear interpolation.
///
/// Sample centers are aligned (half-pixel offset) and edge samples are
/// replicated, so a uniform input stays uniform. An empty source yields an
/// empty output.
pub fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Vec<u8> {
    if width == 0 || height == 0 || src.len() < width * height {
        return Vec::new();
    }

    let scale_x = width as f32 / new_width as f32;
    let scale_y = height as f32 / new_height as f32;
    let mut resized = vec![0u8; new_width * new_height];

    for y in 0..new_height {
        let src_y = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (height - 1) as f32);
        let y0 = src_y.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = src_y - y0 as f32;

        for x in 0..new_width {
            let src_x = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (width - 1) as f32);
            let x0 = src_x.floor() as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = src_x - x0 as f32;

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_width + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}

/// Crop a detected face out of a frame.
///
/// The box is clamped to the frame; a region with no pixels left after
/// clamping is rejected.
pub fn crop_face(image: &DynamicImage, region: &BoundingBox) -> Result<DynamicImage, CropError> {
    let (frame_width, frame_height) = (image.width(), image.height());

    let x0 = region.x.max(0.0).floor();
    let y0 = region.y.max(0.0).floor();
    let x1 = (region.x + region.width).min(frame_width as f32).ceil();
    let y1 = (region.y + region.height).min(frame_height as f32).ceil();

    if !(x1 > x0 && y1 > y0) {
        return Err(CropError::EmptyRegion {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            frame_width,
            frame_height,
        });
    }

    let (x, y) = (x0 as u32, y0 as u32);
    let w = (x1 as u32).min(frame_width) - x;
    let h = (y1 as u32).min(frame_height) - y;
    Ok(image.crop_imm(x, y, w, h))
}

/// Rec.601 luma weights in 14-bit fixed point; they sum to `1 << 14`.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Collapse an image to 8-bit luminance with Rec.601 weights
/// (Y = 0.299 R + 0.587 G + 0.114 B, rounded).
///
/// 8-bit grayscale input is returned unchanged. Alpha is ignored.
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }
    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (LUMA_R * r as u32 + LUMA_G * g as u32 + LUMA_B * b as u32 + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT;
        Luma([luma as u8])
    })
}
