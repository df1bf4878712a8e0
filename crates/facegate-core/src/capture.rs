//! Frame type and the frame-source capability.

use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame read failed: {0}")]
    ReadFailed(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// A captured camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub sequence: u32,
    /// Set by the source when the frame is too dark to contain a usable face.
    pub is_dark: bool,
}

impl Frame {
    pub fn new(image: DynamicImage, sequence: u32) -> Self {
        Self {
            image,
            sequence,
            is_dark: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// False for empty or dark frames, which are skipped without detection.
    pub fn is_usable(&self) -> bool {
        !self.is_empty() && !self.is_dark
    }
}

/// Source of camera frames.
///
/// `acquire_frame` blocks until the next frame is available.
pub trait FrameSource {
    fn acquire_frame(&mut self) -> Result<Frame, CaptureError>;
}
