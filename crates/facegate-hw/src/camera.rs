//! V4L2 camera capture via the `v4l` crate.

use crate::pixels::{self, PixelError, PixelFormat};
use facegate_core::capture::{CaptureError, Frame, FrameSource};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Requested capture size; the driver may negotiate another.
const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;

const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("{0} does not support video capture")]
    NotACaptureDevice(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error(transparent)]
    Pixels(#[from] PixelError),
}

impl From<CameraError> for CaptureError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::DeviceNotFound(_) | CameraError::DeviceBusy(_) | CameraError::NotACaptureDevice(_) => {
                CaptureError::Unavailable(e.to_string())
            }
            _ => CaptureError::ReadFailed(e.to_string()),
        }
    }
}

/// A discovered V4L2 capture device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Open V4L2 capture device. The device is closed on drop.
///
/// One mmap stream is started on the first capture and kept for the life of
/// the camera, so exposure settled during warm-up carries over to later reads.
pub struct Camera {
    stream: Option<MmapStream<'static>>,
    device: Device,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a camera by path (e.g. "/dev/video0") and negotiate a format.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("busy") || msg.contains("EBUSY") {
                CameraError::DeviceBusy(device_path.to_string())
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {msg}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotACaptureDevice(device_path.to_string()));
        }
        tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "opened camera");

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;
        let pixel_format = pixel_format_of(negotiated.fourcc)?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        Ok(Self {
            stream: None,
            device,
            device_path: device_path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
        })
    }

    /// The running capture stream, started on first use.
    fn stream(&mut self) -> Result<&mut MmapStream<'static>, CameraError> {
        if self.stream.is_none() {
            let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;
            tracing::debug!(device = %self.device_path, buffers = STREAM_BUFFERS, "capture stream started");
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| CameraError::CaptureFailed("capture stream not started".into()))
    }

    /// Capture one frame as a luma image, flagging it when dark.
    ///
    /// A failed dequeue drops the stream; the next capture starts a new one.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let (pixel_format, width, height) = (self.pixel_format, self.width, self.height);
        let dequeued = self
            .stream()?
            .next()
            .map(|(buf, meta)| (pixel_format.to_luma(buf, width, height), meta.sequence));

        let (luma, sequence) = match dequeued {
            Ok(frame) => frame,
            Err(e) => {
                self.stream = None;
                return Err(CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")));
            }
        };
        let luma = luma?;
        let is_dark = pixels::is_dark(&luma, pixels::DARK_FRACTION);

        let mut frame = Frame::new(DynamicImage::ImageLuma8(luma), sequence);
        frame.is_dark = is_dark;
        Ok(frame)
    }

    /// Read and discard `count` frames from the capture stream while
    /// exposure settles. Returns how many of them were dark.
    pub fn warm_up(&mut self, count: usize) -> Result<usize, CameraError> {
        let dark = discard_frames(count, || -> Result<bool, CameraError> {
            let frame = self.capture_frame()?;
            tracing::trace!(seq = frame.sequence, dark = frame.is_dark, "warm-up frame");
            Ok(frame.is_dark)
        })?;
        tracing::debug!(frames = count, dark, "camera warmed up");
        Ok(dark)
    }

    /// List V4L2 devices that support video capture.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

/// Pull `count` frames through `next`, stopping at the first failure.
/// `next` reports whether each frame was dark; the dark ones are counted.
fn discard_frames<E>(count: usize, mut next: impl FnMut() -> Result<bool, E>) -> Result<usize, E> {
    let mut dark = 0;
    for _ in 0..count {
        if next()? {
            dark += 1;
        }
    }
    Ok(dark)
}

impl FrameSource for Camera {
    fn acquire_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(self.capture_frame()?)
    }
}

fn pixel_format_of(fourcc: FourCC) -> Result<PixelFormat, CameraError> {
    if fourcc == FourCC::new(b"YUYV") {
        Ok(PixelFormat::Yuyv)
    } else if fourcc == FourCC::new(b"GREY") {
        Ok(PixelFormat::Grey)
    } else if fourcc == FourCC::new(b"Y16 ") || fourcc == FourCC::new(b"Y16\0") {
        Ok(PixelFormat::Y16)
    } else {
        Err(CameraError::FormatNegotiationFailed(format!(
            "unsupported pixel format: {fourcc:?} (need YUYV, GREY, or Y16)"
        )))
    }
}
