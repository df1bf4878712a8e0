//! facegate-hw — V4L2 camera capture feeding the access-control loops.

pub mod camera;
pub mod pixels;

pub use camera::{Camera, CameraError, DeviceInfo};
pub use pixels::PixelFormat;
