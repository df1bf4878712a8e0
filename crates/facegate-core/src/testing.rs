//! Scripted collaborators for driving the loops in unit tests.

use crate::capture::{CaptureError, Frame, FrameSource};
use crate::descriptor::Descriptor;
use crate::detector::{DetectorError, FaceDetector};
use crate::gallery::{Gallery, StorageError};
use crate::types::{BoundingBox, Identity};
use image::{DynamicImage, GrayImage, Luma};
use std::cell::Cell;
use std::collections::VecDeque;

/// 64×64 grayscale face with a deterministic gradient.
pub fn face_image() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
        Luma([((x * 3 + y * 2) % 256) as u8])
    }))
}

pub fn face_frame() -> Frame {
    Frame::new(face_image(), 0)
}

pub fn full_frame_box() -> BoundingBox {
    BoundingBox { x: 0.0, y: 0.0, width: 64.0, height: 64.0, confidence: 0.95 }
}

/// Copy of `descriptor` with one component shifted by `delta`, which puts it
/// exactly `|delta|` away.
pub fn shifted(descriptor: &Descriptor, index: usize, delta: f32) -> Descriptor {
    let mut values = descriptor.values().to_vec();
    values[index] += delta;
    Descriptor::from_values(values)
}

/// Frame source replaying a fixed script, then repeating its fallback.
pub struct ScriptedSource {
    script: VecDeque<Result<Frame, CaptureError>>,
    fallback: fn() -> Result<Frame, CaptureError>,
    pub acquired: usize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Frame, CaptureError>>) -> Self {
        Self {
            script: script.into(),
            fallback: || Ok(face_frame()),
            acquired: 0,
        }
    }

    pub fn faces() -> Self {
        Self::new(Vec::new())
    }
}

impl FrameSource for ScriptedSource {
    fn acquire_frame(&mut self) -> Result<Frame, CaptureError> {
        self.acquired += 1;
        self.script.pop_front().unwrap_or_else(self.fallback)
    }
}

/// Detector replaying a fixed script of results, then repeating the last one.
pub struct ScriptedDetector {
    script: VecDeque<Result<Option<BoundingBox>, String>>,
    last: Option<BoundingBox>,
}

impl ScriptedDetector {
    pub fn always(face: Option<BoundingBox>) -> Self {
        Self {
            script: VecDeque::new(),
            last: face,
        }
    }

    pub fn script(script: Vec<Result<Option<BoundingBox>, String>>) -> Self {
        Self {
            script: script.into(),
            last: None,
        }
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect_face(&mut self, _frame: &Frame) -> Result<Option<BoundingBox>, DetectorError> {
        match self.script.pop_front() {
            Some(Ok(face)) => {
                self.last = face.clone();
                Ok(face)
            }
            Some(Err(msg)) => Err(DetectorError::InferenceFailed(msg)),
            None => Ok(self.last.clone()),
        }
    }
}

/// In-memory gallery with failure injection.
#[derive(Default)]
pub struct MemoryGallery {
    pub identities: Vec<Identity>,
    pub events: Vec<(String, String)>,
    pub alerts: Vec<String>,
    pub fail_reads: bool,
    pub fail_writes: bool,
    pub reads: Cell<usize>,
}

impl MemoryGallery {
    pub fn with(identities: Vec<(&str, Descriptor)>) -> Self {
        let identities = identities
            .into_iter()
            .enumerate()
            .map(|(i, (name, descriptor))| Identity {
                id: i as i64 + 1,
                name: name.to_string(),
                descriptor,
            })
            .collect();
        Self {
            identities,
            ..Self::default()
        }
    }
}

impl Gallery for MemoryGallery {
    fn add_identity(&mut self, name: &str, descriptor: &Descriptor) -> Result<i64, StorageError> {
        if self.fail_writes {
            return Err(StorageError::Write("disk full".into()));
        }
        let id = self.identities.len() as i64 + 1;
        self.identities.push(Identity {
            id,
            name: name.to_string(),
            descriptor: descriptor.clone(),
        });
        Ok(id)
    }

    fn all_identities(&self) -> Result<Vec<Identity>, StorageError> {
        self.reads.set(self.reads.get() + 1);
        if self.fail_reads {
            return Err(StorageError::Read("database is locked".into()));
        }
        Ok(self.identities.clone())
    }

    fn log_event(&mut self, name: &str, description: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Write("disk full".into()));
        }
        self.events.push((name.to_string(), description.to_string()));
        Ok(())
    }

    fn add_alert(&mut self, message: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Write("disk full".into()));
        }
        self.alerts.push(message.to_string());
        Ok(())
    }
}
