//! One-shot enrollment of a new identity.

use crate::capture::{Frame, FrameSource};
use crate::decision::LoopTiming;
use crate::descriptor::{Descriptor, DescriptorExtractor};
use crate::detector::FaceDetector;
use crate::gallery::{Gallery, StorageError};
use crate::imaging;
use crate::types::BoundingBox;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("identity name must not be empty")]
    EmptyName,
    #[error("failed to store identity: {0}")]
    Storage(#[from] StorageError),
}

/// Operator command during enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    Capture,
    Cancel,
}

/// Non-blocking source of operator commands.
pub trait OperatorInput {
    /// Return the next pending command, if any.
    fn poll(&mut self) -> Option<OperatorSignal>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled { id: i64, descriptor: Descriptor },
    Cancelled,
}

/// Enrollment flow over a camera and detector.
pub struct Enrollment<S, D> {
    source: S,
    detector: D,
    extractor: DescriptorExtractor,
    timing: LoopTiming,
}

impl<S, D> Enrollment<S, D>
where
    S: FrameSource,
    D: FaceDetector,
{
    pub fn new(source: S, detector: D, timing: LoopTiming) -> Self {
        Self {
            source,
            detector,
            extractor: DescriptorExtractor::default(),
            timing,
        }
    }

    /// Watch frames until the operator captures a visible face or cancels.
    ///
    /// The gallery is only touched by a successful capture.
    pub fn run<G, O>(&mut self, name: &str, gallery: &mut G, operator: &mut O) -> Result<EnrollOutcome, EnrollError>
    where
        G: Gallery,
        O: OperatorInput,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(EnrollError::EmptyName);
        }

        let mut face_visible = false;
        loop {
            let current = self.next_face();
            if current.is_some() != face_visible {
                face_visible = current.is_some();
                tracing::info!(face_visible, "face tracking changed");
            }

            match operator.poll() {
                Some(OperatorSignal::Cancel) => {
                    tracing::info!(name, "enrollment cancelled");
                    return Ok(EnrollOutcome::Cancelled);
                }
                Some(OperatorSignal::Capture) => match current {
                    Some((frame, region)) => match imaging::crop_face(&frame.image, &region) {
                        Ok(face) => {
                            let descriptor = self.extractor.extract(&face);
                            let id = gallery.add_identity(name, &descriptor)?;
                            tracing::info!(id, name, confidence = region.confidence, "identity enrolled");
                            return Ok(EnrollOutcome::Enrolled { id, descriptor });
                        }
                        Err(e) => tracing::warn!(error = %e, "capture rejected; try again"),
                    },
                    None => tracing::warn!("no face detected; try again"),
                },
                None => {}
            }
        }
    }

    /// Acquire one frame and locate a face in it.
    fn next_face(&mut self) -> Option<(Frame, BoundingBox)> {
        let frame = match self.source.acquire_frame() {
            Ok(frame) if frame.is_usable() => frame,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "frame read failed");
                std::thread::sleep(self.timing.frame_retry);
                return None;
            }
        };

        match self.detector.detect_face(&frame) {
            Ok(Some(region)) => Some((frame, region)),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed");
                None
            }
        }
    }
}
