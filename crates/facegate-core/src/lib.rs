//! facegate-core — face descriptor extraction, gallery matching and the
//! access-control loops built on them.
//!
//! The camera, face detector and gallery store are capabilities
//! ([`FrameSource`], [`FaceDetector`], [`Gallery`]) so the loops can be
//! driven with synthetic frames in tests.

pub mod capture;
pub mod config;
pub mod decision;
pub mod descriptor;
pub mod detector;
pub mod enroll;
pub mod gallery;
pub mod imaging;
pub mod matcher;
pub mod types;

#[cfg(test)]
mod testing;

pub use capture::{CaptureError, Frame, FrameSource};
pub use config::Config;
pub use decision::{AccessPolicy, DecisionLoop, LoopTiming, Outcome};
pub use descriptor::{Descriptor, DescriptorExtractor};
pub use detector::{FaceDetector, ScrfdDetector};
pub use enroll::{EnrollOutcome, Enrollment, OperatorInput, OperatorSignal};
pub use gallery::{Gallery, StorageError};
pub use matcher::{EuclideanMatcher, Matcher};
pub use types::{BoundingBox, Decision, Identity, MatchResult};
