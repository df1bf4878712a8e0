//! Access decision loop.
//!
//! One iteration walks a captured frame through the named states
//! `Idle -> FrameAcquired -> FaceDetected -> Matched -> Decided`. Any state
//! can halt the iteration early with an [`Outcome`] that tells the runner how
//! long to back off. [`DecisionLoop::run_iteration`] never sleeps, so tests
//! drive it directly with scripted collaborators.

use crate::capture::{Frame, FrameSource};
use crate::descriptor::DescriptorExtractor;
use crate::detector::FaceDetector;
use crate::gallery::Gallery;
use crate::imaging;
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{Decision, MatchResult, UNKNOWN_NAME};
use image::DynamicImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Threshold rule for granting access.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccessPolicy {
    /// Maximum distance to the closest identity. Smaller is stricter.
    pub threshold: f32,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self { threshold: 0.6 }
    }
}

/// Delays inserted between iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiming {
    pub frame_retry: Duration,
    pub decision_interval: Duration,
    pub store_retry: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            frame_retry: Duration::from_millis(200),
            decision_interval: Duration::from_millis(700),
            store_retry: Duration::from_secs(1),
        }
    }
}

/// Position of one frame within an iteration.
pub enum LoopState {
    Idle,
    FrameAcquired(Frame),
    /// Holds the cropped face region.
    FaceDetected(DynamicImage),
    Matched(MatchResult),
    Decided(Decision),
}

impl LoopState {
    pub fn name(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::FrameAcquired(_) => "frame_acquired",
            LoopState::FaceDetected(_) => "face_detected",
            LoopState::Matched(_) => "matched",
            LoopState::Decided(_) => "decided",
        }
    }
}

/// How an iteration ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The camera failed to deliver a frame.
    FrameUnavailable,
    /// The frame was empty or too dark to use.
    EmptyFrame,
    /// No face was found; the gallery was not consulted.
    NoFace,
    /// The gallery snapshot could not be read.
    StoreUnavailable,
    Decided(Decision),
}

impl Outcome {
    /// Delay before the next iteration.
    pub fn pause(&self, timing: &LoopTiming) -> Duration {
        match self {
            Outcome::FrameUnavailable | Outcome::NoFace => timing.frame_retry,
            Outcome::EmptyFrame => Duration::ZERO,
            Outcome::StoreUnavailable => timing.store_retry,
            Outcome::Decided(_) => timing.decision_interval,
        }
    }
}

/// Result of advancing the state machine by one transition.
pub enum Step {
    Continue(LoopState),
    Halt(Outcome),
}

/// The access-control loop. Owns its camera, detector and gallery; they are
/// released when the loop is dropped.
pub struct DecisionLoop<S, D, G> {
    source: S,
    detector: D,
    gallery: G,
    extractor: DescriptorExtractor,
    matcher: EuclideanMatcher,
    policy: AccessPolicy,
    timing: LoopTiming,
}

impl<S, D, G> DecisionLoop<S, D, G>
where
    S: FrameSource,
    D: FaceDetector,
    G: Gallery,
{
    pub fn new(source: S, detector: D, gallery: G, policy: AccessPolicy, timing: LoopTiming) -> Self {
        Self {
            source,
            detector,
            gallery,
            extractor: DescriptorExtractor::default(),
            matcher: EuclideanMatcher,
            policy,
            timing,
        }
    }

    pub fn gallery(&self) -> &G {
        &self.gallery
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run until `stop` is set. The flag is checked before each iteration.
    pub fn run(&mut self, stop: &AtomicBool) {
        tracing::info!(
            threshold = self.policy.threshold,
            decision_interval_ms = self.timing.decision_interval.as_millis() as u64,
            "decision loop started"
        );

        while !stop.load(Ordering::Relaxed) {
            let outcome = self.run_iteration();
            let pause = outcome.pause(&self.timing);
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }

        tracing::info!("decision loop stopped");
    }

    /// Drive one frame from `Idle` to a halt or a decision.
    pub fn run_iteration(&mut self) -> Outcome {
        let mut state = LoopState::Idle;
        loop {
            match self.advance(state) {
                Step::Continue(LoopState::Decided(decision)) => return Outcome::Decided(decision),
                Step::Continue(next) => state = next,
                Step::Halt(outcome) => {
                    tracing::trace!(?outcome, "iteration halted");
                    return outcome;
                }
            }
        }
    }

    /// Perform the single transition out of `state`.
    pub fn advance(&mut self, state: LoopState) -> Step {
        match state {
            LoopState::Idle => self.acquire(),
            LoopState::FrameAcquired(frame) => self.detect(&frame),
            LoopState::FaceDetected(face) => self.match_face(&face),
            LoopState::Matched(result) => Step::Continue(LoopState::Decided(self.decide(result))),
            LoopState::Decided(decision) => Step::Halt(Outcome::Decided(decision)),
        }
    }

    fn acquire(&mut self) -> Step {
        match self.source.acquire_frame() {
            Ok(frame) if frame.is_usable() => Step::Continue(LoopState::FrameAcquired(frame)),
            Ok(frame) => {
                tracing::debug!(seq = frame.sequence, dark = frame.is_dark, "skipping unusable frame");
                Step::Halt(Outcome::EmptyFrame)
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame read failed");
                Step::Halt(Outcome::FrameUnavailable)
            }
        }
    }

    fn detect(&mut self, frame: &Frame) -> Step {
        let region = match self.detector.detect_face(frame) {
            Ok(Some(region)) => region,
            Ok(None) => return Step::Halt(Outcome::NoFace),
            Err(e) => {
                tracing::warn!(error = %e, seq = frame.sequence, "face detection failed");
                return Step::Halt(Outcome::NoFace);
            }
        };

        match imaging::crop_face(&frame.image, &region) {
            Ok(face) => {
                tracing::debug!(seq = frame.sequence, confidence = region.confidence, "face detected");
                Step::Continue(LoopState::FaceDetected(face))
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding detection");
                Step::Halt(Outcome::NoFace)
            }
        }
    }

    fn match_face(&mut self, face: &DynamicImage) -> Step {
        let query = self.extractor.extract(face);
        let gallery = match self.gallery.all_identities() {
            Ok(gallery) => gallery,
            Err(e) => {
                tracing::error!(error = %e, "gallery read failed; backing off");
                return Step::Halt(Outcome::StoreUnavailable);
            }
        };

        let result = self.matcher.find_best_match(&query, &gallery);
        tracing::debug!(
            gallery = gallery.len(),
            best = %result.best_name,
            distance = result.best_distance,
            "matched"
        );
        Step::Continue(LoopState::Matched(result))
    }

    /// Apply the threshold rule and record the audit trail.
    fn decide(&mut self, result: MatchResult) -> Decision {
        let distance = result.best_distance;

        if result.within(self.policy.threshold) {
            tracing::info!(name = %result.best_name, distance, "access granted");
            self.record_event(&result.best_name, &format!("access_granted (d={distance:.4})"));
            // TODO: pulse the door relay here once the GPIO backend exists.
            return Decision::Granted {
                name: result.best_name,
                distance,
            };
        }

        let nearest = result.found.then_some(result.best_name);
        tracing::warn!(nearest = ?nearest, distance, "access denied");
        self.record_event(UNKNOWN_NAME, &format!("access_denied (d={distance:.4})"));
        if let Err(e) = self.gallery.add_alert(&format!("unknown face (d={distance:.4})")) {
            tracing::warn!(error = %e, "failed to record alert");
        }

        Decision::Denied { distance, nearest }
    }

    fn record_event(&mut self, name: &str, description: &str) {
        if let Err(e) = self.gallery.log_event(name, description) {
            tracing::warn!(error = %e, name, description, "failed to record access event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::descriptor;
    use crate::testing::*;
    use crate::types::NO_MATCH_DISTANCE;
    use image::GrayImage;
    use std::sync::Arc;

    fn instant_timing() -> LoopTiming {
        LoopTiming {
            frame_retry: Duration::ZERO,
            decision_interval: Duration::ZERO,
            store_retry: Duration::ZERO,
        }
    }

    fn make_loop(
        source: ScriptedSource,
        detector: ScriptedDetector,
        gallery: MemoryGallery,
    ) -> DecisionLoop<ScriptedSource, ScriptedDetector, MemoryGallery> {
        DecisionLoop::new(source, detector, gallery, AccessPolicy::default(), LoopTiming::default())
    }

    fn alice_at(distance: f32) -> MemoryGallery {
        let query = descriptor::extract(&face_image());
        MemoryGallery::with(vec![("Alice", shifted(&query, 10, distance))])
    }

    #[test]
    fn test_close_match_grants_access() {
        let mut lp = make_loop(
            ScriptedSource::faces(),
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.3),
        );

        let outcome = lp.run_iteration();
        let Outcome::Decided(Decision::Granted { name, distance }) = outcome else {
            panic!("expected access granted, got {outcome:?}");
        };
        assert_eq!(name, "Alice");
        assert!((distance - 0.3).abs() < 1e-4, "distance = {distance}");

        let gallery = lp.gallery();
        assert_eq!(gallery.events, vec![("Alice".to_string(), "access_granted (d=0.3000)".to_string())]);
        assert!(gallery.alerts.is_empty());
    }

    #[test]
    fn test_distant_match_denies_and_alerts() {
        let mut lp = make_loop(
            ScriptedSource::faces(),
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.9),
        );

        let outcome = lp.run_iteration();
        let Outcome::Decided(Decision::Denied { distance, nearest }) = outcome else {
            panic!("expected access denied, got {outcome:?}");
        };
        assert!((distance - 0.9).abs() < 1e-4);
        assert_eq!(nearest.as_deref(), Some("Alice"));

        let gallery = lp.gallery();
        assert_eq!(gallery.events, vec![("Unknown".to_string(), "access_denied (d=0.9000)".to_string())]);
        assert_eq!(gallery.alerts, vec!["unknown face (d=0.9000)".to_string()]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let query = descriptor::extract(&face_image());
        let gallery = MemoryGallery::with(vec![("Alice", shifted(&query, 3, 0.5))]);
        let policy = AccessPolicy { threshold: 0.5 };
        let mut lp = DecisionLoop::new(
            ScriptedSource::faces(),
            ScriptedDetector::always(Some(full_frame_box())),
            gallery,
            policy,
            instant_timing(),
        );
        assert!(matches!(lp.run_iteration(), Outcome::Decided(Decision::Granted { .. })));
    }

    #[test]
    fn test_empty_gallery_denies_with_sentinel() {
        let mut lp = make_loop(
            ScriptedSource::faces(),
            ScriptedDetector::always(Some(full_frame_box())),
            MemoryGallery::default(),
        );

        let outcome = lp.run_iteration();
        assert_eq!(
            outcome,
            Outcome::Decided(Decision::Denied { distance: NO_MATCH_DISTANCE, nearest: None })
        );
        assert_eq!(lp.gallery().events.len(), 1);
        assert_eq!(lp.gallery().events[0].0, UNKNOWN_NAME);
        assert_eq!(lp.gallery().alerts.len(), 1);
    }

    #[test]
    fn test_frame_failure_backs_off_without_lookup() {
        let source = ScriptedSource::new(vec![Err(CaptureError::ReadFailed("timeout".into()))]);
        let mut lp = make_loop(source, ScriptedDetector::always(Some(full_frame_box())), alice_at(0.1));

        let outcome = lp.run_iteration();
        assert_eq!(outcome, Outcome::FrameUnavailable);
        assert_eq!(outcome.pause(&LoopTiming::default()), Duration::from_millis(200));
        assert_eq!(lp.gallery().reads.get(), 0);
        assert!(lp.gallery().events.is_empty());
    }

    #[test]
    fn test_empty_frame_retries_immediately() {
        let empty = Frame::new(DynamicImage::ImageLuma8(GrayImage::new(0, 0)), 7);
        let mut lp = make_loop(
            ScriptedSource::new(vec![Ok(empty)]),
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.1),
        );

        let outcome = lp.run_iteration();
        assert_eq!(outcome, Outcome::EmptyFrame);
        assert_eq!(outcome.pause(&LoopTiming::default()), Duration::ZERO);
    }

    #[test]
    fn test_dark_frame_is_skipped() {
        let mut dark = face_frame();
        dark.is_dark = true;
        let mut lp = make_loop(
            ScriptedSource::new(vec![Ok(dark)]),
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.1),
        );
        assert_eq!(lp.run_iteration(), Outcome::EmptyFrame);
    }

    #[test]
    fn test_no_face_skips_gallery() {
        let mut lp = make_loop(ScriptedSource::faces(), ScriptedDetector::always(None), alice_at(0.1));

        let outcome = lp.run_iteration();
        assert_eq!(outcome, Outcome::NoFace);
        assert_eq!(outcome.pause(&LoopTiming::default()), Duration::from_millis(200));
        assert_eq!(lp.gallery().reads.get(), 0);
        assert!(lp.gallery().events.is_empty());
        assert!(lp.gallery().alerts.is_empty());
    }

    #[test]
    fn test_detector_error_counts_as_no_face() {
        let detector = ScriptedDetector::script(vec![Err("session poisoned".into())]);
        let mut lp = make_loop(ScriptedSource::faces(), detector, alice_at(0.1));
        assert_eq!(lp.run_iteration(), Outcome::NoFace);
    }

    #[test]
    fn test_region_outside_frame_counts_as_no_face() {
        let outside = crate::types::BoundingBox {
            x: 500.0,
            y: 500.0,
            width: 10.0,
            height: 10.0,
            confidence: 0.9,
        };
        let mut lp = make_loop(ScriptedSource::faces(), ScriptedDetector::always(Some(outside)), alice_at(0.1));
        assert_eq!(lp.run_iteration(), Outcome::NoFace);
        assert_eq!(lp.gallery().reads.get(), 0);
    }

    #[test]
    fn test_gallery_read_failure_backs_off() {
        let mut gallery = alice_at(0.1);
        gallery.fail_reads = true;
        let mut lp = make_loop(ScriptedSource::faces(), ScriptedDetector::always(Some(full_frame_box())), gallery);

        let outcome = lp.run_iteration();
        assert_eq!(outcome, Outcome::StoreUnavailable);
        assert_eq!(outcome.pause(&LoopTiming::default()), Duration::from_secs(1));
        assert!(lp.gallery().events.is_empty());

        // The next iteration starts over from a fresh frame.
        lp.run_iteration();
        assert_eq!(lp.source().acquired, 2);
    }

    #[test]
    fn test_audit_write_failure_is_swallowed() {
        let mut gallery = alice_at(0.9);
        gallery.fail_writes = true;
        let mut lp = make_loop(ScriptedSource::faces(), ScriptedDetector::always(Some(full_frame_box())), gallery);

        assert!(matches!(lp.run_iteration(), Outcome::Decided(Decision::Denied { .. })));
        assert!(matches!(lp.run_iteration(), Outcome::Decided(Decision::Denied { .. })));
    }

    #[test]
    fn test_states_advance_in_order() {
        let mut lp = make_loop(
            ScriptedSource::faces(),
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.3),
        );

        let mut state = LoopState::Idle;
        let mut visited = vec![state.name()];
        while let Step::Continue(next) = lp.advance(state) {
            visited.push(next.name());
            if matches!(next, LoopState::Decided(_)) {
                break;
            }
            state = next;
        }
        assert_eq!(visited, ["idle", "frame_acquired", "face_detected", "matched", "decided"]);
    }

    #[test]
    fn test_decided_state_halts() {
        let mut lp = make_loop(ScriptedSource::faces(), ScriptedDetector::always(None), MemoryGallery::default());
        let decision = Decision::Denied { distance: 1.0, nearest: None };
        let Step::Halt(outcome) = lp.advance(LoopState::Decided(decision.clone())) else {
            panic!("decided state must halt");
        };
        assert_eq!(outcome, Outcome::Decided(decision));
    }

    #[test]
    fn test_run_returns_when_stopped() {
        let stop = AtomicBool::new(true);
        let mut lp = make_loop(
            ScriptedSource::faces(),
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.3),
        );
        lp.run(&stop);
        assert_eq!(lp.source().acquired, 0);
    }

    #[test]
    fn test_run_checks_stop_each_iteration() {
        struct StopAfter {
            inner: ScriptedSource,
            remaining: usize,
            stop: Arc<AtomicBool>,
        }

        impl FrameSource for StopAfter {
            fn acquire_frame(&mut self) -> Result<Frame, CaptureError> {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.stop.store(true, Ordering::Relaxed);
                }
                self.inner.acquire_frame()
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let source = StopAfter {
            inner: ScriptedSource::faces(),
            remaining: 3,
            stop: Arc::clone(&stop),
        };
        let mut lp = DecisionLoop::new(
            source,
            ScriptedDetector::always(Some(full_frame_box())),
            alice_at(0.3),
            AccessPolicy::default(),
            instant_timing(),
        );

        lp.run(&stop);
        assert_eq!(lp.gallery().events.len(), 3);
    }
}
