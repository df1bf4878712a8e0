use crate::descriptor::Descriptor;

/// Distance reported when no gallery entry could be compared.
///
/// Larger than any distance between two unit-norm descriptors (at most 2.0).
pub const NO_MATCH_DISTANCE: f32 = 1e9;

/// Name recorded in the event log for faces that did not match.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Bounding box for a detected face, in frame pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// An enrolled identity as held by the gallery.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: i64,
    pub name: String,
    pub descriptor: Descriptor,
}

/// Result of matching a query descriptor against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Name of the closest identity, empty when nothing was found.
    pub best_name: String,
    /// Euclidean distance to the closest identity, or [`NO_MATCH_DISTANCE`].
    pub best_distance: f32,
    pub found: bool,
    pub identity_id: Option<i64>,
}

impl MatchResult {
    /// A result for a gallery with no comparable entries.
    pub fn not_found() -> Self {
        Self {
            best_name: String::new(),
            best_distance: NO_MATCH_DISTANCE,
            found: false,
            identity_id: None,
        }
    }

    /// True if a candidate was found and lies within `threshold`.
    pub fn within(&self, threshold: f32) -> bool {
        self.found && self.best_distance <= threshold
    }
}

/// Outcome of one access decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Granted { name: String, distance: f32 },
    Denied {
        distance: f32,
        /// Closest enrolled name, if the gallery had any comparable entry.
        nearest: Option<String>,
    },
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted { .. })
    }

    pub fn distance(&self) -> f32 {
        match self {
            Decision::Granted { distance, .. } | Decision::Denied { distance, .. } => *distance,
        }
    }
}
