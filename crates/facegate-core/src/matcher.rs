use crate::descriptor::Descriptor;
use crate::types::{Identity, MatchResult, NO_MATCH_DISTANCE};

/// Strategy for finding the closest enrolled identity to a query descriptor.
pub trait Matcher {
    fn find_best_match(&self, query: &Descriptor, gallery: &[Identity]) -> MatchResult;
}

/// Linear-scan Euclidean matcher.
///
/// Visits every gallery entry. The first identity in gallery order wins ties,
/// since the best is only replaced on a strictly smaller distance. Candidates
/// whose descriptor length differs from the query are infinitely far away.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find_best_match(&self, query: &Descriptor, gallery: &[Identity]) -> MatchResult {
        let mut best_distance = NO_MATCH_DISTANCE;
        let mut best_idx: Option<usize> = None;

        for (i, identity) in gallery.iter().enumerate() {
            let distance = query.distance(&identity.descriptor);
            if distance.is_infinite() {
                tracing::debug!(
                    id = identity.id,
                    expected = query.len(),
                    actual = identity.descriptor.len(),
                    "descriptor length mismatch; skipping candidate"
                );
            }
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) => MatchResult {
                best_name: gallery[idx].name.clone(),
                best_distance,
                found: true,
                identity_id: Some(gallery[idx].id),
            },
            None => MatchResult::not_found(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: i64, name: &str, values: Vec<f32>) -> Identity {
        Identity {
            id,
            name: name.into(),
            descriptor: Descriptor::from_values(values),
        }
    }

    #[test]
    fn test_closest_identity_wins() {
        let gallery = vec![
            identity(1, "Alice", vec![1.0, 0.0, 0.0]),
            identity(2, "Bob", vec![0.0, 1.0, 0.0]),
        ];
        let query = Descriptor::from_values(vec![0.1, 0.9, 0.0]);

        let result = EuclideanMatcher.find_best_match(&query, &gallery);
        assert!(result.found);
        assert_eq!(result.best_name, "Bob");
        assert_eq!(result.identity_id, Some(2));
        let expected = query.distance(&gallery[1].descriptor);
        assert!((result.best_distance - expected).abs() < 1e-6);
    }

    #[test]
    fn test_best_match_is_last_entry() {
        let gallery = vec![
            identity(1, "decoy1", vec![0.0, 1.0, 0.0]),
            identity(2, "decoy2", vec![0.0, 0.0, 1.0]),
            identity(3, "match", vec![1.0, 0.0, 0.0]),
        ];
        let query = Descriptor::from_values(vec![1.0, 0.0, 0.0]);

        let result = EuclideanMatcher.find_best_match(&query, &gallery);
        assert_eq!(result.best_name, "match");
        assert_eq!(result.best_distance, 0.0);
    }

    #[test]
    fn test_tie_goes_to_earlier_identity() {
        let gallery = vec![
            identity(1, "Alice", vec![1.0, 0.0]),
            identity(2, "Bob", vec![0.0, 1.0]),
        ];
        // Equidistant from both.
        let query = Descriptor::from_values(vec![0.5, 0.5]);

        let result = EuclideanMatcher.find_best_match(&query, &gallery);
        assert_eq!(result.best_name, "Alice");
        assert_eq!(result.identity_id, Some(1));
    }

    #[test]
    fn test_duplicate_names_resolve_by_distance() {
        let gallery = vec![
            identity(1, "Carol", vec![0.0, 1.0]),
            identity(2, "Carol", vec![1.0, 0.0]),
        ];
        let query = Descriptor::from_values(vec![1.0, 0.0]);

        let result = EuclideanMatcher.find_best_match(&query, &gallery);
        assert_eq!(result.best_name, "Carol");
        assert_eq!(result.identity_id, Some(2));
    }

    #[test]
    fn test_empty_gallery() {
        let query = Descriptor::from_values(vec![1.0, 0.0]);
        let result = EuclideanMatcher.find_best_match(&query, &[]);
        assert!(!result.found);
        assert_eq!(result.best_distance, NO_MATCH_DISTANCE);
        assert!(result.best_name.is_empty());
    }

    #[test]
    fn test_length_mismatch_never_wins() {
        let gallery = vec![
            identity(1, "short", vec![1.0]),
            identity(2, "far", vec![-1.0, 0.0]),
        ];
        let query = Descriptor::from_values(vec![1.0, 0.0]);

        let result = EuclideanMatcher.find_best_match(&query, &gallery);
        assert_eq!(result.best_name, "far");
        assert!((result.best_distance - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_only_mismatched_candidates_is_not_found() {
        let gallery = vec![identity(1, "short", vec![1.0])];
        let query = Descriptor::from_values(vec![1.0, 0.0]);
        let result = EuclideanMatcher.find_best_match(&query, &gallery);
        assert!(!result.found);
    }
}
