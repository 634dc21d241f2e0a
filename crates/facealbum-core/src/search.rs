//! Face similarity search across the staged photos of a session.

use crate::index::FaceIndex;
use crate::types::{Descriptor, PhotoId};
use std::collections::BTreeSet;

/// Euclidean distance below which two descriptors are the same person.
/// Lower is stricter.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Photo ids containing at least one face matching the search target.
pub type SearchResultSet = BTreeSet<PhotoId>;

/// Strategy for deciding whether a candidate face matches the search target.
pub trait Matcher {
    fn is_match(&self, target: &Descriptor, candidate: &Descriptor) -> bool;
}

/// Matches when the Euclidean distance is strictly below the threshold.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn is_match(&self, target: &Descriptor, candidate: &Descriptor) -> bool {
        target.euclidean_distance(candidate) < self.threshold
    }
}

/// Find every photo in `index` with a face matching `target`.
///
/// Full scan, O(photos × faces_per_photo). Stops at the first matching face
/// of each photo. No target means no search: the result is empty.
pub fn search<M: Matcher>(index: &FaceIndex, target: Option<&Descriptor>, matcher: &M) -> SearchResultSet {
    let Some(target) = target else {
        return SearchResultSet::new();
    };

    index
        .iter()
        .filter(|(_, detections)| {
            detections
                .iter()
                .any(|d| matcher.is_match(target, &d.descriptor))
        })
        .map(|(id, _)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaceBox, FaceDetection};

    fn det(values: Vec<f32>) -> FaceDetection {
        FaceDetection { bbox: FaceBox::default(), descriptor: Descriptor::new(values) }
    }

    #[test]
    fn test_no_target_is_empty() {
        let mut index = FaceIndex::new();
        index.insert(PhotoId::from("a"), vec![det(vec![0.0, 0.0])]);
        assert!(search(&index, None, &EuclideanMatcher::default()).is_empty());
    }

    #[test]
    fn test_self_match() {
        let d = vec![0.3, 0.4, 0.5];
        let mut index = FaceIndex::new();
        index.insert(PhotoId::from("photoA"), vec![det(d.clone())]);
        let results = search(&index, Some(&Descriptor::new(d)), &EuclideanMatcher::default());
        assert!(results.contains(&PhotoId::from("photoA")));
    }

    #[test]
    fn test_distance_at_threshold_excluded() {
        let mut index = FaceIndex::new();
        index.insert(PhotoId::from("photoA"), vec![det(vec![0.0, 0.0])]);
        // Distance exactly 0.5: not strictly below the threshold.
        let target = Descriptor::new(vec![0.0, 0.5]);
        assert!(search(&index, Some(&target), &EuclideanMatcher::default()).is_empty());

        let far = Descriptor::new(vec![3.0, 4.0]);
        assert!(search(&index, Some(&far), &EuclideanMatcher::default()).is_empty());
    }

    #[test]
    fn test_any_face_matches() {
        let mut index = FaceIndex::new();
        index.insert(
            PhotoId::from("group"),
            vec![det(vec![5.0, 5.0]), det(vec![0.1, 0.0]), det(vec![9.0, 9.0])],
        );
        index.insert(PhotoId::from("stranger"), vec![det(vec![5.0, 5.0])]);
        index.insert(PhotoId::from("empty"), Vec::new());

        let target = Descriptor::new(vec![0.0, 0.0]);
        let results = search(&index, Some(&target), &EuclideanMatcher::default());
        assert_eq!(results.into_iter().collect::<Vec<_>>(), vec![PhotoId::from("group")]);
    }

    #[test]
    fn test_custom_threshold() {
        let mut index = FaceIndex::new();
        index.insert(PhotoId::from("a"), vec![det(vec![0.0, 0.55])]);
        let target = Descriptor::new(vec![0.0, 0.0]);
        assert!(search(&index, Some(&target), &EuclideanMatcher::default()).is_empty());
        assert_eq!(search(&index, Some(&target), &EuclideanMatcher::new(0.6)).len(), 1);
    }

    #[test]
    fn test_deterministic() {
        let mut index = FaceIndex::new();
        for i in 0..20 {
            index.insert(PhotoId::new(format!("p{i}")), vec![det(vec![i as f32 * 0.1, 0.0])]);
        }
        let target = Descriptor::new(vec![0.0, 0.0]);
        let first = search(&index, Some(&target), &EuclideanMatcher::default());
        let second = search(&index, Some(&target), &EuclideanMatcher::default());
        assert_eq!(first, second);
        assert!(first.contains(&PhotoId::from("p4")));
        assert!(!first.contains(&PhotoId::from("p6")));
    }
}
