//! Per-photo face detection index.

use crate::types::{FaceDetection, PhotoId};
use std::collections::HashMap;

/// Mapping from staged photo id to the faces detected in it.
///
/// An entry with an empty list means detection ran and found nothing (or
/// failed); a missing entry means detection has not produced a result.
#[derive(Debug, Clone, Default)]
pub struct FaceIndex {
    entries: HashMap<PhotoId, Vec<FaceDetection>>,
}

impl FaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the detections for a photo, replacing any previous entry.
    pub fn insert(&mut self, id: PhotoId, detections: Vec<FaceDetection>) -> Option<Vec<FaceDetection>> {
        self.entries.insert(id, detections)
    }

    pub fn remove(&mut self, id: &PhotoId) -> Option<Vec<FaceDetection>> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &PhotoId) -> Option<&[FaceDetection]> {
        self.entries.get(id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: &PhotoId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of faces across all photos.
    pub fn face_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PhotoId, &[FaceDetection])> {
        self.entries.iter().map(|(id, dets)| (id, dets.as_slice()))
    }
}
