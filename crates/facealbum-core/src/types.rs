use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable identifier of a staged photo, unique within an authoring session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(String);

impl PhotoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhotoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhotoId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Detector-level bounding box, with score and optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let inter_h = ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.width * self.height + other.width * other.height - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Axis-aligned face rectangle, in the natural pixel space of the source image
/// unless it has been projected with [`crate::geometry::project`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

impl From<&BoundingBox> for FaceBox {
    fn from(b: &BoundingBox) -> Self {
        Self::new(b.x, b.y, b.width, b.height)
    }
}

/// Face identity embedding (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
    /// Model version that produced this descriptor (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Descriptors of different lengths come from different models and are
    /// never comparable: the distance is `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One detected face within a staged photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    #[serde(rename = "box")]
    pub bbox: FaceBox,
    pub descriptor: Descriptor,
}

/// Raw output of the model runtime for one face, before validation.
#[derive(Debug, Clone)]
pub struct RawFace {
    pub bbox: BoundingBox,
    pub descriptor: Vec<f32>,
    pub model_version: Option<String>,
}

#[derive(Error, Debug, PartialEq)]
pub enum IngestError {
    #[error("face {index}: non-finite box coordinates")]
    NonFiniteBox { index: usize },
    #[error("face {index}: negative box size {width}x{height}")]
    NegativeBox { index: usize, width: f32, height: f32 },
    #[error("face {index}: empty descriptor")]
    EmptyDescriptor { index: usize },
    #[error("face {index}: descriptor contains non-finite values")]
    NonFiniteDescriptor { index: usize },
    #[error("face {index}: descriptor has {actual} dimensions, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, actual: usize },
}

/// Validate raw runtime output for one photo into typed detections.
///
/// Every descriptor in a photo must share the dimension of the first one.
/// A single malformed face rejects the whole photo.
pub fn ingest(raw: Vec<RawFace>) -> Result<Vec<FaceDetection>, IngestError> {
    let expected = raw.first().map(|f| f.descriptor.len());
    let mut detections = Vec::with_capacity(raw.len());

    for (index, face) in raw.into_iter().enumerate() {
        let b = &face.bbox;
        if ![b.x, b.y, b.width, b.height].iter().all(|v| v.is_finite()) {
            return Err(IngestError::NonFiniteBox { index });
        }
        if b.width < 0.0 || b.height < 0.0 {
            return Err(IngestError::NegativeBox { index, width: b.width, height: b.height });
        }
        if face.descriptor.is_empty() {
            return Err(IngestError::EmptyDescriptor { index });
        }
        if face.descriptor.iter().any(|v| !v.is_finite()) {
            return Err(IngestError::NonFiniteDescriptor { index });
        }
        if let Some(expected) = expected {
            if face.descriptor.len() != expected {
                return Err(IngestError::DimensionMismatch {
                    index,
                    expected,
                    actual: face.descriptor.len(),
                });
            }
        }

        detections.push(FaceDetection {
            bbox: FaceBox::from(&face.bbox),
            descriptor: Descriptor {
                values: face.descriptor,
                model_version: face.model_version,
            },
        });
    }

    Ok(detections)
}
