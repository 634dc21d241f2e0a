//! facealbum-core — Face detection, embeddings and similarity search for
//! album authoring.
//!
//! Uses SCRFD for face detection and ArcFace for face descriptors, both
//! running via ONNX Runtime for CPU inference. Search and overlay geometry
//! are pure and model-independent.

pub mod alignment;
pub mod backend;
pub mod detector;
pub mod geometry;
pub mod index;
pub mod recognizer;
pub mod search;
pub mod types;

pub use backend::{BackendError, FaceBackend, OnnxBackend};
pub use geometry::{project, ImageDimensions, Navigation, Overlay, OverlayActivation};
pub use index::FaceIndex;
pub use search::{search, EuclideanMatcher, Matcher, SearchResultSet, DEFAULT_MATCH_THRESHOLD};
pub use types::{ingest, BoundingBox, Descriptor, FaceBox, FaceDetection, IngestError, PhotoId, RawFace};
