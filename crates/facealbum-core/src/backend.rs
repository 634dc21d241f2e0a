//! Model runtime boundary: photo bytes in, raw faces out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::RawFace;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// A face detection + embedding runtime.
///
/// Output is unvalidated; callers pass it through [`crate::types::ingest`].
pub trait FaceBackend: Send {
    fn detect(&mut self, image: &[u8]) -> Result<Vec<RawFace>, BackendError>;
}

/// SCRFD detection followed by ArcFace embedding, both on ONNX Runtime.
pub struct OnnxBackend {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxBackend {
    pub fn load(detector_path: &Path, recognizer_path: &Path, confidence: f32) -> Result<Self, BackendError> {
        Ok(Self {
            detector: FaceDetector::load(detector_path, confidence)?,
            recognizer: FaceRecognizer::load(recognizer_path)?,
        })
    }
}

impl FaceBackend for OnnxBackend {
    fn detect(&mut self, image: &[u8]) -> Result<Vec<RawFace>, BackendError> {
        let rgb = image::load_from_memory(image)?.to_rgb8();
        let boxes = self.detector.detect(&rgb)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let descriptor = self.recognizer.extract(&rgb, &bbox)?;
            faces.push(RawFace {
                bbox,
                descriptor: descriptor.values,
                model_version: descriptor.model_version,
            });
        }

        tracing::debug!(
            width = rgb.width(),
            height = rgb.height(),
            faces = faces.len(),
            "faces extracted"
        );
        Ok(faces)
    }
}
