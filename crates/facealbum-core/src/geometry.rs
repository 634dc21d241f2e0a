//! Overlay geometry: map face boxes from natural image pixels onto the
//! currently rendered (scaled) image element.

use crate::types::{Descriptor, FaceBox, FaceDetection};
use serde::{Deserialize, Serialize};

/// Rendered and natural sizes of an image element at one point in time.
///
/// Natural dimensions are zero until the image has loaded. Recompute from the
/// layout system on every resize; never reuse across layout changes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub rendered_width: f32,
    pub rendered_height: f32,
    pub natural_width: f32,
    pub natural_height: f32,
}

impl ImageDimensions {
    pub fn new(rendered_width: f32, rendered_height: f32, natural_width: f32, natural_height: f32) -> Self {
        Self { rendered_width, rendered_height, natural_width, natural_height }
    }

    /// Whether the natural size is known. Overlays must not be drawn otherwise.
    pub fn is_loaded(&self) -> bool {
        self.natural_width > 0.0 && self.natural_height > 0.0
    }

    /// Independent horizontal and vertical scale factors.
    pub fn scale(&self) -> (f32, f32) {
        let scale_x = if self.natural_width > 0.0 {
            self.rendered_width / self.natural_width
        } else {
            0.0
        };
        let scale_y = if self.natural_height > 0.0 {
            self.rendered_height / self.natural_height
        } else {
            0.0
        };
        (scale_x, scale_y)
    }

    pub fn project(&self, bbox: &FaceBox) -> FaceBox {
        let (sx, sy) = self.scale();
        FaceBox {
            x: bbox.x * sx,
            y: bbox.y * sy,
            width: bbox.width * sx,
            height: bbox.height * sy,
        }
    }
}

/// Project a natural-space box onto a rendered image of the given size.
pub fn project(
    bbox: &FaceBox,
    rendered_width: f32,
    rendered_height: f32,
    natural_width: f32,
    natural_height: f32,
) -> FaceBox {
    ImageDimensions::new(rendered_width, rendered_height, natural_width, natural_height).project(bbox)
}

/// A face overlay positioned on the rendered image.
#[derive(Debug, Clone, Serialize)]
pub struct Overlay {
    /// Position of the face in the photo's detection list.
    pub face: usize,
    #[serde(rename = "box")]
    pub bbox: FaceBox,
}

/// Lay out overlays for every detection of a photo.
///
/// Returns nothing while the image is not loaded.
pub fn overlays(detections: &[FaceDetection], dims: &ImageDimensions) -> Vec<Overlay> {
    if !dims.is_loaded() {
        return Vec::new();
    }
    detections
        .iter()
        .enumerate()
        .map(|(face, d)| Overlay { face, bbox: dims.project(&d.bbox) })
        .collect()
}

/// Where the host UI should go after an overlay was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Leave the detail view so the highlighted search results are visible.
    ReturnToCollection,
}

/// Outcome of clicking a face overlay: a new search target plus navigation.
#[derive(Debug, Clone)]
pub struct OverlayActivation {
    pub target: Descriptor,
    pub navigation: Navigation,
}

impl OverlayActivation {
    pub fn for_detection(detection: &FaceDetection) -> Self {
        Self {
            target: detection.descriptor.clone(),
            navigation: Navigation::ReturnToCollection,
        }
    }
}
