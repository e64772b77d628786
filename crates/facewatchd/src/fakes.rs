//! Stand-ins for the analyzer, canvas and camera used by the daemon tests.

use facewatch_core::analyzer::AnalyzerError;
use facewatch_core::overlay::CanvasError;
use facewatch_core::pipeline::{CaptureError, FrameSource};
use facewatch_core::types::{
    BoundingBox, Descriptor, Detection, Expressions, FaceObservation, Identity, Landmarks,
};
use facewatch_core::{Canvas, FaceAnalyzer, FaceMatcher, Matcher};
use image::GrayImage;
use std::sync::Arc;

/// Sees the same face in every frame.
pub struct OneFace;

impl FaceAnalyzer for OneFace {
    fn detect_single(&mut self, image: &GrayImage) -> Result<Option<FaceObservation>, AnalyzerError> {
        Ok(self.detect_all(image)?.pop())
    }

    fn detect_all(&mut self, _: &GrayImage) -> Result<Vec<FaceObservation>, AnalyzerError> {
        Ok(vec![FaceObservation {
            detection: Detection {
                bbox: BoundingBox { x: 40.0, y: 40.0, width: 80.0, height: 80.0 },
                score: 0.8,
                keypoints: None,
            },
            landmarks: Landmarks::default(),
            expressions: None,
            descriptor: Descriptor::new(vec![1.0, 0.0]),
        }])
    }
}

pub struct NullCanvas;

impl Canvas for NullCanvas {
    fn clear(&mut self) {}
    fn draw_detection(&mut self, _: &Detection) {}
    fn draw_landmarks(&mut self, _: &Landmarks) {}
    fn draw_expressions(&mut self, _: &BoundingBox, _: &Expressions) {}
    fn draw_labeled_box(&mut self, _: &BoundingBox, _: &str, _: bool) {}
    fn present(&mut self) -> Result<(), CanvasError> {
        Ok(())
    }
}

pub struct BlankCamera;

impl FrameSource for BlankCamera {
    fn capture(&mut self) -> Result<GrayImage, CaptureError> {
        Ok(GrayImage::new(300, 300))
    }
}

/// Knows "Seno" by the descriptor `OneFace` reports.
pub fn matcher() -> Arc<dyn Matcher> {
    Arc::new(
        FaceMatcher::new(vec![Identity::new("Seno", vec![Descriptor::new(vec![1.0, 0.0])])], 0.6)
            .unwrap(),
    )
}
