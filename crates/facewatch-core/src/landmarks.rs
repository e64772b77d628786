//! 106-point landmark network (insightface 2d106det) via ONNX Runtime.
//!
//! The face box is expanded to a square, warped to 192×192, and the
//! network's normalized [-1, 1] outputs are mapped back into frame space.

use crate::alignment::{self, SimilarityTransform};
use crate::types::{Detection, Landmarks};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const LANDMARK_MODEL_FILE: &str = "2d106det.onnx";

const INPUT_SIZE: u32 = 192;
const CROP_EXPANSION: f32 = 1.5;
const PIXEL_MEAN: f32 = 127.5;
const PIXEL_STD: f32 = 128.0;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("landmark model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct LandmarkDetector {
    session: Session,
}

impl LandmarkDetector {
    pub fn load(model_path: &Path) -> Result<Self, LandmarkError> {
        if !model_path.exists() {
            return Err(LandmarkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded landmark model");
        Ok(Self { session })
    }

    pub fn landmarks(
        &mut self,
        image: &GrayImage,
        detection: &Detection,
    ) -> Result<Landmarks, LandmarkError> {
        let crop = crop_transform(detection);
        let patch = alignment::warp(image, &crop, INPUT_SIZE);
        let input = preprocess(&patch);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| LandmarkError::InferenceFailed(format!("landmarks: {e}")))?;

        if raw.is_empty() || raw.len() % 2 != 0 {
            return Err(LandmarkError::InferenceFailed(format!(
                "expected (x, y) pairs, got {} values",
                raw.len()
            )));
        }

        decode(raw, &crop).ok_or_else(|| {
            LandmarkError::InferenceFailed("degenerate crop transform".to_string())
        })
    }
}

/// Square crop centred on the face box, `CROP_EXPANSION` times its longer side.
fn crop_transform(detection: &Detection) -> SimilarityTransform {
    let (cx, cy) = detection.bbox.center();
    let side = detection.bbox.width.max(detection.bbox.height) * CROP_EXPANSION;
    SimilarityTransform::square_crop(cx - side / 2.0, cy - side / 2.0, side, INPUT_SIZE)
}

fn decode(raw: &[f32], crop: &SimilarityTransform) -> Option<Landmarks> {
    let back = crop.inverse()?;
    let half = INPUT_SIZE as f32 / 2.0;
    let points = raw
        .chunks_exact(2)
        .map(|p| back.apply(((p[0] + 1.0) * half, (p[1] + 1.0) * half)))
        .collect();
    Some(Landmarks::new(points))
}

fn preprocess(patch: &GrayImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in patch.enumerate_pixels() {
        let v = (pixel[0] as f32 - PIXEL_MEAN) / PIXEL_STD;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn detection() -> Detection {
        Detection {
            bbox: BoundingBox { x: 100.0, y: 80.0, width: 60.0, height: 80.0 },
            score: 0.9,
            keypoints: None,
        }
    }

    #[test]
    fn test_crop_is_centered_square() {
        let t = crop_transform(&detection());
        // Box centre (130, 120) lands at the patch centre.
        let (x, y) = t.apply((130.0, 120.0));
        assert!((x - 96.0).abs() < 1e-3 && (y - 96.0).abs() < 1e-3, "({x}, {y})");
        // 80 px × 1.5 = 120 px of source span the 192 px patch.
        assert!((t.a - 192.0 / 120.0).abs() < 1e-5);
    }

    #[test]
    fn test_decode_maps_normalized_points_to_frame() {
        let t = crop_transform(&detection());
        // (0, 0) is the patch centre, (-1, -1) its top-left corner.
        let lm = decode(&[0.0, 0.0, -1.0, -1.0], &t).unwrap();
        assert_eq!(lm.points.len(), 2);
        let (cx, cy) = lm.points[0];
        assert!((cx - 130.0).abs() < 1e-3 && (cy - 120.0).abs() < 1e-3);
        let (tx, ty) = lm.points[1];
        assert!((tx - 70.0).abs() < 1e-3 && (ty - 60.0).abs() < 1e-3, "({tx}, {ty})");
    }

    #[test]
    fn test_preprocess_shape() {
        let patch = GrayImage::new(INPUT_SIZE, INPUT_SIZE);
        assert_eq!(preprocess(&patch).shape(), &[1, 3, 192, 192]);
    }
}
