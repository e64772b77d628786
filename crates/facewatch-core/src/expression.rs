//! FER+ expression classifier (emotion-ferplus-8) via ONNX Runtime.

use crate::alignment::{self, SimilarityTransform};
use crate::types::{Detection, Expressions};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const EXPRESSION_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

const INPUT_SIZE: u32 = 64;
/// FER+ was trained on loose crops; pad the detector box a little.
const CROP_EXPANSION: f32 = 1.2;

#[derive(Error, Debug)]
pub enum ExpressionError {
    #[error("expression model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ExpressionError> {
        if !model_path.exists() {
            return Err(ExpressionError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded FER+ model");
        Ok(Self { session })
    }

    pub fn classify(
        &mut self,
        image: &GrayImage,
        detection: &Detection,
    ) -> Result<Expressions, ExpressionError> {
        let (cx, cy) = detection.bbox.center();
        let side = detection.bbox.width.max(detection.bbox.height) * CROP_EXPANSION;
        let crop = SimilarityTransform::square_crop(cx - side / 2.0, cy - side / 2.0, side, INPUT_SIZE);
        let patch = alignment::warp(image, &crop, INPUT_SIZE);
        let input = preprocess(&patch);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExpressionError::InferenceFailed(format!("expression scores: {e}")))?;

        let logits: [f32; 8] = raw.try_into().map_err(|_| {
            ExpressionError::InferenceFailed(format!("expected 8 scores, got {}", raw.len()))
        })?;
        Ok(Expressions::from_logits(&logits))
    }
}

/// FER+ takes raw 0–255 luma in a single channel.
fn preprocess(patch: &GrayImage) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for (x, y, pixel) in patch.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32;
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_keeps_raw_intensity() {
        let patch = GrayImage::from_pixel(INPUT_SIZE, INPUT_SIZE, image::Luma([200]));
        let t = preprocess(&patch);
        assert_eq!(t.shape(), &[1, 1, 64, 64]);
        assert_eq!(t[[0, 0, 10, 20]], 200.0);
    }
}
