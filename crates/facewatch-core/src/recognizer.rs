//! ArcFace descriptor extraction via ONNX Runtime.
//!
//! Aligns each face to the canonical 112×112 crop and produces an
//! L2-normalized 512-dimensional descriptor (w600k_r50).

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{Descriptor, Detection};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD's 128.0
const DESCRIPTOR_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detection has no keypoints; alignment needs the detector's five points")]
    NoKeypoints,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path) -> Result<Self, RecognizerError> {
        if !model_path.exists() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = %model_path.display(), "loaded ArcFace model");
        Ok(Self { session })
    }

    /// Compute the descriptor of one detected face.
    pub fn describe(
        &mut self,
        image: &GrayImage,
        detection: &Detection,
    ) -> Result<Descriptor, RecognizerError> {
        let keypoints = detection.keypoints.as_ref().ok_or(RecognizerError::NoKeypoints)?;
        let aligned = alignment::align_face(image, keypoints);
        let input = preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("descriptor extraction: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor::new(l2_normalize(raw)))
    }
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}

/// Aligned 112×112 luma crop to NCHW, replicated across three channels.
fn preprocess(aligned: &GrayImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in aligned.enumerate_pixels() {
        let v = (pixel[0] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = v;
        }
    }
    tensor
}
