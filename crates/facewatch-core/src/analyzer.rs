//! The face-analysis capability: detection, landmarks, expressions, descriptors.
//!
//! The matching pipeline only sees the [`FaceAnalyzer`] trait.
//! [`OnnxFaceAnalyzer`] is the stock implementation built from four ONNX models.

use crate::assets::{AssetError, AssetLocation};
use crate::detector::{DetectorError, FaceDetector, SCRFD_MODEL_FILE};
use crate::expression::{ExpressionClassifier, ExpressionError, EXPRESSION_MODEL_FILE};
use crate::landmarks::{LandmarkDetector, LandmarkError, LANDMARK_MODEL_FILE};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_MODEL_FILE};
use crate::types::{Detection, FaceObservation, Landmarks};
use image::GrayImage;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model asset: {0}")]
    Asset(#[from] AssetError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("landmarks: {0}")]
    Landmarks(#[from] LandmarkError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("expressions: {0}")]
    Expression(#[from] ExpressionError),
}

/// Black-box face analysis on one luma image.
pub trait FaceAnalyzer: Send {
    /// Best face with landmarks and descriptor (no expressions), or `None`.
    fn detect_single(&mut self, image: &GrayImage) -> Result<Option<FaceObservation>, AnalyzerError>;

    /// Every face with landmarks, expressions and descriptor.
    fn detect_all(&mut self, image: &GrayImage) -> Result<Vec<FaceObservation>, AnalyzerError>;
}

/// Local paths of the four model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub detector: PathBuf,
    pub landmarks: PathBuf,
    pub recognizer: PathBuf,
    pub expressions: PathBuf,
}

impl ModelSet {
    /// Resolve the standard file names against a location, downloading remote ones.
    pub fn resolve(location: &AssetLocation) -> Result<Self, AssetError> {
        Ok(Self {
            detector: location.resolve_model(SCRFD_MODEL_FILE)?,
            landmarks: location.resolve_model(LANDMARK_MODEL_FILE)?,
            recognizer: location.resolve_model(ARCFACE_MODEL_FILE)?,
            expressions: location.resolve_model(EXPRESSION_MODEL_FILE)?,
        })
    }
}

pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    landmarks: LandmarkDetector,
    recognizer: FaceRecognizer,
    expressions: ExpressionClassifier,
}

impl OnnxFaceAnalyzer {
    /// Load all four models; any failure is fatal.
    pub fn load(models: &ModelSet) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&models.detector)?;
        let landmarks = LandmarkDetector::load(&models.landmarks)?;
        let recognizer = FaceRecognizer::load(&models.recognizer)?;
        let expressions = ExpressionClassifier::load(&models.expressions)?;
        tracing::info!("face analysis models loaded");
        Ok(Self {
            detector,
            landmarks,
            recognizer,
            expressions,
        })
    }

    fn observe(
        &mut self,
        image: &GrayImage,
        detection: Detection,
        with_expressions: bool,
    ) -> Result<FaceObservation, AnalyzerError> {
        let mut landmarks = self.landmarks.landmarks(image, &detection)?;
        if landmarks.is_empty() {
            landmarks = Landmarks::new(detection.keypoints.map(Vec::from).unwrap_or_default());
        }
        let expressions = if with_expressions {
            Some(self.expressions.classify(image, &detection)?)
        } else {
            None
        };
        let descriptor = self.recognizer.describe(image, &detection)?;
        Ok(FaceObservation {
            detection,
            landmarks,
            expressions,
            descriptor,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn detect_single(&mut self, image: &GrayImage) -> Result<Option<FaceObservation>, AnalyzerError> {
        let best = self.detector.detect(image)?.into_iter().next();
        best.map(|d| self.observe(image, d, false)).transpose()
    }

    fn detect_all(&mut self, image: &GrayImage) -> Result<Vec<FaceObservation>, AnalyzerError> {
        let detections = self.detector.detect(image)?;
        tracing::trace!(faces = detections.len(), "detected");
        detections
            .into_iter()
            .map(|d| self.observe(image, d, true))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_model_set_resolves_standard_names() {
        let set = ModelSet::resolve(&AssetLocation::parse("models")).unwrap();
        assert_eq!(set.detector, Path::new("models/det_10g.onnx"));
        assert_eq!(set.landmarks, Path::new("models/2d106det.onnx"));
        assert_eq!(set.recognizer, Path::new("models/w600k_r50.onnx"));
        assert_eq!(set.expressions, Path::new("models/emotion-ferplus-8.onnx"));
    }

    #[test]
    fn test_load_missing_models_fails() {
        let set = ModelSet::resolve(&AssetLocation::parse("/nonexistent/facewatch")).unwrap();
        assert!(matches!(
            OnnxFaceAnalyzer::load(&set),
            Err(AnalyzerError::Detector(DetectorError::ModelNotFound(_)))
        ));
    }
}
