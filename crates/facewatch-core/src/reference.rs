//! Builds the reference set: one [`Identity`] per known label.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::assets::{AssetError, AssetLocation};
use crate::status::{Status, StatusSink};
use crate::types::Identity;
use image::GrayImage;
use thiserror::Error;

pub const DEFAULT_LABELS: [&str; 3] = ["Adi Martha", "Seno", "Wendy"];
pub const DEFAULT_IMAGES_PER_LABEL: usize = 2;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("failed to fetch reference image {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: AssetError,
    },
    #[error("face analysis failed on {location}: {source}")]
    Analyzer {
        location: String,
        #[source]
        source: AnalyzerError,
    },
    #[error("no face found in reference image {location} for {label:?}")]
    NoFace { label: String, location: String },
}

/// Which identities to load and how many images each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpec {
    pub labels: Vec<String>,
    pub images_per_label: usize,
}

impl Default for ReferenceSpec {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|l| l.to_string()).collect(),
            images_per_label: DEFAULT_IMAGES_PER_LABEL,
        }
    }
}

/// Supplies reference image `index` (1-based) of a label.
pub trait ReferenceSource {
    fn fetch(&self, label: &str, index: usize) -> Result<GrayImage, AssetError>;

    /// Where image `index` of `label` comes from, for messages.
    fn describe(&self, label: &str, index: usize) -> String;
}

/// `{location}/{label}/{index}.jpg`.
pub struct ImageAssetSource {
    location: AssetLocation,
}

impl ImageAssetSource {
    pub fn new(location: AssetLocation) -> Self {
        Self { location }
    }

    fn relative(label: &str, index: usize) -> String {
        format!("{label}/{index}.jpg")
    }
}

impl ReferenceSource for ImageAssetSource {
    fn fetch(&self, label: &str, index: usize) -> Result<GrayImage, AssetError> {
        self.location.fetch_gray_image(&Self::relative(label, index))
    }

    fn describe(&self, label: &str, index: usize) -> String {
        self.location.describe(&Self::relative(label, index))
    }
}

pub struct ReferenceSetBuilder<'a> {
    spec: &'a ReferenceSpec,
    source: &'a dyn ReferenceSource,
    status: &'a dyn StatusSink,
}

impl<'a> ReferenceSetBuilder<'a> {
    pub fn new(
        spec: &'a ReferenceSpec,
        source: &'a dyn ReferenceSource,
        status: &'a dyn StatusSink,
    ) -> Self {
        Self { spec, source, status }
    }

    /// Fetch every reference image and extract one descriptor per image.
    ///
    /// Any image that cannot be fetched, analyzed, or contains no face
    /// aborts the whole build.
    pub fn build(&self, analyzer: &mut dyn FaceAnalyzer) -> Result<Vec<Identity>, ReferenceError> {
        self.status.publish(Status::LoadingImages);
        tracing::info!(
            labels = self.spec.labels.len(),
            images_per_label = self.spec.images_per_label,
            "loading reference images"
        );

        self.spec
            .labels
            .iter()
            .map(|label| self.build_identity(label, &mut *analyzer))
            .collect()
    }

    fn build_identity(
        &self,
        label: &str,
        analyzer: &mut dyn FaceAnalyzer,
    ) -> Result<Identity, ReferenceError> {
        let mut descriptors = Vec::with_capacity(self.spec.images_per_label);

        for index in 1..=self.spec.images_per_label {
            let location = self.source.describe(label, index);
            let image = self
                .source
                .fetch(label, index)
                .map_err(|source| ReferenceError::Fetch {
                    location: location.clone(),
                    source,
                })?;

            let face = analyzer
                .detect_single(&image)
                .map_err(|source| ReferenceError::Analyzer {
                    location: location.clone(),
                    source,
                })?
                .ok_or_else(|| ReferenceError::NoFace {
                    label: label.to_string(),
                    location: location.clone(),
                })?;

            tracing::debug!(label, %location, score = face.detection.score, "reference descriptor extracted");
            descriptors.push(face.descriptor);
        }

        tracing::info!(label, descriptors = descriptors.len(), "identity loaded");
        Ok(Identity::new(label, descriptors))
    }
}
