//! Nearest-neighbour identity matching over face descriptors.

use crate::types::{Descriptor, Identity, MatchResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Euclidean distance above which a face is reported as unknown.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, PartialEq)]
pub enum MatcherError {
    #[error("reference set is empty")]
    EmptyReferenceSet,
    #[error("identity {0:?} has no reference descriptors")]
    NoDescriptors(String),
    #[error("identity {label:?} has a {actual}-dim descriptor, expected {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("unknown match strategy {0:?} (expected \"nearest\" or \"mean\")")]
    UnknownStrategy(String),
}

/// How an identity is scored against a query descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Distance to the identity's closest reference descriptor.
    #[default]
    Nearest,
    /// Mean distance to all of the identity's reference descriptors.
    Mean,
}

impl FromStr for MatchStrategy {
    type Err = MatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "mean" => Ok(Self::Mean),
            other => Err(MatcherError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Labels an unknown descriptor. Read-only, so shareable across ticks.
pub trait Matcher: Send + Sync {
    fn find_best_match(&self, query: &Descriptor) -> MatchResult;
}

/// Classifier over a fixed reference set with a distance threshold.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    identities: Vec<Identity>,
    threshold: f32,
    strategy: MatchStrategy,
    dimension: usize,
}

impl FaceMatcher {
    pub fn new(identities: Vec<Identity>, threshold: f32) -> Result<Self, MatcherError> {
        Self::with_strategy(identities, threshold, MatchStrategy::default())
    }

    pub fn with_strategy(
        identities: Vec<Identity>,
        threshold: f32,
        strategy: MatchStrategy,
    ) -> Result<Self, MatcherError> {
        let first = identities
            .first()
            .ok_or(MatcherError::EmptyReferenceSet)?;
        let dimension = first
            .descriptors
            .first()
            .map(Descriptor::len)
            .ok_or_else(|| MatcherError::NoDescriptors(first.label.clone()))?;

        for identity in &identities {
            if identity.descriptors.is_empty() {
                return Err(MatcherError::NoDescriptors(identity.label.clone()));
            }
            if let Some(bad) = identity.descriptors.iter().find(|d| d.len() != dimension) {
                return Err(MatcherError::DimensionMismatch {
                    label: identity.label.clone(),
                    expected: dimension,
                    actual: bad.len(),
                });
            }
        }

        tracing::info!(
            identities = identities.len(),
            dimension,
            threshold,
            ?strategy,
            "face matcher built"
        );

        Ok(Self {
            identities,
            threshold,
            strategy,
            dimension,
        })
    }

    fn score(&self, identity: &Identity, query: &Descriptor) -> f32 {
        let distances = identity.descriptors.iter().map(|d| query.euclidean_distance(d));
        match self.strategy {
            MatchStrategy::Nearest => distances.fold(f32::INFINITY, f32::min),
            MatchStrategy::Mean => distances.sum::<f32>() / identity.descriptors.len() as f32,
        }
    }
}

impl Matcher for FaceMatcher {
    fn find_best_match(&self, query: &Descriptor) -> MatchResult {
        if query.len() != self.dimension {
            tracing::warn!(
                expected = self.dimension,
                actual = query.len(),
                "query descriptor has wrong dimension"
            );
            return MatchResult::unknown(f32::INFINITY);
        }

        let mut best_distance = f32::INFINITY;
        let mut best_label: Option<&str> = None;

        for identity in &self.identities {
            let distance = self.score(identity, query);
            if distance < best_distance {
                best_distance = distance;
                best_label = Some(identity.label.as_str());
            }
        }

        match best_label {
            Some(label) if best_distance <= self.threshold => MatchResult {
                label: label.to_string(),
                distance: best_distance,
            },
            _ => MatchResult::unknown(best_distance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN_LABEL;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    fn reference_set() -> Vec<Identity> {
        vec![
            Identity::new("Adi Martha", vec![d(&[0.0, 0.0, 0.0]), d(&[0.1, 0.0, 0.0])]),
            Identity::new("Seno", vec![d(&[1.0, 0.0, 0.0]), d(&[1.0, 0.1, 0.0])]),
            Identity::new("Wendy", vec![d(&[0.0, 0.0, 1.0]), d(&[0.0, 0.1, 1.0])]),
        ]
    }

    #[test]
    fn test_near_identical_descriptor_matches_label() {
        let matcher = FaceMatcher::new(reference_set(), DEFAULT_MATCH_THRESHOLD).unwrap();
        let result = matcher.find_best_match(&d(&[1.0, 0.1, 0.001]));
        assert_eq!(result.label, "Seno");
        assert!(result.distance < 1e-2, "distance {}", result.distance);
    }

    #[test]
    fn test_far_descriptor_is_unknown() {
        let matcher = FaceMatcher::new(reference_set(), DEFAULT_MATCH_THRESHOLD).unwrap();
        let result = matcher.find_best_match(&d(&[5.0, 5.0, 5.0]));
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert!(result.distance > DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn test_nearest_descriptor_wins_across_identities() {
        // Closest single descriptor belongs to Wendy even though the query
        // sits between Adi Martha's two references.
        let identities = vec![
            Identity::new("Adi Martha", vec![d(&[0.0, 0.0]), d(&[0.5, 0.0])]),
            Identity::new("Wendy", vec![d(&[0.26, 0.0])]),
        ];
        let matcher = FaceMatcher::new(identities, 0.6).unwrap();
        let result = matcher.find_best_match(&d(&[0.25, 0.0]));
        assert_eq!(result.label, "Wendy");
        assert!((result.distance - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_mean_strategy_averages_identity_distances() {
        let identities = vec![
            Identity::new("Adi Martha", vec![d(&[0.0, 0.0]), d(&[0.4, 0.0])]),
            Identity::new("Wendy", vec![d(&[0.19, 0.0]), d(&[1.0, 0.0])]),
        ];
        let matcher =
            FaceMatcher::with_strategy(identities, 0.6, MatchStrategy::Mean).unwrap();
        let result = matcher.find_best_match(&d(&[0.2, 0.0]));
        assert_eq!(result.label, "Adi Martha");
        assert!((result.distance - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_distance_equal_to_threshold_matches() {
        let identities = vec![Identity::new("Seno", vec![d(&[0.0, 0.0])])];
        let matcher = FaceMatcher::new(identities, 0.5).unwrap();
        assert_eq!(matcher.find_best_match(&d(&[0.0, 0.5])).label, "Seno");
    }

    #[test]
    fn test_wrong_dimension_query_is_unknown() {
        let matcher = FaceMatcher::new(reference_set(), DEFAULT_MATCH_THRESHOLD).unwrap();
        let result = matcher.find_best_match(&d(&[0.0, 0.0]));
        assert!(result.is_unknown());
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_empty_reference_set_rejected() {
        assert_eq!(
            FaceMatcher::new(vec![], 0.6).unwrap_err(),
            MatcherError::EmptyReferenceSet
        );
    }

    #[test]
    fn test_identity_without_descriptors_rejected() {
        let identities = vec![
            Identity::new("Seno", vec![d(&[0.0])]),
            Identity::new("Wendy", vec![]),
        ];
        assert_eq!(
            FaceMatcher::new(identities, 0.6).unwrap_err(),
            MatcherError::NoDescriptors("Wendy".into())
        );
    }

    #[test]
    fn test_inconsistent_dimensions_rejected() {
        let identities = vec![
            Identity::new("Seno", vec![d(&[0.0, 1.0])]),
            Identity::new("Wendy", vec![d(&[0.0, 1.0, 2.0])]),
        ];
        assert!(matches!(
            FaceMatcher::new(identities, 0.6),
            Err(MatcherError::DimensionMismatch { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("nearest".parse::<MatchStrategy>().unwrap(), MatchStrategy::Nearest);
        assert_eq!(" MEAN ".parse::<MatchStrategy>().unwrap(), MatchStrategy::Mean);
        assert!("median".parse::<MatchStrategy>().is_err());
    }

    #[test]
    fn test_matcher_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FaceMatcher>();
    }
}
