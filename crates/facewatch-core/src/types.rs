use serde::{Deserialize, Serialize};
use std::fmt;

/// Label reported when no reference descriptor is close enough.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

/// Raw detector output for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    /// Five-point keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub keypoints: Option<[(f32, f32); 5]>,
}

impl Detection {
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            bbox: self.bbox.scaled(sx, sy),
            score: self.score,
            keypoints: self
                .keypoints
                .map(|kps| kps.map(|(x, y)| (x * sx, y * sy))),
        }
    }
}

/// Dense facial landmark set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    pub points: Vec<(f32, f32)>,
}

impl Landmarks {
    pub fn new(points: Vec<(f32, f32)>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self.points.iter().map(|&(x, y)| (x * sx, y * sy)).collect(),
        }
    }
}

/// Expression classes, in the output order of the FER+ classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Happy,
    Surprised,
    Sad,
    Angry,
    Disgusted,
    Fearful,
    Contempt,
}

impl Expression {
    pub const ALL: [Expression; 8] = [
        Expression::Neutral,
        Expression::Happy,
        Expression::Surprised,
        Expression::Sad,
        Expression::Angry,
        Expression::Disgusted,
        Expression::Fearful,
        Expression::Contempt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Happy => "happy",
            Expression::Surprised => "surprised",
            Expression::Sad => "sad",
            Expression::Angry => "angry",
            Expression::Disgusted => "disgusted",
            Expression::Fearful => "fearful",
            Expression::Contempt => "contempt",
        }
    }
}

/// Probability per expression class. Sums to ~1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Expressions {
    pub probabilities: [f32; 8],
}

impl Expressions {
    /// Build from raw classifier logits via softmax.
    pub fn from_logits(logits: &[f32; 8]) -> Self {
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps = logits.map(|v| (v - max).exp());
        let sum: f32 = exps.iter().sum();
        let probabilities = if sum > 0.0 {
            exps.map(|v| v / sum)
        } else {
            [0.0; 8]
        };
        Self { probabilities }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Expression, f32)> + '_ {
        Expression::ALL
            .iter()
            .copied()
            .zip(self.probabilities.iter().copied())
    }

    /// The most probable expression.
    pub fn dominant(&self) -> (Expression, f32) {
        self.iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((Expression::Neutral, 0.0))
    }

    /// Expressions with probability above `min`, most probable first.
    pub fn above(&self, min: f32) -> Vec<(Expression, f32)> {
        let mut found: Vec<_> = self.iter().filter(|(_, p)| *p > min).collect();
        found.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        found
    }
}

/// Face descriptor vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors. This is the match metric.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Everything the analyzer reports for one face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub detection: Detection,
    pub landmarks: Landmarks,
    /// Only computed on the live path; reference images skip it.
    pub expressions: Option<Expressions>,
    pub descriptor: Descriptor,
}

impl FaceObservation {
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            detection: self.detection.scaled(sx, sy),
            landmarks: self.landmarks.scaled(sx, sy),
            expressions: self.expressions,
            descriptor: self.descriptor.clone(),
        }
    }
}

/// A known person: a label and its reference descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub label: String,
    pub descriptors: Vec<Descriptor>,
}

impl Identity {
    pub fn new(label: impl Into<String>, descriptors: Vec<Descriptor>) -> Self {
        Self {
            label: label.into(),
            descriptors,
        }
    }

    /// Largest pairwise distance between this identity's descriptors.
    ///
    /// `None` with fewer than two descriptors.
    pub fn max_internal_distance(&self) -> Option<f32> {
        let mut max: Option<f32> = None;
        for (i, a) in self.descriptors.iter().enumerate() {
            for b in &self.descriptors[i + 1..] {
                let d = a.euclidean_distance(b);
                max = Some(max.map_or(d, |m| m.max(d)));
            }
        }
        max
    }
}

/// Outcome of matching one descriptor against the reference set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub label: String,
    pub distance: f32,
}

impl MatchResult {
    pub fn unknown(distance: f32) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            distance,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2})", self.label, self.distance)
    }
}
