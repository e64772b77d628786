//! facewatch-core: live face identification against a small reference set.
//!
//! Face analysis (SCRFD detection, 106-point landmarks, FER+ expressions,
//! ArcFace descriptors) runs on ONNX Runtime behind the [`FaceAnalyzer`]
//! trait. On top of it sit the reference-set builder, the threshold
//! matcher, and the [`LiveLoop`] that labels every face in a frame and
//! renders the overlay.

pub mod alignment;
pub mod analyzer;
pub mod assets;
pub mod detector;
pub mod expression;
pub mod landmarks;
pub mod matcher;
pub mod overlay;
pub mod pipeline;
pub mod recognizer;
pub mod reference;
pub mod resize;
pub mod status;
pub mod types;

pub use analyzer::{FaceAnalyzer, ModelSet, OnnxFaceAnalyzer};
pub use assets::AssetLocation;
pub use matcher::{FaceMatcher, MatchStrategy, Matcher};
pub use overlay::{Canvas, ImageCanvas};
pub use pipeline::{FrameSource, LiveLoop, LoopState, TickOutcome};
pub use status::{Status, StatusSink};
pub use types::{BoundingBox, Descriptor, Dimensions, FaceObservation, Identity, MatchResult};
