use facewatch_core::matcher::{MatchStrategy, DEFAULT_MATCH_THRESHOLD};
use facewatch_core::pipeline::DISPLAY_DIMENSIONS;
use facewatch_core::reference::ReferenceSpec;
use facewatch_core::{AssetLocation, Dimensions};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory or URL prefix holding the ONNX models.
    pub model_location: AssetLocation,
    /// Directory or URL prefix holding `{label}/{i}.jpg`.
    pub image_location: AssetLocation,
    pub reference: ReferenceSpec,
    /// Euclidean distance above which a face is unknown.
    pub match_threshold: f32,
    pub match_strategy: MatchStrategy,
    pub tick_period: Duration,
    /// Overlay size; detections are scaled to it.
    pub display: Dimensions,
    /// Where to write overlay snapshots, if anywhere.
    pub overlay_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACEWATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ReferenceSpec::default();
        let labels = var("FACEWATCH_LABELS")
            .map(|v| parse_labels(&v))
            .filter(|l| !l.is_empty())
            .unwrap_or(defaults.labels);

        let match_strategy = match var("FACEWATCH_MATCH_STRATEGY") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring FACEWATCH_MATCH_STRATEGY");
                MatchStrategy::default()
            }),
            None => MatchStrategy::default(),
        };

        Self {
            camera_device: var("FACEWATCH_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_location: AssetLocation::parse(
                &var("FACEWATCH_MODEL_LOCATION").unwrap_or_else(|| "models".to_string()),
            ),
            image_location: AssetLocation::parse(
                &var("FACEWATCH_IMAGE_LOCATION").unwrap_or_else(|| "images".to_string()),
            ),
            reference: ReferenceSpec {
                labels,
                images_per_label: parsed(&var, "FACEWATCH_IMAGES_PER_LABEL", defaults.images_per_label),
            },
            match_threshold: parsed(&var, "FACEWATCH_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            match_strategy,
            tick_period: Duration::from_millis(parsed(&var, "FACEWATCH_TICK_PERIOD_MS", 100u64).max(1)),
            display: Dimensions::new(
                parsed(&var, "FACEWATCH_DISPLAY_WIDTH", DISPLAY_DIMENSIONS.width),
                parsed(&var, "FACEWATCH_DISPLAY_HEIGHT", DISPLAY_DIMENSIONS.height),
            ),
            overlay_path: var("FACEWATCH_OVERLAY_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn parse_labels(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}
